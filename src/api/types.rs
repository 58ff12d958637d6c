//! API request, query, and response types.
//!
//! Every response wraps its payload in a single named key (`forecast`,
//! `anomalies`, `scenario`, `users`, `data`) so the dashboard can read the
//! body the same way for every endpoint.

use serde::{Deserialize, Serialize};

use crate::domain::{Anomaly, ConsumptionRecord, Forecast, Scenario, User};

/// `GET /` greeting.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Successful `POST /api/upload`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    /// Identifier every stored row was tagged with.
    pub file_id: String,
    /// Number of data rows inserted.
    pub records_processed: usize,
}

/// Required query parameters for `GET /api/forecast`.
///
/// Both values are stored on the forecast record but do not influence the
/// predicted value.
#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub region: String,
    pub period: String,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub forecast: Forecast,
}

#[derive(Debug, Serialize)]
pub struct AnomaliesResponse {
    pub anomalies: Vec<Anomaly>,
}

/// Query half of `POST /api/scenarios`.
#[derive(Debug, Default, Deserialize)]
pub struct ScenarioQuery {
    pub name: Option<String>,
}

/// Body of `POST /api/scenarios`: a `{name, data_refs}` object, or a bare
/// `data_refs` array with `name` in the query string.
///
/// `data_refs` are kept verbatim, unchecked.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateScenarioBody {
    Object {
        name: Option<String>,
        #[serde(default)]
        data_refs: Vec<String>,
    },
    Refs(Vec<String>),
}

impl CreateScenarioBody {
    /// Scenario name (body wins over `query_name`) and refs.
    pub fn into_parts(self, query_name: Option<String>) -> (Option<String>, Vec<String>) {
        match self {
            Self::Object { name, data_refs } => (name.or(query_name), data_refs),
            Self::Refs(data_refs) => (query_name, data_refs),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScenarioResponse {
    pub scenario: Scenario,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

/// Optional region filter for `GET /api/data`; an empty value means no filter.
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    pub region: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub data: Vec<ConsumptionRecord>,
}

/// Error body for every 4xx/5xx the handlers produce.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub detail: String,
}
