//! Records held by the in-memory store and returned by the API.
//!
//! Every record is passive: identifiers are opaque strings and cross-record
//! references (`file_id`, `data_refs`, `target_id`) are never checked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner and actor recorded on scenarios and audit entries.
pub const MOCK_USER_ID: &str = "mock_user";

/// Version tag stamped on every forecast.
pub const FORECAST_MODEL_VERSION: &str = "1.0";

/// Type tag stamped on every anomaly.
pub const CONSUMPTION_ANOMALY: &str = "consumption_anomaly";

/// Generates a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Anything stored in a table keyed by its identifier.
pub trait Record {
    fn id(&self) -> &str;
}

/// One region-tagged observation from an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: String,
    pub region: String,
    /// Timestamp exactly as it appeared in the upload.
    pub timestamp: String,
    pub value: f64,
    /// Upload this row came from.
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub id: String,
    pub region: String,
    pub period: String,
    pub predicted_value: f64,
    pub model_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    /// Row index into the mock dataset that was scored.
    pub data_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: u32,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub data_refs: Vec<String>,
    pub comments: Vec<String>,
}

impl Scenario {
    /// Builds a scenario owned by the mock user with no comments.
    pub fn new(name: String, data_refs: Vec<String>) -> Self {
        Self {
            id: new_id(),
            name,
            owner_id: MOCK_USER_ID.to_string(),
            data_refs,
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Audit entry attributed to the mock user, stamped now.
    pub fn by_mock_user(action: &str, target_id: &str) -> Self {
        Self {
            id: new_id(),
            user_id: MOCK_USER_ID.to_string(),
            action: action.to_string(),
            target_id: target_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Dashboard user. Nothing creates users yet, so the table stays empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

macro_rules! impl_record {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Record for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
            }
        )+
    };
}

impl_record!(ConsumptionRecord, Forecast, Anomaly, Scenario, AuditLogEntry, User);
