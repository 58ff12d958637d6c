//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use chrono::Utc;
use tracing::{debug, info};

use super::AppState;
use super::error::ApiError;
use super::types::{
    AnomaliesResponse, CreateScenarioBody, DataQuery, DataResponse, ForecastQuery, ForecastResponse,
    MessageResponse, ScenarioQuery, ScenarioResponse, UploadResponse, UsersResponse,
};
use crate::anomaly::OUTLIER;
use crate::domain::{
    Anomaly, AuditLogEntry, CONSUMPTION_ANOMALY, FORECAST_MODEL_VERSION, Forecast, Scenario, new_id,
};
use crate::forecast::average;
use crate::io::tabular::{FileFormat, Sheet, TabularError};
use crate::io::uploads::save_upload;

const SECONDS_PER_HOUR: i64 = 3600;

/// `GET /` → 200 + welcome message
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to GridInsightPro API".to_string(),
    })
}

/// Stores every row of an uploaded CSV/XLSX file.
///
/// `POST /api/upload` (multipart, field `file`)
/// → 200 + `UploadResponse`
/// → 400 on a bad extension or missing required columns (nothing stored)
/// → 500 "Error processing file: ..." on parse or conversion failure
///
/// Rows are inserted in file order. A blank or NA `value` is stored as
/// NaN (`null` in JSON). Any other non-numeric `value` stops the batch at
/// that row; earlier rows stay stored.
pub async fn upload(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Result<Json<UploadResponse>, ApiError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            file = Some((name, bytes));
            break;
        }
    }
    let (file_name, bytes) = file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    let format = FileFormat::from_file_name(&file_name)
        .ok_or_else(|| ApiError::BadRequest("Invalid file format".to_string()))?;

    let file_id = new_id();
    let saved = save_upload(&state.settings.upload_dir, &file_id, &file_name, &bytes)
        .await
        .map_err(ApiError::processing)?;
    debug!(path = %saved.display(), "upload saved");

    let sheet = Sheet::parse(format, &bytes).map_err(ApiError::processing)?;
    let (rows, cols) = sheet.shape();
    info!(file = %file_name, rows, cols, "upload parsed");
    debug!(columns = ?sheet.headers(), "upload columns");

    let records = sheet.consumption_records(&file_id).map_err(|e| match e {
        TabularError::MissingColumns { .. } => ApiError::BadRequest(e.to_string()),
        other => ApiError::processing(other),
    })?;

    let mut failure = None;
    let inserted = {
        let mut rows = records.map_while(|r| match r {
            Ok(record) => Some(record),
            Err(e) => {
                failure = Some(e);
                None
            }
        });
        state.store.insert_consumption(&mut rows)
    };
    if let Some(e) = failure {
        return Err(ApiError::processing(e));
    }

    state.store.append_audit(AuditLogEntry::by_mock_user("upload", &file_id));
    info!(%file_id, inserted, "upload stored");

    Ok(Json(UploadResponse {
        message: "Data uploaded successfully".to_string(),
        file_id,
        records_processed: inserted,
    }))
}

/// Averages the forecaster over the next hours and stores the result.
///
/// `GET /api/forecast?region=R&period=P` → 200 + `ForecastResponse`
///
/// `region` and `period` are recorded verbatim; the value depends only on
/// the current time.
pub async fn get_forecast(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let Query(query) = query?;
    let now = Utc::now().timestamp();
    let hours = state.settings.forecast_horizon_hours as i64;
    let horizon: Vec<i64> = (0..hours).map(|h| now + h * SECONDS_PER_HOUR).collect();

    let predictions = state.models.forecaster.predict(&horizon)?;
    let forecast = Forecast {
        id: new_id(),
        region: query.region,
        period: query.period,
        predicted_value: average(&predictions).unwrap_or_default(),
        model_version: FORECAST_MODEL_VERSION.to_string(),
    };
    state.store.insert_forecast(forecast.clone());

    Ok(Json(ForecastResponse { forecast }))
}

/// Scores the startup mock dataset and stores one anomaly per outlier.
///
/// `GET /api/anomalies` → 200 + `AnomaliesResponse`
///
/// `data_id` is the outlier's position in the mock dataset; severity is
/// `floor(10 * |decision score|)`.
pub async fn get_anomalies(State(state): State<Arc<AppState>>) -> Result<Json<AnomaliesResponse>, ApiError> {
    let values: Vec<f64> = state.mock_data.iter().map(|s| s.value).collect();
    let detector = &state.models.detector;
    let scores = detector.decision_function(&values)?;
    let labels = detector.predict(&values)?;

    let anomalies: Vec<Anomaly> = labels
        .iter()
        .zip(&scores)
        .enumerate()
        .filter(|(_, (label, _))| **label == OUTLIER)
        .map(|(i, (_, score))| Anomaly {
            id: new_id(),
            data_id: i.to_string(),
            kind: CONSUMPTION_ANOMALY.to_string(),
            severity: severity(*score),
            detected_at: Utc::now(),
        })
        .collect();

    for anomaly in &anomalies {
        state.store.insert_anomaly(anomaly.clone());
    }
    debug!(count = anomalies.len(), scored = values.len(), "anomalies detected");

    Ok(Json(AnomaliesResponse { anomalies }))
}

/// Creates a scenario owned by the mock user.
///
/// `POST /api/scenarios` with `{"name": N, "data_refs": [..]}`
/// `POST /api/scenarios?name=N` with `[..]`
/// → 200 + `ScenarioResponse`
/// → 400 if no name is given in either place
pub async fn create_scenario(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ScenarioQuery>, QueryRejection>,
    body: Result<Json<CreateScenarioBody>, JsonRejection>,
) -> Result<Json<ScenarioResponse>, ApiError> {
    let Query(query) = query?;
    let Json(body) = body?;
    let (name, data_refs) = body.into_parts(query.name);
    let name = name.ok_or_else(|| ApiError::BadRequest("Missing required field: name".to_string()))?;

    let scenario = Scenario::new(name, data_refs);
    state.store.insert_scenario(scenario.clone());
    Ok(Json(ScenarioResponse { scenario }))
}

/// `GET /api/users` → 200 + `UsersResponse`
pub async fn list_users(State(state): State<Arc<AppState>>) -> Json<UsersResponse> {
    Json(UsersResponse {
        users: state.store.users(),
    })
}

/// Stored consumption rows in insertion order.
///
/// `GET /api/data` → all rows
/// `GET /api/data?region=R` → rows whose region equals `R` exactly
pub async fn list_data(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> Result<Json<DataResponse>, ApiError> {
    let Query(query) = query?;
    let region = query.region.as_deref().filter(|r| !r.is_empty());
    Ok(Json(DataResponse {
        data: state.store.consumption(region),
    }))
}

fn severity(decision: f64) -> u32 {
    (10.0 * decision.abs()).floor() as u32
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::util::ServiceExt;

    use super::*;
    use crate::anomaly::IsolationForestParams;
    use crate::api::{ApiSettings, router};
    use crate::models::{ModelPair, ModelSource, train_anomaly_detector, train_forecaster};
    use crate::store::MemoryStore;
    use crate::synthetic::SyntheticSeries;

    const BOUNDARY: &str = "grid-insight-test-boundary";

    fn make_test_state(upload_dir: &Path) -> Arc<AppState> {
        let mut series = SyntheticSeries::seeded(7);
        series.periods = 100;
        let mock_data = series.generate();
        let params = IsolationForestParams {
            n_estimators: 25,
            ..IsolationForestParams::default()
        };
        let forecaster = train_forecaster(&mock_data, 42).unwrap().model;
        let detector = train_anomaly_detector(&mock_data, &params).unwrap();

        Arc::new(AppState {
            store: Arc::new(MemoryStore::new()),
            models: ModelPair { forecaster, detector },
            model_source: ModelSource::FellBackToDefault {
                reason: "test".to_string(),
            },
            mock_data,
            settings: ApiSettings {
                upload_dir: upload_dir.to_path_buf(),
                cors_origins: vec!["http://localhost:3000".to_string()],
                max_upload_bytes: 1024 * 1024,
                forecast_horizon_hours: 24,
            },
        })
    }

    fn multipart_request(file_name: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn root_returns_welcome() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(make_test_state(dir.path()));

        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["message"], "Welcome to GridInsightPro API");
    }

    #[tokio::test]
    async fn csv_upload_stores_rows_and_audits() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());
        let app = router(state.clone());

        let csv = "region,timestamp,value\nNorth,2023-01-01 00:00:00,10\nSouth,2023-01-01 01:00:00,12.5";
        let resp = app.oneshot(multipart_request("usage.csv", csv)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["records_processed"], 2);
        let file_id = json["file_id"].as_str().unwrap().to_string();

        let rows = state.store.consumption(None);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.file_id == file_id));

        let audit = state.store.audit_log();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "upload");
        assert_eq!(audit[0].target_id, file_id);
        assert!(dir.path().join(format!("{file_id}_usage.csv")).exists());
    }

    #[tokio::test]
    async fn wrong_extension_is_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());
        let app = router(state.clone());

        let resp = app
            .oneshot(multipart_request("usage.txt", "region,timestamp,value\nNorth,t,1"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["detail"], "Invalid file format");
        assert!(state.store.consumption(None).is_empty());
        assert!(state.store.audit_log().is_empty());
    }

    #[tokio::test]
    async fn missing_columns_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());
        let app = router(state.clone());

        let resp = app
            .oneshot(multipart_request("usage.csv", "region,value\nNorth,1"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let detail = body_json(resp).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Missing required columns"), "{detail}");
        assert!(state.store.consumption(None).is_empty());
    }

    #[tokio::test]
    async fn non_numeric_value_keeps_earlier_rows() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());
        let app = router(state.clone());

        let csv = "region,timestamp,value\nNorth,t0,1\nSouth,t1,lots\nEast,t2,3";
        let resp = app.oneshot(multipart_request("usage.csv", csv)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body_json(resp).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Error processing file:"), "{detail}");
        let rows = state.store.consumption(None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].region, "North");
        assert!(state.store.audit_log().is_empty());
    }

    #[tokio::test]
    async fn forecast_records_query_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());
        let app = router(state.clone());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/forecast?region=North&period=2024-Q1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["forecast"]["region"], "North");
        assert_eq!(json["forecast"]["period"], "2024-Q1");
        assert_eq!(json["forecast"]["model_version"], "1.0");
        assert!(json["forecast"]["predicted_value"].is_f64());
        assert_eq!(state.store.forecasts().len(), 1);
    }

    #[tokio::test]
    async fn forecast_requires_both_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(make_test_state(dir.path()));

        let resp = app
            .oneshot(Request::builder().uri("/api/forecast?region=North").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let detail = body_json(resp).await["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("period"), "{detail}");
    }

    #[tokio::test]
    async fn anomalies_are_outliers_of_mock_data() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());
        let app = router(state.clone());

        let resp = app
            .oneshot(Request::builder().uri("/api/anomalies").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let anomalies = json["anomalies"].as_array().unwrap();
        assert!(!anomalies.is_empty());
        for a in anomalies {
            assert_eq!(a["type"], "consumption_anomaly");
            let idx: usize = a["data_id"].as_str().unwrap().parse().unwrap();
            assert!(idx < state.mock_data.len());
        }
        assert_eq!(state.store.anomalies().len(), anomalies.len());
    }

    #[tokio::test]
    async fn scenario_is_created_for_mock_user() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());
        let app = router(state.clone());

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/scenarios")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"Peak shaving","data_refs":["a","missing-id"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["scenario"]["name"], "Peak shaving");
        assert_eq!(json["scenario"]["owner_id"], "mock_user");
        assert_eq!(json["scenario"]["data_refs"], serde_json::json!(["a", "missing-id"]));
        assert_eq!(json["scenario"]["comments"], serde_json::json!([]));
        assert_eq!(state.store.scenarios().len(), 1);
    }

    #[tokio::test]
    async fn scenario_accepts_query_name_with_bare_refs() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());

        let resp = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/scenarios?name=Test")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"["a","b"]"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["scenario"]["name"], "Test");
        assert_eq!(json["scenario"]["data_refs"], serde_json::json!(["a", "b"]));
        assert_eq!(state.store.scenarios().len(), 1);
    }

    #[tokio::test]
    async fn scenario_without_name_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());

        let resp = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/scenarios")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"["a"]"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["detail"], "Missing required field: name");
        assert!(state.store.scenarios().is_empty());
    }

    #[tokio::test]
    async fn malformed_scenario_body_reports_detail() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(make_test_state(dir.path()));

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/scenarios")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"x","data_refs":"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(resp.status().is_client_error());
        assert!(body_json(resp).await["detail"].is_string());
    }

    #[tokio::test]
    async fn users_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(make_test_state(dir.path()));

        let resp = app
            .oneshot(Request::builder().uri("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({ "users": [] }));
    }

    #[tokio::test]
    async fn data_filters_by_exact_region() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_test_state(dir.path());

        let csv = "region,timestamp,value\nNorth,t0,1\nnorth,t1,2\nSouth,t2,3\nNorth,t3,4";
        let resp = router(state.clone())
            .oneshot(multipart_request("usage.csv", csv))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router(state.clone())
            .oneshot(Request::builder().uri("/api/data?region=North").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        let values: Vec<f64> = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["value"].as_f64().unwrap())
            .collect();
        assert_eq!(values, vec![1.0, 4.0]);

        let resp = router(state)
            .oneshot(Request::builder().uri("/api/data?region=").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["data"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn severity_floors_scaled_magnitude() {
        assert_eq!(severity(-0.0), 0);
        assert_eq!(severity(-0.05), 0);
        assert_eq!(severity(-0.137), 1);
        assert_eq!(severity(-0.29), 2);
        assert_eq!(severity(0.31), 3);
    }
}
