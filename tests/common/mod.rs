//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use tempfile::TempDir;

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

use grid_insight::api::AppState;
use grid_insight::config::AppConfig;

pub const BOUNDARY: &str = "grid-insight-integration";

/// Scratch directories for uploads and artifacts, removed on drop.
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn upload_dir(&self) -> std::path::PathBuf {
        self.root.path().join("uploads")
    }

    pub fn artifact_dir(&self) -> std::path::PathBuf {
        self.root.path().join("models")
    }

    /// Default config pointed at this workspace, with a small forest.
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.upload_dir = self.upload_dir();
        config.storage.artifact_dir = self.artifact_dir();
        config.models.n_estimators = 30;
        config
    }

    /// State built the way the server builds it at startup.
    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState::from_config(&self.config()).unwrap())
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

/// `POST /api/upload` with one multipart `file` field.
pub fn upload(file_name: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

pub async fn json_body(resp: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Number of entries directly inside `dir` (0 if it does not exist).
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Workbook whose first sheet holds `(region, timestamp, value)` rows with
/// the timestamp written as a formatted Excel date; a trailing notes sheet
/// carries unrelated columns.
pub fn workbook(rows: &[(&str, &str, f64)]) -> Vec<u8> {
    let mut book = Workbook::new();
    let date = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    {
        let sheet = book.add_worksheet();
        for (col, name) in ["region", "timestamp", "value"].into_iter().enumerate() {
            sheet.write_string(0, col as u16, name).unwrap();
        }
        for (i, (region, ts, value)) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            let when = ExcelDateTime::parse_from_str(ts).unwrap();
            sheet.write_string(row, 0, *region).unwrap();
            sheet.write_datetime_with_format(row, 1, &when, &date).unwrap();
            sheet.write_number(row, 2, *value).unwrap();
        }
    }
    {
        let notes = book.add_worksheet();
        notes.write_string(0, 0, "note").unwrap();
        notes.write_string(1, 0, "not consumption data").unwrap();
    }
    book.save_to_buffer().unwrap()
}
