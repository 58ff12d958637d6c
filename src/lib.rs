//! GridInsightPro: energy-consumption dashboard backend.
//!
//! Ingests uploaded consumption files, serves a linear forecast and
//! isolation-forest anomalies, and keeps everything in an in-memory store.

pub mod anomaly;
/// HTTP routes, handlers, and shared state.
pub mod api;
pub mod config;
pub mod domain;
pub mod forecast;
/// Upload parsing and raw file retention.
pub mod io;
pub mod models;
pub mod observability;
pub mod store;
pub mod synthetic;
