//! estpii Server
//!
//! HTTP API for Estonian PII detection and anonymization.
//!
//! Endpoints:
//! - `GET /` status and configured models
//! - `POST /analyze` detect PII spans
//! - `POST /anonymize` detect and replace PII spans
//! - `GET /supportedentities`, `GET /recognizers`, `GET /config`
//! - `GET /metrics` Prometheus exposition

pub mod config;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use routes::{create_router, AppError};
pub use state::AppState;
