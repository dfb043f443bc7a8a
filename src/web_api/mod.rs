//! Web API - dashboard page and JSON/file endpoints
//!
//! - `GET  /`                                 dashboard page
//! - `GET  /health`                           liveness
//! - `POST /api/upload`                       start an analysis (multipart field `video`)
//! - `GET  /api/session`                      status snapshot
//! - `GET  /api/session/preview.jpg`          latest annotated frame
//! - `GET  /api/session/vehicle_counts.csv`   per-frame counts

mod routes;

pub use routes::create_router;

use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
