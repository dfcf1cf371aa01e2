use axum::Json;
use serde::Serialize;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct RootStatus {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

pub async fn root() -> Json<RootStatus> {
    Json(RootStatus {
        status: "Backend running",
        version: SERVICE_VERSION,
    })
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus { status: "healthy" })
}
