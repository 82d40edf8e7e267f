use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::infrastructure::unit_of_work::UnitOfWork;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub fn create_health_router(db: DatabaseConnection) -> Router {
    Router::new().route("/health", get(health)).with_state(db)
}

/// 200 while the store answers, 503 otherwise
async fn health(State(db): State<DatabaseConnection>) -> (StatusCode, Json<HealthResponse>) {
    if UnitOfWork::new(db).can_connect().await {
        let body = HealthResponse {
            status: "ok".to_string(),
        };
        (StatusCode::OK, Json(body))
    } else {
        let body = HealthResponse {
            status: "unavailable".to_string(),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}
