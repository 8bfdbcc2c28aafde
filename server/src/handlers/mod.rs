use axum::extract::State;
use axum::response::Response;
use serde::Serialize;

use crate::services::AppState;
use crate::utils::response::success;

pub mod auth;
pub mod events;
pub mod tickets;
pub mod users;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: String,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: state.config.app_name.clone(),
    };

    success(payload, "Health check successful")
}
