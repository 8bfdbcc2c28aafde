use axum::extract::State;
use axum::response::Response;

use crate::models::user::{LoginRequest, RefreshRequest};
use crate::services::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::ApiJson;
use crate::utils::response::{empty_success, success};

pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Response, AppError> {
    let tokens = state.services.credentials.authenticate(request).await?;
    Ok(success(tokens, "Authenticated"))
}

pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Response, AppError> {
    let token = state.services.credentials.refresh(request).await?;
    Ok(success(token, "Access token refreshed"))
}

pub async fn logout(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Response {
    state.services.credentials.logout(request).await;
    empty_success("Logged out")
}
