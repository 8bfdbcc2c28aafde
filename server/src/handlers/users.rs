use axum::extract::{Path, State};
use axum::response::Response;

use crate::auth::CurrentActor;
use crate::models::user::{CreateUserRequest, ListUsersQuery, UpdateUserRequest};
use crate::services::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{ApiJson, ApiQuery};
use crate::utils::response::{created, empty_success, success};
use crate::utils::validation::parse_id;

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<Response, AppError> {
    let user = state.services.users.signup(request).await?;
    Ok(created(user, "User created"))
}

pub async fn admin_create(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<Response, AppError> {
    let user = state.services.users.admin_create(request, &actor).await?;
    Ok(created(user, "User created"))
}

pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> Result<Response, AppError> {
    let page = state.services.users.list(query, &actor).await?;
    Ok(success(page, "Users retrieved"))
}

pub async fn me(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Response, AppError> {
    let user = state.services.users.me(&actor).await?;
    Ok(success(user, "User retrieved"))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentActor(_actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let user = state.services.users.get(parse_id("id", &id)?).await?;
    Ok(success(user, "User retrieved"))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Response, AppError> {
    let user = state
        .services
        .users
        .update(parse_id("id", &id)?, request, &actor)
        .await?;
    Ok(success(user, "User updated"))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state
        .services
        .users
        .delete(parse_id("id", &id)?, &actor)
        .await?;
    Ok(empty_success("User deleted"))
}
