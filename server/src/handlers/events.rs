use axum::extract::{Path, State};
use axum::response::Response;

use crate::auth::CurrentActor;
use crate::models::event::{CreateEventRequest, ListEventsQuery, UpdateEventRequest};
use crate::services::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{ApiJson, ApiQuery};
use crate::utils::response::{created, empty_success, success};
use crate::utils::validation::parse_id;

pub async fn create(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiJson(request): ApiJson<CreateEventRequest>,
) -> Result<Response, AppError> {
    let event = state.services.events.create(request, &actor).await?;
    Ok(created(event, "Event created"))
}

pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiQuery(query): ApiQuery<ListEventsQuery>,
) -> Result<Response, AppError> {
    let page = state.services.events.list(query, &actor).await?;
    Ok(success(page, "Events retrieved"))
}

pub async fn list_mine(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiQuery(query): ApiQuery<ListEventsQuery>,
) -> Result<Response, AppError> {
    let page = state.services.events.list_mine(query, &actor).await?;
    Ok(success(page, "Events retrieved"))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let event = state.services.events.get(parse_id("id", &id)?, &actor).await?;
    Ok(success(event, "Event retrieved"))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateEventRequest>,
) -> Result<Response, AppError> {
    let event = state
        .services
        .events
        .update(parse_id("id", &id)?, request, &actor)
        .await?;
    Ok(success(event, "Event updated"))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state
        .services
        .events
        .delete(parse_id("id", &id)?, &actor)
        .await?;
    Ok(empty_success("Event deleted"))
}
