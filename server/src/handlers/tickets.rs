use axum::extract::{Path, State};
use axum::response::Response;

use crate::auth::CurrentActor;
use crate::models::ticket::{ListTicketsQuery, PurchaseTicketsRequest, UpdateTicketStatusRequest};
use crate::services::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{ApiJson, ApiQuery};
use crate::utils::response::{created, success};
use crate::utils::validation::parse_id;

pub async fn purchase(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiJson(request): ApiJson<PurchaseTicketsRequest>,
) -> Result<Response, AppError> {
    let tickets = state.services.tickets.purchase(request, &actor).await?;
    Ok(created(tickets, "Tickets purchased"))
}

pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiQuery(query): ApiQuery<ListTicketsQuery>,
) -> Result<Response, AppError> {
    let page = state.services.tickets.list(query, &actor).await?;
    Ok(success(page, "Tickets retrieved"))
}

pub async fn get(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let ticket = state.services.tickets.get(parse_id("id", &id)?, &actor).await?;
    Ok(success(ticket, "Ticket retrieved"))
}

pub async fn update_status(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateTicketStatusRequest>,
) -> Result<Response, AppError> {
    let ticket = state
        .services
        .tickets
        .update_status(parse_id("id", &id)?, request, &actor)
        .await?;
    Ok(success(ticket, "Ticket updated"))
}
