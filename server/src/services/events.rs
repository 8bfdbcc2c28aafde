//! Event lifecycle: creation, updates, cancellation and soft deletion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::access;
use crate::models::event::{
    CreateEventRequest, Event, EventChanges, EventFilter, EventSort, EventStatus, EventView,
    ListEventsQuery, UpdateEventRequest,
};
use crate::models::pagination::Page;
use crate::models::user::{Actor, ProfileType};
use crate::store::EventStore;
use crate::utils::error::{AppError, ErrorCode};
use crate::utils::validation::{FieldError, ValidationCode, Validator};

#[derive(Clone)]
pub struct EventService {
    events: Arc<dyn EventStore>,
}

fn ticket_price(v: &mut Validator, value: Option<Decimal>) -> Option<Decimal> {
    match value {
        Some(price) if price >= Decimal::ZERO => Some(price),
        _ => {
            v.push("ticketPrice", ValidationCode::InvalidTicketPrice);
            None
        }
    }
}

fn start_date(v: &mut Validator, value: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let at = v.datetime("startDate", value)?;
    if at <= now {
        v.push("startDate", ValidationCode::DateInPast);
        return None;
    }
    Some(at)
}

fn check_date_order(v: &mut Validator, start: DateTime<Utc>, end: DateTime<Utc>) {
    if end <= start {
        v.push("endDate", ValidationCode::EndDateGtStartDate);
    }
}

impl EventService {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    async fn load(&self, id: Uuid) -> Result<Event, AppError> {
        self.events
            .select_by_id(id)
            .await?
            .ok_or_else(|| AppError::business(ErrorCode::EntityNotFound))
    }

    /// Fails when another FORSALE event already uses `name`.
    async fn ensure_name_free(&self, name: &str, exclude_id: Option<Uuid>) -> Result<(), AppError> {
        let filter = EventFilter {
            name: Some(name.to_string()),
            status: Some(EventStatus::ForSale),
            exclude_id,
            ..EventFilter::default()
        };
        match self.events.select_one_by_filter(&filter).await? {
            Some(_) => Err(AppError::business(ErrorCode::EventAlreadyExists)),
            None => Ok(()),
        }
    }

    fn view(actor: &Actor, event: Event) -> EventView {
        let show = access::sees_tickets_sold(actor, &event);
        EventView::new(event, show)
    }

    pub async fn create(
        &self,
        request: CreateEventRequest,
        actor: &Actor,
    ) -> Result<EventView, AppError> {
        access::require_profile(actor, &[ProfileType::Promoter])?;

        let now = Utc::now();
        let mut v = Validator::new();
        let name = v.required("name", request.name.as_deref());
        let address = v.required("address", request.address.as_deref());
        let start = start_date(&mut v, request.start_date.as_deref(), now);
        let end = v.datetime("endDate", request.end_date.as_deref());
        if let (Some(start), Some(end)) = (start, end) {
            check_date_order(&mut v, start, end);
        }
        let tickets = v.quantity("tickets", request.tickets);
        let price = ticket_price(&mut v, request.ticket_price);
        v.finish()?;

        let (Some(name), Some(address), Some(start_date), Some(end_date), Some(tickets), Some(ticket_price)) =
            (name, address, start, end, tickets, price)
        else {
            return Err(AppError::InternalServerError(
                "validated event draft is incomplete".to_string(),
            ));
        };

        self.ensure_name_free(&name, None).await?;

        let stamp = actor.stamp();
        let event = Event {
            id: Uuid::new_v4(),
            promoter_id: actor.id,
            name,
            address,
            description: request
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            start_date,
            end_date,
            tickets,
            tickets_sold: 0,
            ticket_price,
            limit_by_participant: request.limit_by_participant.unwrap_or(false),
            status: EventStatus::ForSale,
            created_by: stamp.clone(),
            created_at: now,
            updated_by: stamp,
            updated_at: now,
            deleted_by: None,
            deleted_at: None,
        };

        let event = self.events.insert(event).await?;
        info!(event_id = %event.id, promoter_id = %event.promoter_id, tickets = event.tickets, "Event created");
        Ok(Self::view(actor, event))
    }

    pub async fn get(&self, id: Uuid, actor: &Actor) -> Result<EventView, AppError> {
        let event = self.load(id).await?;
        Ok(Self::view(actor, event))
    }

    pub async fn list(
        &self,
        query: ListEventsQuery,
        actor: &Actor,
    ) -> Result<Page<EventView>, AppError> {
        let page = query.page.resolve::<EventSort>()?;

        let mut v = Validator::new();
        let promoter_id = match query.promoter.as_deref() {
            Some(raw) => v.uuid("promoter", Some(raw)),
            None => None,
        };
        v.finish()?;

        let filter = EventFilter {
            name_contains: query.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            promoter_id,
            ..EventFilter::default()
        };
        let rows = self.events.select_page(&filter, &page).await?;
        Ok(rows.map(|event| Self::view(actor, event)))
    }

    /// The actor's own events, sold counts included.
    pub async fn list_mine(
        &self,
        query: ListEventsQuery,
        actor: &Actor,
    ) -> Result<Page<EventView>, AppError> {
        access::require_profile(actor, &[ProfileType::Promoter, ProfileType::Admin])?;
        let page = query.page.resolve::<EventSort>()?;

        let filter = EventFilter {
            name_contains: query.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            promoter_id: Some(actor.id),
            ..EventFilter::default()
        };
        let rows = self.events.select_page(&filter, &page).await?;
        Ok(rows.map(|event| Self::view(actor, event)))
    }

    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateEventRequest,
        actor: &Actor,
    ) -> Result<EventView, AppError> {
        let event = self.load(id).await?;
        access::ensure_event_manager(actor, &event)?;

        let changes = Self::changes(&event, request, actor)?;
        if changes.is_empty() {
            return Ok(Self::view(actor, event));
        }

        if let Some(name) = &changes.name {
            self.ensure_name_free(name, Some(event.id)).await?;
        }
        if changes.tickets.is_some_and(|t| t < event.tickets_sold) {
            return Err(below_sold());
        }

        let Some(updated) = self.events.update_fields(id, &changes).await? else {
            // Deleted, or sales moved past the new capacity since `event` was read.
            return match self.events.select_by_id(id).await? {
                None => Err(AppError::business(ErrorCode::EntityNotFound)),
                Some(_) => Err(below_sold()),
            };
        };

        if changes.cancel && event.status != EventStatus::Cancelled {
            info!(event_id = %updated.id, tickets_sold = updated.tickets_sold, "Event cancelled");
        } else if updated.status != event.status {
            info!(event_id = %updated.id, from = ?event.status, to = ?updated.status, "Event status recomputed");
        }
        Ok(Self::view(actor, updated))
    }

    /// Validates a patch. Absent fields stay untouched; explicit values,
    /// zero and `false` included, are validated and applied.
    fn changes(
        event: &Event,
        request: UpdateEventRequest,
        actor: &Actor,
    ) -> Result<EventChanges, AppError> {
        let now = Utc::now();
        let mut v = Validator::new();

        let name = v.optional_non_blank("name", request.name.as_deref());
        let address = v.optional_non_blank("address", request.address.as_deref());
        let start = match request.start_date.as_deref() {
            Some(raw) => start_date(&mut v, Some(raw), now),
            None => None,
        };
        let end = match request.end_date.as_deref() {
            Some(raw) => v.datetime("endDate", Some(raw)),
            None => None,
        };
        if (start.is_some() || end.is_some()) && !v.has_error("startDate") && !v.has_error("endDate") {
            check_date_order(
                &mut v,
                start.unwrap_or(event.start_date),
                end.unwrap_or(event.end_date),
            );
        }
        let tickets = match request.tickets {
            Some(raw) => v.quantity("tickets", Some(raw)),
            None => None,
        };
        let ticket_price = match request.ticket_price {
            Some(raw) => ticket_price(&mut v, Some(raw)),
            None => None,
        };
        let cancel = match request.status.as_deref() {
            None => false,
            Some(raw) => match EventStatus::parse(raw) {
                Some(EventStatus::Cancelled) => true,
                _ => {
                    v.push("status", ValidationCode::InvalidEventStatus);
                    false
                }
            },
        };
        v.finish()?;

        Ok(EventChanges {
            name,
            address,
            description: request.description.map(|d| d.trim().to_string()),
            start_date: start,
            end_date: end,
            tickets,
            ticket_price,
            limit_by_participant: request.limit_by_participant,
            cancel,
            updated_by: actor.stamp(),
        })
    }

    /// Soft delete. Outstanding tickets do not block it.
    pub async fn delete(&self, id: Uuid, actor: &Actor) -> Result<(), AppError> {
        let event = self.load(id).await?;
        access::ensure_event_manager(actor, &event)?;

        if !self.events.soft_delete(id, &actor.stamp()).await? {
            return Err(AppError::business(ErrorCode::EntityNotFound));
        }
        info!(event_id = %id, tickets_sold = event.tickets_sold, "Event deleted");
        Ok(())
    }
}

fn below_sold() -> AppError {
    AppError::Validation(vec![FieldError::new(
        "tickets",
        ValidationCode::InvalidTicketQnt,
    )])
}
