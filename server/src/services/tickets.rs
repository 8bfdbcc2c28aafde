//! Ticket issuance and cancellation.
//!
//! A purchase reserves capacity first and only then writes the tickets; a
//! cancellation claims the ticket (conditional ACTIVE to CANCELLED flip)
//! before giving its seat back. Either way a failure in the second step
//! undoes the first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::access;
use super::inventory::Inventory;
use crate::models::event::{Event, EventFilter, EventStatus, EventSummary};
use crate::models::pagination::Page;
use crate::models::ticket::{
    ListTicketsQuery, PurchaseTicketsRequest, Ticket, TicketFilter, TicketSort, TicketStatus,
    TicketView, UpdateTicketStatusRequest,
};
use crate::models::user::{stamp_of, Actor, ProfileType, UserFilter, UserSummary};
use crate::store::{EventStore, Stores, TicketStore, UserStore, ONE_ACTIVE_TICKET_CONSTRAINT};
use crate::utils::error::{AppError, ErrorCode};
use crate::utils::validation::{ValidationCode, Validator};

#[derive(Clone)]
pub struct TicketService {
    users: Arc<dyn UserStore>,
    events: Arc<dyn EventStore>,
    tickets: Arc<dyn TicketStore>,
    inventory: Inventory,
}

/// Upper bound on tickets issued by a single purchase.
pub const MAX_TICKETS_PER_PURCHASE: i32 = 100;

const CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(CODE_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// `quantity` distinct purchase codes: base36 of the current millisecond
/// timestamp times a random factor.
fn purchase_codes(quantity: usize) -> Vec<String> {
    let now_ms = u128::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let mut rng = rand::thread_rng();
    let mut seen = HashSet::with_capacity(quantity);
    let mut codes = Vec::with_capacity(quantity);
    while codes.len() < quantity {
        let factor = u128::from(rng.gen_range(1..=u32::MAX));
        let code = to_base36(now_ms * factor);
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    codes
}

impl TicketService {
    pub fn new(stores: &Stores, inventory: Inventory) -> Self {
        Self {
            users: stores.users.clone(),
            events: stores.events.clone(),
            tickets: stores.tickets.clone(),
            inventory,
        }
    }

    /// Event of a ticket, soft-deleted ones included.
    async fn event_of(&self, event_id: Uuid) -> Result<Event, AppError> {
        let filter = EventFilter {
            ids: vec![event_id],
            include_deleted: true,
            ..EventFilter::default()
        };
        self.events
            .select_one_by_filter(&filter)
            .await?
            .ok_or_else(|| AppError::business(ErrorCode::EntityNotFound))
    }

    async fn participant_summary(&self, participant_id: Uuid) -> Result<UserSummary, AppError> {
        let user = self.users.select_by_id(participant_id).await?;
        Ok(UserSummary {
            id: participant_id,
            name: user.map(|u| u.name).unwrap_or_default(),
        })
    }

    async fn view(&self, ticket: Ticket, event: &Event) -> Result<TicketView, AppError> {
        let participant = self.participant_summary(ticket.participant_id).await?;
        Ok(TicketView::new(ticket, EventSummary::from(event), participant))
    }

    pub async fn purchase(
        &self,
        request: PurchaseTicketsRequest,
        actor: &Actor,
    ) -> Result<Vec<TicketView>, AppError> {
        access::require_profile(actor, &[ProfileType::Participant])?;

        let mut v = Validator::new();
        let event_id = match v.required("event", request.event.as_deref()) {
            Some(raw) => v.uuid("event", Some(raw.as_str())),
            None => None,
        };
        let quantity = match v.quantity("quantity", request.quantity) {
            Some(q) if q > MAX_TICKETS_PER_PURCHASE => {
                v.push("quantity", ValidationCode::InvalidTicketQnt);
                None
            }
            q => q,
        };
        v.finish()?;
        let (Some(event_id), Some(quantity)) = (event_id, quantity) else {
            return Err(AppError::InternalServerError(
                "validated purchase is incomplete".to_string(),
            ));
        };

        let event = self
            .events
            .select_by_id(event_id)
            .await?
            .ok_or_else(|| AppError::business(ErrorCode::EntityNotFound))?;

        match event.status {
            EventStatus::ForSale => {}
            EventStatus::Closed | EventStatus::Cancelled => {
                return Err(AppError::business(ErrorCode::UnavailableEvent))
            }
        }

        self.issue(&event, quantity, actor).await
    }

    /// Reserves `quantity` seats of a FORSALE snapshot and writes the tickets.
    /// A buyer whose snapshot went stale loses at the conditional write.
    async fn issue(
        &self,
        event: &Event,
        quantity: i32,
        actor: &Actor,
    ) -> Result<Vec<TicketView>, AppError> {
        if event.limit_by_participant {
            if quantity > 1 {
                return Err(AppError::business(ErrorCode::TicketLimitReached));
            }
            let held = TicketFilter {
                event_id: Some(event.id),
                participant_id: Some(actor.id),
                status: Some(TicketStatus::Active),
                ..TicketFilter::default()
            };
            if self.tickets.select_one_by_filter(&held).await?.is_some() {
                return Err(AppError::business(ErrorCode::TicketLimitReached));
            }
        }

        let stamp = stamp_of(Some(actor));
        let event = self
            .inventory
            .increase_ticket_sold(event, quantity, &stamp)
            .await?;

        let now = Utc::now();
        let batch: Vec<Ticket> = purchase_codes(quantity as usize)
            .into_iter()
            .map(|code| Ticket {
                id: Uuid::new_v4(),
                participant_id: actor.id,
                event_id: event.id,
                code,
                status: TicketStatus::Active,
                limited: event.limit_by_participant,
                created_by: stamp.clone(),
                created_at: now,
                updated_by: stamp.clone(),
                updated_at: now,
            })
            .collect();

        let tickets = match self.tickets.insert_batch(batch).await {
            Ok(tickets) => tickets,
            Err(e) => {
                warn!(event_id = %event.id, quantity, error = %e, "Ticket batch failed, releasing seats");
                if let Err(release) = self.inventory.release(&event, quantity, &stamp).await {
                    error!(event_id = %event.id, quantity, error = ?release, "Could not release seats");
                }
                if e.is_conflict_on(ONE_ACTIVE_TICKET_CONSTRAINT) {
                    return Err(AppError::business(ErrorCode::TicketLimitReached));
                }
                return Err(e.into());
            }
        };

        info!(
            event_id = %event.id,
            participant_id = %actor.id,
            quantity,
            tickets_sold = event.tickets_sold,
            "Tickets purchased"
        );

        let participant = UserSummary {
            id: actor.id,
            name: actor.name.clone(),
        };
        let summary = EventSummary::from(&event);
        Ok(tickets
            .into_iter()
            .map(|t| TicketView::new(t, summary.clone(), participant.clone()))
            .collect())
    }

    pub async fn get(&self, id: Uuid, actor: &Actor) -> Result<TicketView, AppError> {
        let ticket = self
            .tickets
            .select_by_id(id)
            .await?
            .ok_or_else(|| AppError::business(ErrorCode::EntityNotFound))?;
        let event = self.event_of(ticket.event_id).await?;
        access::ensure_ticket_visible(actor, &ticket, &event)?;
        self.view(ticket, &event).await
    }

    pub async fn list(
        &self,
        query: ListTicketsQuery,
        actor: &Actor,
    ) -> Result<Page<TicketView>, AppError> {
        let page = query.page.resolve::<TicketSort>()?;

        let mut v = Validator::new();
        let mut filter = TicketFilter {
            event_id: query.event.as_deref().and_then(|raw| v.uuid("event", Some(raw))),
            participant_id: query
                .participant
                .as_deref()
                .and_then(|raw| v.uuid("participant", Some(raw))),
            promoter_id: query
                .promoter
                .as_deref()
                .and_then(|raw| v.uuid("promoter", Some(raw))),
            status: query.status.as_deref().and_then(|raw| {
                let status = TicketStatus::parse(raw);
                if status.is_none() {
                    v.push("status", ValidationCode::InvalidTicketStatus);
                }
                status
            }),
            ..TicketFilter::default()
        };
        v.finish()?;
        access::scope_tickets(actor, &mut filter);

        let page = self.tickets.select_page(&filter, &page).await?;

        let event_ids: Vec<Uuid> = page
            .rows
            .iter()
            .map(|t| t.event_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let participant_ids: Vec<Uuid> = page
            .rows
            .iter()
            .map(|t| t.participant_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let events: HashMap<Uuid, EventSummary> = if event_ids.is_empty() {
            HashMap::new()
        } else {
            let filter = EventFilter {
                ids: event_ids,
                include_deleted: true,
                ..EventFilter::default()
            };
            self.events
                .select_many_by_filter(&filter)
                .await?
                .iter()
                .map(|e| (e.id, EventSummary::from(e)))
                .collect()
        };
        let participants: HashMap<Uuid, String> = if participant_ids.is_empty() {
            HashMap::new()
        } else {
            let filter = UserFilter {
                ids: participant_ids,
                ..UserFilter::default()
            };
            self.users
                .select_many_by_filter(&filter)
                .await?
                .into_iter()
                .map(|u| (u.id, u.name))
                .collect()
        };

        let mut views = Vec::with_capacity(page.rows.len());
        for ticket in page.rows {
            let Some(event) = events.get(&ticket.event_id).cloned() else {
                return Err(AppError::InternalServerError(format!(
                    "ticket {} references missing event {}",
                    ticket.id, ticket.event_id
                )));
            };
            let participant = UserSummary {
                id: ticket.participant_id,
                name: participants
                    .get(&ticket.participant_id)
                    .cloned()
                    .unwrap_or_default(),
            };
            views.push(TicketView::new(ticket, event, participant));
        }

        Ok(Page {
            rows: views,
            count: page.count,
        })
    }

    /// Only ACTIVE to CANCELLED exists; the freed seat goes back to the event.
    pub async fn update_status(
        &self,
        id: Uuid,
        request: UpdateTicketStatusRequest,
        actor: &Actor,
    ) -> Result<TicketView, AppError> {
        let mut v = Validator::new();
        let requested = match v.required("status", request.status.as_deref()) {
            Some(raw) => {
                let status = TicketStatus::parse(&raw);
                if status.is_none() {
                    v.push("status", ValidationCode::InvalidTicketStatus);
                }
                status
            }
            None => None,
        };
        v.finish()?;
        let Some(requested) = requested else {
            return Err(AppError::InternalServerError(
                "validated status is missing".to_string(),
            ));
        };

        let active = TicketFilter {
            id: Some(id),
            status: Some(TicketStatus::Active),
            ..TicketFilter::default()
        };
        let ticket = self
            .tickets
            .select_one_by_filter(&active)
            .await?
            .ok_or_else(|| AppError::business(ErrorCode::EntityNotFound))?;

        let event = self.event_of(ticket.event_id).await?;
        if event.status == EventStatus::Cancelled {
            return Err(AppError::business(ErrorCode::UnavailableEvent));
        }
        access::ensure_ticket_transition(actor, &ticket, &event, requested)?;

        let stamp = actor.stamp();
        let claimed = self
            .tickets
            .update_status(ticket.id, TicketStatus::Active, TicketStatus::Cancelled, &stamp)
            .await?
            .ok_or_else(|| AppError::business(ErrorCode::EntityNotFound))?;

        let event = match self.inventory.decrease_ticket_sold(&event, &stamp).await {
            Ok(event) => event,
            Err(e) => {
                warn!(ticket_id = %ticket.id, event_id = %event.id, "Seat release failed, restoring ticket");
                let restored = self
                    .tickets
                    .update_status(ticket.id, TicketStatus::Cancelled, TicketStatus::Active, &ticket.updated_by)
                    .await;
                return match restored {
                    Ok(Some(_)) => Err(e),
                    outcome => {
                        error!(
                            ticket_id = %ticket.id,
                            event_id = %event.id,
                            release_error = ?e,
                            restore = ?outcome,
                            "Could not restore ticket, seat stays counted as sold"
                        );
                        Err(AppError::InternalServerError(format!(
                            "ticket {} is cancelled but its seat is still counted as sold on event {}",
                            ticket.id, event.id
                        )))
                    }
                };
            }
        };

        info!(
            ticket_id = %claimed.id,
            event_id = %event.id,
            tickets_sold = event.tickets_sold,
            "Ticket cancelled"
        );
        self.view(claimed, &event).await
    }
}
