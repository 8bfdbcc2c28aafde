use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::pagination::{PageParams, SortField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i16)]
pub enum EventStatus {
    ForSale = 0,
    Closed = 1,
    Cancelled = 2,
}

impl EventStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FORSALE" => Some(Self::ForSale),
            "CLOSED" => Some(Self::Closed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub promoter_id: Uuid,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Capacity.
    pub tickets: i32,
    /// Only ever written through the inventory primitives of the event store.
    pub tickets_sold: i32,
    pub ticket_price: Decimal,
    pub limit_by_participant: bool,
    pub status: EventStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn available(&self) -> i32 {
        self.tickets - self.tickets_sold
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Partial update of an event row.
///
/// Sold counts are not part of it: they move only through
/// `EventStore::increase_tickets_sold` / `decrease_tickets_sold`.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// New capacity. Stores refuse it when below the current sold count and
    /// recompute FORSALE/CLOSED against it.
    pub tickets: Option<i32>,
    pub ticket_price: Option<Decimal>,
    pub limit_by_participant: Option<bool>,
    pub cancel: bool,
    pub updated_by: String,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.address.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.tickets.is_none()
            && self.ticket_price.is_none()
            && self.limit_by_participant.is_none()
            && !self.cancel
    }

    /// Status an event ends up in once these changes are applied.
    pub fn resulting_status(&self, event: &Event) -> EventStatus {
        if self.cancel || event.status == EventStatus::Cancelled {
            return EventStatus::Cancelled;
        }
        let capacity = self.tickets.unwrap_or(event.tickets);
        if event.tickets_sold >= capacity {
            EventStatus::Closed
        } else {
            EventStatus::ForSale
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub ids: Vec<Uuid>,
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub promoter_id: Option<Uuid>,
    pub status: Option<EventStatus>,
    pub exclude_id: Option<Uuid>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventSort {
    #[default]
    CreatedAt,
    Name,
    StartDate,
    TicketPrice,
}

impl SortField for EventSort {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "createdAt" => Some(Self::CreatedAt),
            "name" => Some(Self::Name),
            "startDate" => Some(Self::StartDate),
            "ticketPrice" => Some(Self::TicketPrice),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Name => "name",
            Self::StartDate => "start_date",
            Self::TicketPrice => "ticket_price",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub tickets: Option<i64>,
    pub ticket_price: Option<Decimal>,
    pub limit_by_participant: Option<bool>,
}

/// Partial event update: absent fields are left unchanged, explicit zero or
/// `false` values are applied (and validated) like any other value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub tickets: Option<i64>,
    pub ticket_price: Option<Decimal>,
    pub limit_by_participant: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub name: Option<String>,
    pub promoter: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: Uuid,
    pub promoter_id: Uuid,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub tickets: i32,
    /// Present only when the viewer promotes the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickets_sold: Option<i32>,
    pub ticket_price: Decimal,
    pub limit_by_participant: bool,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventView {
    pub fn new(event: Event, show_tickets_sold: bool) -> Self {
        Self {
            id: event.id,
            promoter_id: event.promoter_id,
            name: event.name,
            address: event.address,
            description: event.description,
            start_date: event.start_date,
            end_date: event.end_date,
            tickets: event.tickets,
            tickets_sold: show_tickets_sold.then_some(event.tickets_sold),
            ticket_price: event.ticket_price,
            limit_by_participant: event.limit_by_participant,
            status: event.status,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub start_date: DateTime<Utc>,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            name: event.name.clone(),
            address: event.address.clone(),
            start_date: event.start_date,
        }
    }
}
