use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::event::EventSummary;
use super::pagination::{PageParams, SortField};
use super::user::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i16)]
pub enum TicketStatus {
    Active = 0,
    Cancelled = 1,
}

impl TicketStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub event_id: Uuid,
    /// Opaque purchase code.
    pub code: String,
    pub status: TicketStatus,
    /// Copied from the event's `limit_by_participant` at issue time. Backs the
    /// one-active-ticket-per-participant constraint.
    pub limited: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub participant_id: Option<Uuid>,
    /// Tickets of events promoted by this user.
    pub promoter_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TicketSort {
    #[default]
    CreatedAt,
    Code,
    Status,
}

impl SortField for TicketSort {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "createdAt" => Some(Self::CreatedAt),
            "code" => Some(Self::Code),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Code => "code",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseTicketsRequest {
    pub event: Option<String>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTicketsQuery {
    pub event: Option<String>,
    pub participant: Option<String>,
    pub promoter: Option<String>,
    pub status: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    pub id: Uuid,
    pub code: String,
    pub status: TicketStatus,
    pub event: EventSummary,
    pub participant: UserSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketView {
    pub fn new(ticket: Ticket, event: EventSummary, participant: UserSummary) -> Self {
        Self {
            id: ticket.id,
            code: ticket.code,
            status: ticket.status,
            event,
            participant,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        }
    }
}
