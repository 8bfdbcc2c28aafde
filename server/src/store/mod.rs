//! Persistence contracts for users, events and tickets.
//!
//! Every store exposes the same narrow CRUD surface (`select_by_id`,
//! `select_one_by_filter`, `select_many_by_filter`, `select_page`, `insert`,
//! `update_fields`, `soft_delete`). The event store additionally owns the two
//! inventory primitives, and the ticket store the conditional status flip.
//! Both are single atomic conditional writes, so concurrent requests can never
//! push `tickets_sold` past capacity or cancel the same ticket twice.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::event::{Event, EventChanges, EventFilter, EventSort};
use crate::models::pagination::{Page, PageRequest};
use crate::models::ticket::{Ticket, TicketFilter, TicketSort, TicketStatus};
use crate::models::user::{User, UserChanges, UserFilter, UserSort};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Constraint backing the one-active-ticket-per-participant rule.
pub const ONE_ACTIVE_TICKET_CONSTRAINT: &str = "tickets_one_active_per_participant";
pub const TICKET_CODE_CONSTRAINT: &str = "tickets_code_key";
pub const USER_EMAIL_CONSTRAINT: &str = "users_email_live_key";
pub const USER_TAX_ID_CONSTRAINT: &str = "users_tax_id_live_key";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("constraint violated: {constraint}")]
    Conflict { constraint: String },
}

impl StoreError {
    pub fn conflict(constraint: &str) -> Self {
        StoreError::Conflict {
            constraint: constraint.to_string(),
        }
    }

    pub fn is_conflict_on(&self, name: &str) -> bool {
        matches!(self, StoreError::Conflict { constraint } if constraint == name)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Live (not soft-deleted) user by id.
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn select_one_by_filter(&self, filter: &UserFilter) -> StoreResult<Option<User>>;
    async fn select_many_by_filter(&self, filter: &UserFilter) -> StoreResult<Vec<User>>;
    async fn select_page(
        &self,
        filter: &UserFilter,
        page: &PageRequest<UserSort>,
    ) -> StoreResult<Page<User>>;
    async fn insert(&self, user: User) -> StoreResult<User>;
    async fn update_fields(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>>;
    async fn soft_delete(&self, id: Uuid, deleted_by: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Live (not soft-deleted) event by id.
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<Event>>;
    async fn select_one_by_filter(&self, filter: &EventFilter) -> StoreResult<Option<Event>>;
    async fn select_many_by_filter(&self, filter: &EventFilter) -> StoreResult<Vec<Event>>;
    async fn select_page(
        &self,
        filter: &EventFilter,
        page: &PageRequest<EventSort>,
    ) -> StoreResult<Page<Event>>;
    async fn insert(&self, event: Event) -> StoreResult<Event>;
    /// Applies `changes` to a live event. Returns `None` when the event is
    /// missing or when a new capacity would fall below `tickets_sold`.
    async fn update_fields(&self, id: Uuid, changes: &EventChanges)
        -> StoreResult<Option<Event>>;
    async fn soft_delete(&self, id: Uuid, deleted_by: &str) -> StoreResult<bool>;

    /// Atomically adds `quantity` to `tickets_sold` of a live FORSALE event
    /// provided the result stays within capacity, closing the event when it
    /// reaches capacity exactly. `None` means nothing was written.
    async fn increase_tickets_sold(
        &self,
        id: Uuid,
        quantity: i32,
        updated_by: &str,
    ) -> StoreResult<Option<Event>>;

    /// Atomically subtracts `quantity` from `tickets_sold` (never below zero)
    /// and reopens a CLOSED event. `None` means nothing was written.
    async fn decrease_tickets_sold(
        &self,
        id: Uuid,
        quantity: i32,
        updated_by: &str,
    ) -> StoreResult<Option<Event>>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<Ticket>>;
    async fn select_one_by_filter(&self, filter: &TicketFilter) -> StoreResult<Option<Ticket>>;
    async fn select_many_by_filter(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>>;
    async fn select_page(
        &self,
        filter: &TicketFilter,
        page: &PageRequest<TicketSort>,
    ) -> StoreResult<Page<Ticket>>;
    /// Inserts the whole batch or nothing. Violating the one-active-ticket or
    /// unique-code constraints yields `StoreError::Conflict`.
    async fn insert_batch(&self, tickets: Vec<Ticket>) -> StoreResult<Vec<Ticket>>;
    /// Moves a ticket from `from` to `to` only if it is currently in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        updated_by: &str,
    ) -> StoreResult<Option<Ticket>>;
}

/// The three stores the services are composed from.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub events: Arc<dyn EventStore>,
    pub tickets: Arc<dyn TicketStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            events: store.clone(),
            tickets: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            users: store.clone(),
            events: store.clone(),
            tickets: store,
        }
    }
}
