//! In-memory stores.
//!
//! All three tables sit behind one `RwLock`, so every write (including the
//! inventory primitives) is serialised exactly like a row-locked update.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    EventStore, StoreError, StoreResult, TicketStore, UserStore, ONE_ACTIVE_TICKET_CONSTRAINT,
    TICKET_CODE_CONSTRAINT, USER_EMAIL_CONSTRAINT, USER_TAX_ID_CONSTRAINT,
};
use crate::models::event::{Event, EventChanges, EventFilter, EventSort, EventStatus};
use crate::models::pagination::{Page, PageRequest};
use crate::models::ticket::{Ticket, TicketFilter, TicketSort, TicketStatus};
use crate::models::user::{User, UserChanges, UserFilter, UserSort};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    tickets: HashMap<Uuid, Ticket>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn paginate<T: Clone, S>(
    mut rows: Vec<T>,
    page: &PageRequest<S>,
    compare: impl Fn(&T, &T) -> Ordering,
) -> Page<T> {
    rows.sort_by(|a, b| page.directed(compare(a, b)));
    let count = rows.len() as i64;
    let rows = rows
        .into_iter()
        .skip(usize::try_from(page.offset).unwrap_or(usize::MAX))
        .take(usize::try_from(page.limit).unwrap_or(0))
        .collect();
    Page { rows, count }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn user_matches(user: &User, filter: &UserFilter) -> bool {
    !user.is_deleted()
        && (filter.ids.is_empty() || filter.ids.contains(&user.id))
        && filter.email.as_ref().map_or(true, |e| user.email == *e)
        && filter.tax_id.as_ref().map_or(true, |t| user.tax_id == *t)
        && filter
            .name_contains
            .as_ref()
            .map_or(true, |n| contains_ci(&user.name, n))
        && filter
            .email_contains
            .as_ref()
            .map_or(true, |e| contains_ci(&user.email, e))
        && (filter.profile_types.is_empty() || filter.profile_types.contains(&user.profile_type))
        && filter.exclude_id.map_or(true, |id| user.id != id)
}

fn compare_users(sort: UserSort, a: &User, b: &User) -> Ordering {
    match sort {
        UserSort::CreatedAt => a.created_at.cmp(&b.created_at),
        UserSort::Name => a.name.cmp(&b.name),
        UserSort::Email => a.email.cmp(&b.email),
    }
}

fn check_user_unique(tables: &Tables, user_id: Uuid, email: &str, tax_id: &str) -> StoreResult<()> {
    for other in tables.users.values() {
        if other.id == user_id || other.is_deleted() {
            continue;
        }
        if other.email == email {
            return Err(StoreError::conflict(USER_EMAIL_CONSTRAINT));
        }
        if other.tax_id == tax_id {
            return Err(StoreError::conflict(USER_TAX_ID_CONSTRAINT));
        }
    }
    Ok(())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).filter(|u| !u.is_deleted()).cloned())
    }

    async fn select_one_by_filter(&self, filter: &UserFilter) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| user_matches(u, filter))
            .cloned())
    }

    async fn select_many_by_filter(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| user_matches(u, filter))
            .cloned()
            .collect())
    }

    async fn select_page(
        &self,
        filter: &UserFilter,
        page: &PageRequest<UserSort>,
    ) -> StoreResult<Page<User>> {
        let rows = UserStore::select_many_by_filter(self, filter).await?;
        Ok(paginate(rows, page, |a, b| compare_users(page.order_by, a, b)))
    }

    async fn insert(&self, user: User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        check_user_unique(&tables, user.id, &user.email, &user.tax_id)?;
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_fields(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.users.get(&id).filter(|u| !u.is_deleted()) else {
            return Ok(None);
        };

        let mut updated = current.clone();
        if let Some(name) = &changes.name {
            updated.name = name.clone();
        }
        if let Some(tax_id) = &changes.tax_id {
            updated.tax_id = tax_id.clone();
        }
        if let Some(address) = &changes.address {
            updated.address = Some(address.clone());
        }
        if let Some(email) = &changes.email {
            updated.email = email.clone();
        }
        updated.updated_by = changes.updated_by.clone();
        updated.updated_at = Utc::now();

        check_user_unique(&tables, id, &updated.email, &updated.tax_id)?;
        tables.users.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn soft_delete(&self, id: Uuid, deleted_by: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&id).filter(|u| !u.is_deleted()) {
            Some(user) => {
                user.deleted_at = Some(Utc::now());
                user.deleted_by = Some(deleted_by.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn event_matches(event: &Event, filter: &EventFilter) -> bool {
    (filter.include_deleted || !event.is_deleted())
        && (filter.ids.is_empty() || filter.ids.contains(&event.id))
        && filter.name.as_ref().map_or(true, |n| event.name == *n)
        && filter
            .name_contains
            .as_ref()
            .map_or(true, |n| contains_ci(&event.name, n))
        && filter.promoter_id.map_or(true, |p| event.promoter_id == p)
        && filter.status.map_or(true, |s| event.status == s)
        && filter.exclude_id.map_or(true, |id| event.id != id)
}

fn compare_events(sort: EventSort, a: &Event, b: &Event) -> Ordering {
    match sort {
        EventSort::CreatedAt => a.created_at.cmp(&b.created_at),
        EventSort::Name => a.name.cmp(&b.name),
        EventSort::StartDate => a.start_date.cmp(&b.start_date),
        EventSort::TicketPrice => a.ticket_price.cmp(&b.ticket_price),
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let tables = self.tables.read().await;
        Ok(tables.events.get(&id).filter(|e| !e.is_deleted()).cloned())
    }

    async fn select_one_by_filter(&self, filter: &EventFilter) -> StoreResult<Option<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .values()
            .find(|e| event_matches(e, filter))
            .cloned())
    }

    async fn select_many_by_filter(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .values()
            .filter(|e| event_matches(e, filter))
            .cloned()
            .collect())
    }

    async fn select_page(
        &self,
        filter: &EventFilter,
        page: &PageRequest<EventSort>,
    ) -> StoreResult<Page<Event>> {
        let rows = EventStore::select_many_by_filter(self, filter).await?;
        Ok(paginate(rows, page, |a, b| compare_events(page.order_by, a, b)))
    }

    async fn insert(&self, event: Event) -> StoreResult<Event> {
        let mut tables = self.tables.write().await;
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn update_fields(
        &self,
        id: Uuid,
        changes: &EventChanges,
    ) -> StoreResult<Option<Event>> {
        let mut tables = self.tables.write().await;
        let Some(event) = tables.events.get_mut(&id).filter(|e| !e.is_deleted()) else {
            return Ok(None);
        };
        if changes.tickets.is_some_and(|t| t < event.tickets_sold) {
            return Ok(None);
        }

        let status = changes.resulting_status(event);
        if let Some(name) = &changes.name {
            event.name = name.clone();
        }
        if let Some(address) = &changes.address {
            event.address = address.clone();
        }
        if let Some(description) = &changes.description {
            event.description = Some(description.clone());
        }
        if let Some(start_date) = changes.start_date {
            event.start_date = start_date;
        }
        if let Some(end_date) = changes.end_date {
            event.end_date = end_date;
        }
        if let Some(tickets) = changes.tickets {
            event.tickets = tickets;
        }
        if let Some(price) = changes.ticket_price {
            event.ticket_price = price;
        }
        if let Some(limit) = changes.limit_by_participant {
            event.limit_by_participant = limit;
        }
        event.status = status;
        event.updated_by = changes.updated_by.clone();
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn soft_delete(&self, id: Uuid, deleted_by: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.events.get_mut(&id).filter(|e| !e.is_deleted()) {
            Some(event) => {
                event.deleted_at = Some(Utc::now());
                event.deleted_by = Some(deleted_by.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increase_tickets_sold(
        &self,
        id: Uuid,
        quantity: i32,
        updated_by: &str,
    ) -> StoreResult<Option<Event>> {
        let mut tables = self.tables.write().await;
        let Some(event) = tables.events.get_mut(&id).filter(|e| !e.is_deleted()) else {
            return Ok(None);
        };
        let sold = event.tickets_sold.checked_add(quantity);
        match sold {
            Some(sold) if event.status == EventStatus::ForSale && sold <= event.tickets => {
                event.tickets_sold = sold;
                if sold == event.tickets {
                    event.status = EventStatus::Closed;
                }
                event.updated_by = updated_by.to_string();
                event.updated_at = Utc::now();
                Ok(Some(event.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn decrease_tickets_sold(
        &self,
        id: Uuid,
        quantity: i32,
        updated_by: &str,
    ) -> StoreResult<Option<Event>> {
        let mut tables = self.tables.write().await;
        let Some(event) = tables.events.get_mut(&id) else {
            return Ok(None);
        };
        if quantity < 1 || event.tickets_sold < quantity {
            return Ok(None);
        }
        event.tickets_sold -= quantity;
        if event.status == EventStatus::Closed {
            event.status = EventStatus::ForSale;
        }
        event.updated_by = updated_by.to_string();
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

fn ticket_matches(tables: &Tables, ticket: &Ticket, filter: &TicketFilter) -> bool {
    filter.id.map_or(true, |id| ticket.id == id)
        && filter.event_id.map_or(true, |id| ticket.event_id == id)
        && filter.participant_id.map_or(true, |id| ticket.participant_id == id)
        && filter.status.map_or(true, |s| ticket.status == s)
        && filter.promoter_id.map_or(true, |promoter| {
            tables
                .events
                .get(&ticket.event_id)
                .is_some_and(|e| e.promoter_id == promoter)
        })
}

fn compare_tickets(sort: TicketSort, a: &Ticket, b: &Ticket) -> Ordering {
    match sort {
        TicketSort::CreatedAt => a.created_at.cmp(&b.created_at),
        TicketSort::Code => a.code.cmp(&b.code),
        TicketSort::Status => (a.status as i16).cmp(&(b.status as i16)),
    }
}

fn check_ticket_constraints(tables: &Tables, batch: &[Ticket]) -> StoreResult<()> {
    let existing = tables.tickets.values();
    for (index, ticket) in batch.iter().enumerate() {
        let earlier = &batch[..index];
        let others = || existing.clone().chain(earlier.iter());

        if others().any(|t| t.code == ticket.code) {
            return Err(StoreError::conflict(TICKET_CODE_CONSTRAINT));
        }
        if ticket.limited
            && ticket.status == TicketStatus::Active
            && others().any(|t| {
                t.limited
                    && t.status == TicketStatus::Active
                    && t.event_id == ticket.event_id
                    && t.participant_id == ticket.participant_id
            })
        {
            return Err(StoreError::conflict(ONE_ACTIVE_TICKET_CONSTRAINT));
        }
    }
    Ok(())
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables.tickets.get(&id).cloned())
    }

    async fn select_one_by_filter(&self, filter: &TicketFilter) -> StoreResult<Option<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .values()
            .find(|t| ticket_matches(&tables, t, filter))
            .cloned())
    }

    async fn select_many_by_filter(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .values()
            .filter(|t| ticket_matches(&tables, t, filter))
            .cloned()
            .collect())
    }

    async fn select_page(
        &self,
        filter: &TicketFilter,
        page: &PageRequest<TicketSort>,
    ) -> StoreResult<Page<Ticket>> {
        let rows = TicketStore::select_many_by_filter(self, filter).await?;
        Ok(paginate(rows, page, |a, b| compare_tickets(page.order_by, a, b)))
    }

    async fn insert_batch(&self, tickets: Vec<Ticket>) -> StoreResult<Vec<Ticket>> {
        let mut tables = self.tables.write().await;
        check_ticket_constraints(&tables, &tickets)?;
        for ticket in &tickets {
            tables.tickets.insert(ticket.id, ticket.clone());
        }
        Ok(tickets)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        updated_by: &str,
    ) -> StoreResult<Option<Ticket>> {
        let mut tables = self.tables.write().await;
        match tables.tickets.get_mut(&id).filter(|t| t.status == from) {
            Some(ticket) => {
                ticket.status = to;
                ticket.updated_by = updated_by.to_string();
                ticket.updated_at = Utc::now();
                Ok(Some(ticket.clone()))
            }
            None => Ok(None),
        }
    }
}
