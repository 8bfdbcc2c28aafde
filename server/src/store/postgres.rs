//! PostgreSQL stores.
//!
//! Filters are assembled with `QueryBuilder`; sort columns come only from the
//! `SortField` whitelists. Inventory writes and the ticket status flip are
//! single conditional `UPDATE ... RETURNING` statements.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{EventStore, StoreError, StoreResult, TicketStore, UserStore};
use crate::models::event::{Event, EventChanges, EventFilter, EventSort, EventStatus};
use crate::models::pagination::{Page, PageRequest, SortField};
use crate::models::ticket::{Ticket, TicketFilter, TicketSort, TicketStatus};
use crate::models::user::{User, UserChanges, UserFilter, UserSort};

const USER_COLUMNS: &str = "id, name, tax_id, address, email, password, profile_type, \
     created_by, created_at, updated_by, updated_at, deleted_by, deleted_at";

const EVENT_COLUMNS: &str = "id, promoter_id, name, address, description, start_date, end_date, \
     tickets, tickets_sold, ticket_price, limit_by_participant, status, \
     created_by, created_at, updated_by, updated_at, deleted_by, deleted_at";

const TICKET_COLUMNS: &str = "id, participant_id, event_id, code, status, limited, \
     created_by, created_at, updated_by, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Unique violations become `Conflict` carrying the violated constraint name.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            if let Some(constraint) = db_err.constraint() {
                return StoreError::conflict(constraint);
            }
        }
    }
    StoreError::Database(e)
}

fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_order_and_page<S: SortField>(qb: &mut QueryBuilder<'_, Postgres>, page: &PageRequest<S>) {
    qb.push(" ORDER BY ")
        .push(page.order_by.column())
        .push(if page.desc { " DESC" } else { " ASC" })
        .push(", id ASC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset);
}

async fn count(pool: &PgPool, mut qb: QueryBuilder<'_, Postgres>) -> StoreResult<i64> {
    let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn push_user_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if !filter.ids.is_empty() {
        qb.push(" AND id = ANY(").push_bind(filter.ids.clone()).push(")");
    }
    if let Some(email) = &filter.email {
        qb.push(" AND email = ").push_bind(email.clone());
    }
    if let Some(tax_id) = &filter.tax_id {
        qb.push(" AND tax_id = ").push_bind(tax_id.clone());
    }
    if let Some(name) = &filter.name_contains {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
    }
    if let Some(email) = &filter.email_contains {
        qb.push(" AND email ILIKE ").push_bind(like_pattern(email));
    }
    if !filter.profile_types.is_empty() {
        let types: Vec<i16> = filter.profile_types.iter().map(|p| *p as i16).collect();
        qb.push(" AND profile_type = ANY(").push_bind(types).push(")");
    }
    if let Some(id) = filter.exclude_id {
        qb.push(" AND id <> ").push_bind(id);
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn select_one_by_filter(&self, filter: &UserFilter) -> StoreResult<Option<User>> {
        let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filter(&mut qb, filter);
        qb.push(" LIMIT 1");
        Ok(qb.build_query_as().fetch_optional(&self.pool).await?)
    }

    async fn select_many_by_filter(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
        let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filter(&mut qb, filter);
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn select_page(
        &self,
        filter: &UserFilter,
        page: &PageRequest<UserSort>,
    ) -> StoreResult<Page<User>> {
        let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filter(&mut qb, filter);
        push_order_and_page(&mut qb, page);
        let rows = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_user_filter(&mut count_qb, filter);
        let count = count(&self.pool, count_qb).await?;

        Ok(Page { rows, count })
    }

    async fn insert(&self, user: User) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(user.name)
        .bind(user.tax_id)
        .bind(user.address)
        .bind(user.email)
        .bind(user.password)
        .bind(user.profile_type)
        .bind(user.created_by)
        .bind(user.created_at)
        .bind(user.updated_by)
        .bind(user.updated_at)
        .bind(user.deleted_by)
        .bind(user.deleted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn update_fields(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                tax_id = COALESCE($3, tax_id), \
                address = COALESCE($4, address), \
                email = COALESCE($5, email), \
                updated_by = $6, \
                updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.tax_id.as_deref())
        .bind(changes.address.as_deref())
        .bind(changes.email.as_deref())
        .bind(&changes.updated_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn soft_delete(&self, id: Uuid, deleted_by: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_by = $2, deleted_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(deleted_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn push_event_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    qb.push(" WHERE TRUE");
    if !filter.include_deleted {
        qb.push(" AND deleted_at IS NULL");
    }
    if !filter.ids.is_empty() {
        qb.push(" AND id = ANY(").push_bind(filter.ids.clone()).push(")");
    }
    if let Some(name) = &filter.name {
        qb.push(" AND name = ").push_bind(name.clone());
    }
    if let Some(name) = &filter.name_contains {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
    }
    if let Some(promoter_id) = filter.promoter_id {
        qb.push(" AND promoter_id = ").push_bind(promoter_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(id) = filter.exclude_id {
        qb.push(" AND id <> ").push_bind(id);
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn select_one_by_filter(&self, filter: &EventFilter) -> StoreResult<Option<Event>> {
        let mut qb = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
        push_event_filter(&mut qb, filter);
        qb.push(" LIMIT 1");
        Ok(qb.build_query_as().fetch_optional(&self.pool).await?)
    }

    async fn select_many_by_filter(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let mut qb = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
        push_event_filter(&mut qb, filter);
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn select_page(
        &self,
        filter: &EventFilter,
        page: &PageRequest<EventSort>,
    ) -> StoreResult<Page<Event>> {
        let mut qb = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
        push_event_filter(&mut qb, filter);
        push_order_and_page(&mut qb, page);
        let rows = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM events");
        push_event_filter(&mut count_qb, filter);
        let count = count(&self.pool, count_qb).await?;

        Ok(Page { rows, count })
    }

    async fn insert(&self, event: Event) -> StoreResult<Event> {
        sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.id)
        .bind(event.promoter_id)
        .bind(event.name)
        .bind(event.address)
        .bind(event.description)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.tickets)
        .bind(event.tickets_sold)
        .bind(event.ticket_price)
        .bind(event.limit_by_participant)
        .bind(event.status)
        .bind(event.created_by)
        .bind(event.created_at)
        .bind(event.updated_by)
        .bind(event.updated_at)
        .bind(event.deleted_by)
        .bind(event.deleted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn update_fields(
        &self,
        id: Uuid,
        changes: &EventChanges,
    ) -> StoreResult<Option<Event>> {
        // The status is recomputed in the same statement against the final
        // capacity, so a concurrent sale cannot be lost or overflowed.
        let event = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET \
                name = COALESCE($2, name), \
                address = COALESCE($3, address), \
                description = COALESCE($4, description), \
                start_date = COALESCE($5, start_date), \
                end_date = COALESCE($6, end_date), \
                tickets = COALESCE($7, tickets), \
                ticket_price = COALESCE($8, ticket_price), \
                limit_by_participant = COALESCE($9, limit_by_participant), \
                status = CASE \
                    WHEN $10 OR status = $12 THEN $12 \
                    WHEN tickets_sold >= COALESCE($7, tickets) THEN $13 \
                    ELSE $14 END, \
                updated_by = $11, \
                updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL AND tickets_sold <= COALESCE($7, tickets) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.address.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.start_date)
        .bind(changes.end_date)
        .bind(changes.tickets)
        .bind(changes.ticket_price)
        .bind(changes.limit_by_participant)
        .bind(changes.cancel)
        .bind(&changes.updated_by)
        .bind(EventStatus::Cancelled)
        .bind(EventStatus::Closed)
        .bind(EventStatus::ForSale)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn soft_delete(&self, id: Uuid, deleted_by: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE events SET deleted_by = $2, deleted_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(deleted_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increase_tickets_sold(
        &self,
        id: Uuid,
        quantity: i32,
        updated_by: &str,
    ) -> StoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET \
                tickets_sold = tickets_sold + $2, \
                status = CASE WHEN tickets_sold + $2 = tickets THEN $5 ELSE status END, \
                updated_by = $3, \
                updated_at = NOW() \
             WHERE id = $1 \
               AND deleted_at IS NULL \
               AND status = $4 \
               AND tickets_sold + $2 <= tickets \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id)
        .bind(quantity)
        .bind(updated_by)
        .bind(EventStatus::ForSale)
        .bind(EventStatus::Closed)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn decrease_tickets_sold(
        &self,
        id: Uuid,
        quantity: i32,
        updated_by: &str,
    ) -> StoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET \
                tickets_sold = tickets_sold - $2, \
                status = CASE WHEN status = $4 THEN $5 ELSE status END, \
                updated_by = $3, \
                updated_at = NOW() \
             WHERE id = $1 AND $2 > 0 AND tickets_sold >= $2 \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(id)
        .bind(quantity)
        .bind(updated_by)
        .bind(EventStatus::Closed)
        .bind(EventStatus::ForSale)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

fn push_ticket_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TicketFilter) {
    qb.push(" WHERE TRUE");
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(event_id) = filter.event_id {
        qb.push(" AND event_id = ").push_bind(event_id);
    }
    if let Some(participant_id) = filter.participant_id {
        qb.push(" AND participant_id = ").push_bind(participant_id);
    }
    if let Some(promoter_id) = filter.promoter_id {
        qb.push(" AND event_id IN (SELECT id FROM events WHERE promoter_id = ")
            .push_bind(promoter_id)
            .push(")");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn select_by_id(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn select_one_by_filter(&self, filter: &TicketFilter) -> StoreResult<Option<Ticket>> {
        let mut qb = QueryBuilder::new(format!("SELECT {TICKET_COLUMNS} FROM tickets"));
        push_ticket_filter(&mut qb, filter);
        qb.push(" LIMIT 1");
        Ok(qb.build_query_as().fetch_optional(&self.pool).await?)
    }

    async fn select_many_by_filter(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let mut qb = QueryBuilder::new(format!("SELECT {TICKET_COLUMNS} FROM tickets"));
        push_ticket_filter(&mut qb, filter);
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn select_page(
        &self,
        filter: &TicketFilter,
        page: &PageRequest<TicketSort>,
    ) -> StoreResult<Page<Ticket>> {
        let mut qb = QueryBuilder::new(format!("SELECT {TICKET_COLUMNS} FROM tickets"));
        push_ticket_filter(&mut qb, filter);
        push_order_and_page(&mut qb, page);
        let rows = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM tickets");
        push_ticket_filter(&mut count_qb, filter);
        let count = count(&self.pool, count_qb).await?;

        Ok(Page { rows, count })
    }

    async fn insert_batch(&self, tickets: Vec<Ticket>) -> StoreResult<Vec<Ticket>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(tickets.len());

        for ticket in tickets {
            let row = sqlx::query_as::<_, Ticket>(&format!(
                "INSERT INTO tickets ({TICKET_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 RETURNING {TICKET_COLUMNS}"
            ))
            .bind(ticket.id)
            .bind(ticket.participant_id)
            .bind(ticket.event_id)
            .bind(ticket.code)
            .bind(ticket.status)
            .bind(ticket.limited)
            .bind(ticket.created_by)
            .bind(ticket.created_at)
            .bind(ticket.updated_by)
            .bind(ticket.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;
            inserted.push(row);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: TicketStatus,
        to: TicketStatus,
        updated_by: &str,
    ) -> StoreResult<Option<Ticket>> {
        sqlx::query_as::<_, Ticket>(&format!(
            "UPDATE tickets SET status = $3, updated_by = $4, updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(updated_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }
}
