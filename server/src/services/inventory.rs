//! The only writer of `tickets_sold`.
//!
//! Capacity checks on the loaded event are a fast path; the authority is the
//! store's conditional write, which refuses to go past capacity or below zero
//! whatever the interleaving of concurrent requests.

use std::sync::Arc;

use tracing::{info, warn};

use crate::models::event::{Event, EventStatus};
use crate::store::EventStore;
use crate::utils::error::{AppError, ErrorCode};

#[derive(Clone)]
pub struct Inventory {
    events: Arc<dyn EventStore>,
}

impl Inventory {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// Sells `quantity` seats of a FORSALE event, closing it when it sells out.
    pub async fn increase_ticket_sold(
        &self,
        event: &Event,
        quantity: i32,
        updated_by: &str,
    ) -> Result<Event, AppError> {
        if event.status != EventStatus::ForSale {
            return Err(AppError::business(ErrorCode::UnavailableEvent));
        }
        if quantity > event.available() {
            return Err(AppError::business(ErrorCode::TicketLimitReached));
        }

        match self
            .events
            .increase_tickets_sold(event.id, quantity, updated_by)
            .await?
        {
            Some(updated) => {
                if updated.status == EventStatus::Closed {
                    info!(event_id = %updated.id, tickets = updated.tickets, "Event sold out");
                }
                Ok(updated)
            }
            None => Err(self.classify_refused_sale(event).await?),
        }
    }

    /// Frees one seat, reopening a CLOSED event.
    pub async fn decrease_ticket_sold(
        &self,
        event: &Event,
        updated_by: &str,
    ) -> Result<Event, AppError> {
        self.release(event, 1, updated_by).await
    }

    /// Gives back `quantity` seats, e.g. after a purchase failed to persist.
    pub async fn release(
        &self,
        event: &Event,
        quantity: i32,
        updated_by: &str,
    ) -> Result<Event, AppError> {
        let updated = self
            .events
            .decrease_tickets_sold(event.id, quantity, updated_by)
            .await?
            .ok_or_else(|| {
                warn!(event_id = %event.id, quantity, "Refused to release more seats than sold");
                AppError::InternalServerError(format!(
                    "cannot release {quantity} seat(s) of event {}",
                    event.id
                ))
            })?;

        if event.status == EventStatus::Closed && updated.status == EventStatus::ForSale {
            info!(event_id = %updated.id, "Event reopened for sale");
        }
        Ok(updated)
    }

    /// Works out why the conditional write touched nothing.
    async fn classify_refused_sale(&self, event: &Event) -> Result<AppError, AppError> {
        let code = match self.events.select_by_id(event.id).await? {
            None => ErrorCode::EntityNotFound,
            Some(current) if current.status == EventStatus::Cancelled => {
                ErrorCode::UnavailableEvent
            }
            Some(_) => ErrorCode::TicketLimitReached,
        };
        Ok(AppError::business(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventChanges;
    use crate::store::MemoryStore;
    use crate::testing;
    use uuid::Uuid;

    async fn setup(tickets: i32) -> (Inventory, Arc<MemoryStore>, Event) {
        let store = Arc::new(MemoryStore::new());
        let event = testing::event(Uuid::new_v4(), tickets, false);
        EventStore::insert(store.as_ref(), event.clone()).await.unwrap();
        (Inventory::new(store.clone()), store, event)
    }

    #[tokio::test]
    async fn test_sell_out_closes_and_release_reopens() {
        let (inventory, _, event) = setup(2).await;

        let event = inventory.increase_ticket_sold(&event, 2, "u").await.unwrap();
        assert_eq!(event.tickets_sold, 2);
        assert_eq!(event.status, EventStatus::Closed);

        let event = inventory.decrease_ticket_sold(&event, "u").await.unwrap();
        assert_eq!(event.tickets_sold, 1);
        assert_eq!(event.status, EventStatus::ForSale);
    }

    #[tokio::test]
    async fn test_over_capacity_is_limit_reached() {
        let (inventory, _, event) = setup(2).await;
        let err = inventory.increase_ticket_sold(&event, 3, "u").await.unwrap_err();
        assert_eq!(err.business_code(), Some(ErrorCode::TicketLimitReached));
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_classified_from_the_store() {
        let (inventory, store, event) = setup(2).await;

        // Someone else bought the last seats after `event` was loaded.
        store.increase_tickets_sold(event.id, 2, "other").await.unwrap();
        let err = inventory.increase_ticket_sold(&event, 1, "u").await.unwrap_err();
        assert_eq!(err.business_code(), Some(ErrorCode::TicketLimitReached));

        // ...and the promoter cancelled the event meanwhile.
        let cancel = EventChanges {
            cancel: true,
            ..EventChanges::default()
        };
        EventStore::update_fields(store.as_ref(), event.id, &cancel).await.unwrap();
        store.decrease_tickets_sold(event.id, 2, "other").await.unwrap();
        let err = inventory.increase_ticket_sold(&event, 1, "u").await.unwrap_err();
        assert_eq!(err.business_code(), Some(ErrorCode::UnavailableEvent));
    }

    #[tokio::test]
    async fn test_release_never_goes_below_zero() {
        let (inventory, _, event) = setup(2).await;
        let err = inventory.decrease_ticket_sold(&event, "u").await.unwrap_err();
        assert!(matches!(err, AppError::InternalServerError(_)));
    }
}
