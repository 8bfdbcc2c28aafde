//! Who may see or change what.
//!
//! Profile gates fail with `Forbidden`; ownership violations fail with the
//! `USER_BLOCKED` business error.

use uuid::Uuid;

use crate::models::event::Event;
use crate::models::ticket::{Ticket, TicketFilter, TicketStatus};
use crate::models::user::{Actor, ProfileType};
use crate::utils::error::{AppError, ErrorCode};

pub fn require_profile(actor: &Actor, allowed: &[ProfileType]) -> Result<(), AppError> {
    if allowed.contains(&actor.profile_type) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Profile {:?} may not perform this operation",
            actor.profile_type
        )))
    }
}

fn blocked() -> AppError {
    AppError::business(ErrorCode::UserBlocked)
}

/// Update and delete rights on an event: its promoter, or an admin.
pub fn ensure_event_manager(actor: &Actor, event: &Event) -> Result<(), AppError> {
    match actor.profile_type {
        ProfileType::Admin => Ok(()),
        ProfileType::Promoter if event.promoter_id == actor.id => Ok(()),
        _ => Err(blocked()),
    }
}

/// `ticketsSold` is visible to the event's promoter only.
pub fn sees_tickets_sold(actor: &Actor, event: &Event) -> bool {
    actor.profile_type == ProfileType::Promoter && event.promoter_id == actor.id
}

pub fn ensure_self_or_admin(actor: &Actor, user_id: Uuid) -> Result<(), AppError> {
    if actor.is_admin() || actor.id == user_id {
        Ok(())
    } else {
        Err(blocked())
    }
}

pub fn ensure_ticket_visible(actor: &Actor, ticket: &Ticket, event: &Event) -> Result<(), AppError> {
    let visible = match actor.profile_type {
        ProfileType::Admin => true,
        ProfileType::Promoter => event.promoter_id == actor.id,
        ProfileType::Participant => ticket.participant_id == actor.id,
    };
    if visible {
        Ok(())
    } else {
        Err(blocked())
    }
}

/// Narrows a ticket listing to what the actor may see.
pub fn scope_tickets(actor: &Actor, filter: &mut TicketFilter) {
    match actor.profile_type {
        ProfileType::Admin => {}
        ProfileType::Promoter => filter.promoter_id = Some(actor.id),
        ProfileType::Participant => filter.participant_id = Some(actor.id),
    }
}

/// A ticket's participant may cancel their own ticket and an event's promoter
/// may cancel tickets of that event. Nothing else is a legal transition.
pub fn ensure_ticket_transition(
    actor: &Actor,
    ticket: &Ticket,
    event: &Event,
    requested: TicketStatus,
) -> Result<(), AppError> {
    let owns = match actor.profile_type {
        ProfileType::Participant => ticket.participant_id == actor.id,
        ProfileType::Promoter => event.promoter_id == actor.id,
        ProfileType::Admin => false,
    };
    if !owns || requested == ticket.status || requested != TicketStatus::Cancelled {
        return Err(blocked());
    }
    Ok(())
}
