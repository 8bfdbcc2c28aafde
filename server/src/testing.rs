//! Fixtures shared by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auth::{Argon2Hasher, PasswordHasher, SessionTokens};
use crate::config::Config;
use crate::models::event::{CreateEventRequest, Event, EventStatus};
use crate::models::ticket::{Ticket, TicketStatus};
use crate::models::user::{Actor, CreateUserRequest, ProfileType, User, SYSTEM};
use crate::services::{AppState, Services};
use crate::store::Stores;

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn check_digit(digits: &[u32], weights: impl Iterator<Item = u32>, cpf: bool) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    if cpf {
        (sum * 10) % 11 % 10
    } else {
        match sum % 11 {
            r if r < 2 => 0,
            r => 11 - r,
        }
    }
}

fn random_digits(len: usize) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    loop {
        let digits: Vec<u32> = (0..len).map(|_| rng.gen_range(0..10)).collect();
        if digits.iter().any(|d| *d != digits[0]) {
            return digits;
        }
    }
}

fn render(digits: &[u32]) -> String {
    digits.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect()
}

pub fn cpf() -> String {
    let mut digits = random_digits(9);
    let first = check_digit(&digits, (2..=10).rev(), true);
    digits.push(first);
    let second = check_digit(&digits, (2..=11).rev(), true);
    digits.push(second);
    render(&digits)
}

pub fn cnpj() -> String {
    let mut digits = random_digits(12);
    let first = check_digit(&digits, [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2].into_iter(), false);
    digits.push(first);
    let second = check_digit(&digits, [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2].into_iter(), false);
    digits.push(second);
    render(&digits)
}

pub fn actor(profile_type: ProfileType) -> Actor {
    Actor {
        id: Uuid::new_v4(),
        name: format!("{profile_type:?} {}", short_id()),
        profile_type,
    }
}

pub fn user_for(actor: &Actor) -> User {
    let now = Utc::now();
    User {
        id: actor.id,
        name: actor.name.clone(),
        tax_id: match actor.profile_type {
            ProfileType::Promoter => cnpj(),
            _ => cpf(),
        },
        address: None,
        email: format!("{}@example.com", short_id()),
        password: String::new(),
        profile_type: actor.profile_type,
        created_by: SYSTEM.to_string(),
        created_at: now,
        updated_by: SYSTEM.to_string(),
        updated_at: now,
        deleted_by: None,
        deleted_at: None,
    }
}

pub fn event(promoter_id: Uuid, tickets: i32, limit_by_participant: bool) -> Event {
    let now = Utc::now();
    Event {
        id: Uuid::new_v4(),
        promoter_id,
        name: format!("Event {}", short_id()),
        address: "Rua Augusta, 500".to_string(),
        description: None,
        start_date: now + chrono::Duration::days(30),
        end_date: now + chrono::Duration::days(30) + chrono::Duration::hours(4),
        tickets,
        tickets_sold: 0,
        ticket_price: Decimal::new(8000, 2),
        limit_by_participant,
        status: EventStatus::ForSale,
        created_by: promoter_id.to_string(),
        created_at: now,
        updated_by: promoter_id.to_string(),
        updated_at: now,
        deleted_by: None,
        deleted_at: None,
    }
}

pub fn ticket(event: &Event, participant_id: Uuid) -> Ticket {
    let now = Utc::now();
    Ticket {
        id: Uuid::new_v4(),
        participant_id,
        event_id: event.id,
        code: short_id().to_uppercase(),
        status: TicketStatus::Active,
        limited: event.limit_by_participant,
        created_by: participant_id.to_string(),
        created_at: now,
        updated_by: participant_id.to_string(),
        updated_at: now,
    }
}

pub fn create_event_request(name: &str, tickets: i64) -> CreateEventRequest {
    let start = Utc::now() + chrono::Duration::days(10);
    CreateEventRequest {
        name: Some(name.to_string()),
        address: Some("Av. Brasil, 1500".to_string()),
        description: Some("Open air".to_string()),
        start_date: Some(start.to_rfc3339()),
        end_date: Some((start + chrono::Duration::hours(5)).to_rfc3339()),
        tickets: Some(tickets),
        ticket_price: Some(Decimal::new(12050, 2)),
        limit_by_participant: Some(false),
    }
}

pub fn hasher() -> Arc<dyn PasswordHasher> {
    match Argon2Hasher::with_params(8, 1, 1) {
        Ok(hasher) => Arc::new(hasher),
        Err(e) => panic!("test hasher: {e}"),
    }
}

pub fn services() -> Services {
    let tokens = Arc::new(SessionTokens::new(
        Duration::from_secs(60),
        Duration::from_secs(600),
    ));
    Services::new(Stores::memory(), hasher(), tokens)
}

pub fn state() -> AppState {
    AppState::new(Config::default(), Stores::memory(), hasher())
}

/// Registers a user through the service and returns its row (without the
/// digest).
pub async fn registered_user(services: &Services, profile_type: ProfileType, password: &str) -> User {
    let request = CreateUserRequest {
        name: Some(format!("User {}", short_id())),
        tax_id: Some(match profile_type {
            ProfileType::Promoter => cnpj(),
            _ => cpf(),
        }),
        address: None,
        email: Some(format!("{}@example.com", short_id())),
        password: Some(password.to_string()),
        password_confirmation: Some(password.to_string()),
        profile_type: Some(format!("{profile_type:?}").to_uppercase()),
    };
    let view = match profile_type {
        ProfileType::Admin => services
            .users
            .admin_create(request, &actor(ProfileType::Admin))
            .await
            .unwrap(),
        _ => services.users.signup(request).await.unwrap(),
    };
    User {
        id: view.id,
        name: view.name,
        tax_id: view.tax_id,
        address: view.address,
        email: view.email,
        password: String::new(),
        profile_type: view.profile_type,
        created_by: SYSTEM.to_string(),
        created_at: view.created_at,
        updated_by: SYSTEM.to_string(),
        updated_at: view.updated_at,
        deleted_by: None,
        deleted_at: None,
    }
}
