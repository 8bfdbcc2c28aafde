//! The engine and the access rules, composed once at start-up.

use std::sync::Arc;

use crate::auth::{PasswordHasher, SessionTokens};
use crate::config::Config;
use crate::store::Stores;

pub mod access;
pub mod credentials;
pub mod events;
pub mod inventory;
pub mod tickets;
pub mod users;

pub use credentials::CredentialService;
pub use events::EventService;
pub use inventory::Inventory;
pub use tickets::TicketService;
pub use users::UserService;

#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub credentials: CredentialService,
    pub events: EventService,
    pub tickets: TicketService,
}

impl Services {
    pub fn new(stores: Stores, hasher: Arc<dyn PasswordHasher>, tokens: Arc<SessionTokens>) -> Self {
        let inventory = Inventory::new(stores.events.clone());
        Self {
            users: UserService::new(stores.users.clone(), hasher.clone(), tokens.clone()),
            credentials: CredentialService::new(stores.users.clone(), hasher, tokens),
            events: EventService::new(stores.events.clone()),
            tickets: TicketService::new(&stores, inventory),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Services,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, hasher: Arc<dyn PasswordHasher>) -> Self {
        let tokens = Arc::new(SessionTokens::new(
            config.access_token_ttl,
            config.refresh_token_ttl,
        ));
        Self {
            config: Arc::new(config),
            services: Services::new(stores, hasher, tokens),
        }
    }
}
