pub mod event;
pub mod pagination;
pub mod ticket;
pub mod user;

pub use event::{Event, EventStatus};
pub use pagination::{Page, PageRequest};
pub use ticket::{Ticket, TicketStatus};
pub use user::{Actor, ProfileType, User};
