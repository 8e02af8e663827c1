pub mod email;
pub mod ticket;

pub use email::EmailDraft;
pub use ticket::{Ticket, TicketKind};
