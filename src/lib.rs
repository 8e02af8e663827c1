//! Turns Jira tickets into ready-to-send comms email drafts.
//!
//! A ticket reference is resolved through an [`api::IssueFetcher`] into a
//! [`models::Ticket`] (plain or OPS incident), which an
//! [`models::EmailDraft`] renders and formats as an `.eml` message.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod template;

pub use errors::{CommsError, Result};
