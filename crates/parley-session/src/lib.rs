//! Per-client conversation sessions with inactivity expiry and reset.

pub mod command;
pub mod error;
pub mod session;
pub mod store;

pub use command::is_reset_command;
pub use error::{Result, SessionError};
pub use session::Session;
pub use store::{SessionStore, StoreConfig, TurnGuard, TurnTicket};

#[cfg(test)]
mod tests;
