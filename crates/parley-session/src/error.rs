use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No conversation for id {id}")]
    NotFound { id: String },
    /// The conversation was reset or expired while a turn was in flight.
    #[error("Conversation {id} was replaced while a reply was pending")]
    Superseded { id: String },
    #[error("A reply for {id} is already in progress")]
    Busy { id: String },
    #[error("Request limit exceeded for {id} ({count} > {limit})")]
    RateLimited { id: String, count: u64, limit: u64 },
}

pub type Result<T> = std::result::Result<T, SessionError>;
