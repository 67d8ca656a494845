use thiserror::Error;

use huddle_shared::ModelError;
use huddle_store::StoreError;

use crate::cache::LocalId;

/// Errors returned to the UI by [`ChatClient`](crate::ChatClient) operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No signed-in user. The store was not contacted.
    #[error("Not signed in")]
    Unauthenticated,

    /// Network or backend failure; cached state is left as it was.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Message body is empty")]
    EmptyMessage,

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid conversation: {0}")]
    InvalidConversation(#[from] ModelError),

    /// Retry was requested for a send that is not in the failed state.
    #[error("No failed send {0} in this conversation")]
    UnknownPendingSend(LocalId),

    /// The result arrived after the user switched conversation or account
    /// and was discarded.
    #[error("Result discarded: active conversation or user changed")]
    StaleResult,

    #[error("State lock poisoned")]
    LockPoisoned,
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ClientError::NotFound("record".into()),
            StoreError::InvalidConversation(m) => ClientError::InvalidConversation(m),
            other => ClientError::StoreUnavailable(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
