use thiserror::Error;

use crate::types::UserId;

/// Violations of the domain model invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Private conversation needs exactly 2 members, got {0}")]
    PrivateMemberCount(usize),

    #[error("Private conversation cannot be started with oneself ({0})")]
    SelfConversation(UserId),

    #[error("Unknown conversation kind: {0}")]
    UnknownKind(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}
