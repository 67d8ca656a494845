//! The seam between the chat client and the authoritative store.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use huddle_shared::{
    Conversation, ConversationId, ConversationKind, Message, NewConversation, Profile, UserId,
};

use crate::error::Result;

/// Handle returned by [`ChatBackend::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A live stream of inserts into one conversation.
///
/// The stream ends (`recv` returns `None`) once the subscription is removed
/// on the store side.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub conversation_id: ConversationId,
    pub inserts: mpsc::Receiver<Message>,
}

/// Operations the chat client needs from the system of record.
///
/// Every call may suspend; failures come back as [`StoreError`] values and
/// never as panics.
///
/// [`StoreError`]: crate::StoreError
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Ids of conversations the user explicitly belongs to.
    async fn list_memberships(&self, user: &UserId) -> Result<Vec<ConversationId>>;

    async fn list_conversations_by_kind(&self, kind: ConversationKind) -> Result<Vec<Conversation>>;

    /// Conversations for the given ids, in request order. Unknown ids are skipped.
    async fn get_conversations_by_ids(&self, ids: &[ConversationId]) -> Result<Vec<Conversation>>;

    /// `StoreError::NotFound` when the user has no profile.
    async fn get_profile(&self, user: &UserId) -> Result<Profile>;

    /// Full history, ascending by creation time, author info joined.
    async fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>>;

    /// Persist a message. The returned copy carries the store-assigned id
    /// and timestamp.
    async fn insert_message(
        &self,
        conversation: &ConversationId,
        author: &UserId,
        body: &str,
    ) -> Result<Message>;

    async fn subscribe(&self, conversation: &ConversationId) -> Result<Subscription>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation>;

    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;
}
