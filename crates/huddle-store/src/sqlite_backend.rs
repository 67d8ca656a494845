//! [`ChatBackend`] over a local SQLite database with in-process push.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use huddle_shared::constants::DEFAULT_PUSH_BUFFER;
use huddle_shared::{
    Conversation, ConversationId, ConversationKind, Message, NewConversation, Profile, UserId,
};

use crate::backend::{ChatBackend, Subscription, SubscriptionId};
use crate::database::Database;
use crate::error::{Result, StoreError};

struct Subscriber {
    conversation_id: ConversationId,
    tx: mpsc::Sender<Message>,
}

/// Authoritative store backed by SQLite.
///
/// Every successful insert is delivered to all live subscriptions of its
/// conversation, including the one belonging to the sender.
pub struct SqliteBackend {
    db: Mutex<Database>,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    next_subscription: AtomicU64,
    push_buffer: usize,
}

impl SqliteBackend {
    pub fn new(db: Database, push_buffer: usize) -> Self {
        Self {
            db: Mutex::new(db),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            push_buffer: push_buffer.max(1),
        }
    }

    pub fn open_at(path: &Path, push_buffer: usize) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?, push_buffer))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, DEFAULT_PUSH_BUFFER))
    }

    /// Number of live subscriptions, across all conversations.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("database lock poisoned: {e}")))
    }

    fn registry(&self) -> Result<MutexGuard<'_, HashMap<SubscriptionId, Subscriber>>> {
        self.subscribers
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("subscriber lock poisoned: {e}")))
    }

    fn fan_out(&self, message: &Message) -> Result<()> {
        let mut registry = self.registry()?;
        let mut closed = Vec::new();

        for (id, sub) in registry.iter() {
            if sub.conversation_id != message.conversation_id {
                continue;
            }
            match sub.tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscription = %id,
                        msg_id = %message.id,
                        "Push buffer full, dropping insert"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            debug!(subscription = %id, "Removing closed subscription");
            registry.remove(&id);
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for SqliteBackend {
    async fn list_memberships(&self, user: &UserId) -> Result<Vec<ConversationId>> {
        self.db()?.list_memberships(user)
    }

    async fn list_conversations_by_kind(
        &self,
        kind: ConversationKind,
    ) -> Result<Vec<Conversation>> {
        self.db()?.list_conversations_by_kind(kind)
    }

    async fn get_conversations_by_ids(&self, ids: &[ConversationId]) -> Result<Vec<Conversation>> {
        self.db()?.get_conversations_by_ids(ids)
    }

    async fn get_profile(&self, user: &UserId) -> Result<Profile> {
        self.db()?.get_profile(user)
    }

    async fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        self.db()?.list_messages(conversation)
    }

    async fn insert_message(
        &self,
        conversation: &ConversationId,
        author: &UserId,
        body: &str,
    ) -> Result<Message> {
        let message = self.db()?.insert_message(conversation, author, body)?;
        debug!(msg_id = %message.id, conversation = %conversation, "Message inserted");
        // The row is committed; a push failure must not turn into a failed send.
        if let Err(e) = self.fan_out(&message) {
            warn!(msg_id = %message.id, error = %e, "Push fan-out failed");
        }
        Ok(message)
    }

    async fn subscribe(&self, conversation: &ConversationId) -> Result<Subscription> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.push_buffer);

        self.registry()?.insert(
            id,
            Subscriber {
                conversation_id: *conversation,
                tx,
            },
        );

        info!(subscription = %id, topic = %conversation.to_topic(), "Subscribed");
        Ok(Subscription {
            id,
            conversation_id: *conversation,
            inserts: rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if self.registry()?.remove(&id).is_some() {
            info!(subscription = %id, "Unsubscribed");
        }
        Ok(())
    }

    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation> {
        let conversation = self.db()?.create_conversation(&new)?;
        info!(
            conversation = %conversation.id,
            kind = %conversation.kind,
            members = conversation.members.len(),
            "Conversation created"
        );
        Ok(conversation)
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.db()?.upsert_profile(profile)
    }
}
