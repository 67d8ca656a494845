use serde::Serialize;
use tokio::sync::broadcast;

use huddle_shared::ConversationId;

use crate::cache::LocalId;

pub const EVENT_DIRECTORY_CHANGED: &str = "directory-changed";
pub const EVENT_MESSAGES_CHANGED: &str = "messages-changed";
pub const EVENT_SEND_FAILED: &str = "send-failed";
pub const EVENT_SUBSCRIPTION_CHANGED: &str = "subscription-changed";

/// Notifications for the UI layer. They carry ids only; the UI reads the
/// current state back through the client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ChatEvent {
    DirectoryChanged {
        count: usize,
    },
    MessagesChanged {
        conversation_id: ConversationId,
    },
    SendFailed {
        conversation_id: ConversationId,
        local_id: LocalId,
        error: String,
    },
    SubscriptionChanged {
        conversation_id: Option<ConversationId>,
    },
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DirectoryChanged { .. } => EVENT_DIRECTORY_CHANGED,
            Self::MessagesChanged { .. } => EVENT_MESSAGES_CHANGED,
            Self::SendFailed { .. } => EVENT_SEND_FAILED,
            Self::SubscriptionChanged { .. } => EVENT_SUBSCRIPTION_CHANGED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ChatEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "No event listeners");
        }
    }
}
