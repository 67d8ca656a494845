//! State owned by a [`ChatClient`](crate::ChatClient).
//!
//! [`ChatState`] sits behind a `std::sync::Mutex` inside the client. The
//! lock is only ever held for synchronous bookkeeping, never across a call
//! to the store.

use std::collections::HashMap;

use tokio::task::JoinHandle;

use huddle_shared::{ConversationId, CurrentUser, Profile, UserId};
use huddle_store::SubscriptionId;

use crate::cache::{LocalId, MessageCache};
use crate::config::ClientConfig;
use crate::directory::Directory;
use crate::reconciler::Reconciler;

/// The push subscription armed for the open conversation.
///
/// Dropping it stops the push task; the store side is released separately
/// with [`ChatBackend::unsubscribe`](huddle_store::ChatBackend::unsubscribe).
#[derive(Debug)]
pub(crate) struct LiveSubscription {
    pub id: SubscriptionId,
    pub task: JoinHandle<()>,
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug)]
pub(crate) struct ActiveConversation {
    pub id: ConversationId,
    pub generation: u64,
    pub subscription: Option<LiveSubscription>,
}

#[derive(Debug)]
pub(crate) struct ChatState {
    /// The signed-in user. `None` until sign-in.
    pub session: Option<CurrentUser>,

    pub directory: Directory,

    pub cache: MessageCache,

    pub reconciler: Reconciler,

    /// Profiles already fetched, used to enrich pushed messages.
    pub profiles: HashMap<UserId, Profile>,

    /// The open conversation, if any.
    pub active: Option<ActiveConversation>,

    /// Bumped on every conversation switch and on sign-in/out. Results
    /// tagged with an older value are discarded.
    pub generation: u64,

    /// Bumped on every directory load; only the latest load may apply.
    pub directory_generation: u64,

    next_local_id: u64,
}

impl ChatState {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            session: None,
            directory: Directory::default(),
            cache: MessageCache::new(config.ordering),
            reconciler: Reconciler::new(config.send_failure),
            profiles: HashMap::new(),
            active: None,
            generation: 0,
            directory_generation: 0,
            next_local_id: 1,
        }
    }

    pub fn next_local_id(&mut self) -> LocalId {
        let id = LocalId(self.next_local_id);
        self.next_local_id += 1;
        id
    }

    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Whether `conversation` is still the open one for `generation`.
    pub fn is_current(&self, conversation: &ConversationId, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.id == *conversation && a.generation == generation)
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Detach the live subscription, if any. The caller releases it on the
    /// store side.
    pub fn take_subscription(&mut self) -> Option<LiveSubscription> {
        self.active.as_mut().and_then(|a| a.subscription.take())
    }

    /// Forget everything tied to the signed-in user.
    pub fn reset(&mut self) {
        self.directory.clear();
        self.cache.clear();
        self.reconciler.clear();
        self.profiles.clear();
        self.active = None;
        self.bump_generation();
    }
}
