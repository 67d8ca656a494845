//! The chat state container.
//!
//! A [`ChatClient`] is constructed once with its backend and configuration
//! and handed to every UI surface that needs chat data. Clones share the
//! same state. The UI only reads through it; all mutation goes through the
//! client's own operations.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use huddle_shared::{ConversationId, Message, Profile, UserId};
use huddle_store::{ChatBackend, Subscription, SubscriptionId};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{ChatEvent, EventBus};
use crate::reconciler::PushOutcome;
use crate::state::{ChatState, LiveSubscription};

pub(crate) struct Inner {
    backend: Arc<dyn ChatBackend>,
    config: ClientConfig,
    state: Mutex<ChatState>,
    events: EventBus,
}

#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn ChatBackend>, config: ClientConfig) -> Self {
        info!(
            send_failure = %config.send_failure,
            ordering = %config.ordering,
            "Chat client created"
        );
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ChatState::new(&config)),
                events: EventBus::new(config.event_buffer),
                backend,
                config,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Stream of change notifications for the UI.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events.subscribe()
    }

    /// Tear down the live push subscription. The client stays usable.
    pub async fn shutdown(&self) -> Result<()> {
        let released = {
            let mut st = self.state()?;
            let sub = st.take_subscription();
            st.active = None;
            st.bump_generation();
            sub
        };
        if released.is_some() {
            self.emit(ChatEvent::SubscriptionChanged {
                conversation_id: None,
            });
        }
        self.release(released).await;
        info!("Chat client shut down");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Crate internals
    // ------------------------------------------------------------------

    pub(crate) fn state(&self) -> Result<MutexGuard<'_, ChatState>> {
        self.inner.state.lock().map_err(|_| ClientError::LockPoisoned)
    }

    pub(crate) fn backend(&self) -> &dyn ChatBackend {
        &*self.inner.backend
    }

    pub(crate) fn emit(&self, event: ChatEvent) {
        self.inner.events.emit(event);
    }

    /// Stop a detached subscription locally and on the store side.
    pub(crate) async fn release(&self, subscription: Option<LiveSubscription>) {
        let Some(subscription) = subscription else {
            return;
        };
        let id = subscription.id;
        drop(subscription);
        self.unsubscribe_quietly(id).await;
    }

    pub(crate) async fn unsubscribe_quietly(&self, id: SubscriptionId) {
        if let Err(e) = self.backend().unsubscribe(id).await {
            warn!(subscription = %id, error = %e, "Unsubscribe failed");
        }
    }

    /// Profile lookup through the memo. Failures are soft.
    pub(crate) async fn fetch_profile(&self, user: &UserId) -> Option<Profile> {
        let cached = self
            .state()
            .ok()
            .and_then(|st| st.profiles.get(user).cloned());
        if cached.is_some() {
            return cached;
        }

        match self.backend().get_profile(user).await {
            Ok(profile) => {
                if let Ok(mut st) = self.state() {
                    st.profiles.insert(profile.id, profile.clone());
                }
                Some(profile)
            }
            Err(e) => {
                debug!(user = %user, error = %e, "Profile lookup failed");
                None
            }
        }
    }

    /// Start the task draining a subscription into the cache.
    ///
    /// The task holds only a weak reference to the client so an abandoned
    /// client is not kept alive by its push stream.
    pub(crate) fn spawn_push_loop(
        &self,
        subscription: Subscription,
        generation: u64,
    ) -> LiveSubscription {
        let Subscription {
            id,
            conversation_id,
            mut inserts,
        } = subscription;
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            while let Some(message) = inserts.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ChatClient { inner }
                    .handle_push(conversation_id, generation, message)
                    .await;
            }
            debug!(subscription = %id, conversation = %conversation_id, "Push stream ended");
        });

        LiveSubscription { id, task }
    }

    async fn handle_push(
        &self,
        conversation: ConversationId,
        generation: u64,
        mut message: Message,
    ) {
        if message.conversation_id != conversation {
            warn!(
                msg_id = %message.id,
                expected = %conversation,
                "Push for another conversation dropped"
            );
            return;
        }

        let known_profile = {
            let Ok(st) = self.state() else {
                return;
            };
            if !st.is_current(&conversation, generation) {
                debug!(msg_id = %message.id, conversation = %conversation, "Stale push dropped");
                return;
            }
            if st.cache.contains(&conversation, &message.id) {
                debug!(msg_id = %message.id, "Duplicate push ignored");
                return;
            }
            st.profiles.get(&message.author_id).cloned()
        };

        if message.author.is_none() {
            let profile = match known_profile {
                Some(profile) => Some(profile),
                None => self.fetch_profile(&message.author_id).await,
            };
            message.author = profile.map(|p| p.author_info());
        }

        let msg_id = message.id;
        let outcome = {
            let Ok(mut guard) = self.state() else {
                return;
            };
            // The profile lookup may have raced a conversation switch.
            if !guard.is_current(&conversation, generation) {
                debug!(msg_id = %msg_id, conversation = %conversation, "Stale push dropped");
                return;
            }
            let st = &mut *guard;
            st.reconciler.apply_push(&mut st.cache, message)
        };

        if outcome == PushOutcome::Inserted {
            debug!(msg_id = %msg_id, conversation = %conversation, "Push applied");
            self.emit(ChatEvent::MessagesChanged {
                conversation_id: conversation,
            });
        }
    }
}
