use tracing::{debug, info, warn};

use huddle_shared::constants::MAX_MESSAGE_SIZE;
use huddle_shared::{ConversationId, ConversationKind, MessageId, UserId};

use crate::cache::{CachedMessage, LocalId};
use crate::client::ChatClient;
use crate::error::{ClientError, Result};
use crate::events::ChatEvent;
use crate::state::ActiveConversation;

impl ChatClient {
    /// Make `id` the open conversation.
    ///
    /// Tears down the previous push subscription, subscribes to `id`, then
    /// replaces the cached list with the store's full history. Inserts that
    /// race the history read are buffered by the subscription and merged by
    /// id afterwards. If another switch happened meanwhile the history is
    /// discarded and [`ClientError::StaleResult`] is returned.
    pub async fn open_conversation(&self, id: ConversationId) -> Result<Vec<CachedMessage>> {
        let (generation, previous) = {
            let mut st = self.state()?;
            if st.session.is_none() {
                return Err(ClientError::Unauthenticated);
            }
            if st.directory.contains(&id) == Some(false) {
                return Err(ClientError::NotFound(format!("conversation {id}")));
            }
            let previous = st.take_subscription();
            let generation = st.bump_generation();
            st.active = Some(ActiveConversation {
                id,
                generation,
                subscription: None,
            });
            (generation, previous)
        };
        self.release(previous).await;

        let subscription = match self.backend().subscribe(&id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(conversation = %id, error = %e, "Subscribe failed");
                self.abandon_open(&id, generation);
                return Err(e.into());
            }
        };
        let history = match self.backend().list_messages(&id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(conversation = %id, error = %e, "History fetch failed");
                self.abandon_open(&id, generation);
                self.unsubscribe_quietly(subscription.id).await;
                return Err(e.into());
            }
        };

        let armed = {
            let mut guard = self.state()?;
            let st = &mut *guard;
            if st.is_current(&id, generation) {
                st.reconciler.forget_conversation(&id);
                let count = st.cache.replace(id, history);
                let live = self.spawn_push_loop(subscription, generation);
                if let Some(active) = st.active.as_mut() {
                    active.subscription = Some(live);
                }
                Ok((st.cache.get(&id), count))
            } else {
                Err(subscription.id)
            }
        };

        match armed {
            Ok((snapshot, count)) => {
                info!(conversation = %id, count, "Conversation opened");
                self.emit(ChatEvent::SubscriptionChanged {
                    conversation_id: Some(id),
                });
                self.emit(ChatEvent::MessagesChanged {
                    conversation_id: id,
                });
                Ok(snapshot)
            }
            Err(stale) => {
                debug!(
                    conversation = %id,
                    "Conversation switched during history fetch, result discarded"
                );
                self.unsubscribe_quietly(stale).await;
                Err(ClientError::StaleResult)
            }
        }
    }

    /// Leave no conversation open after a failed open, unless another
    /// switch already replaced it.
    fn abandon_open(&self, id: &ConversationId, generation: u64) {
        if let Ok(mut st) = self.state() {
            if st.is_current(id, generation) {
                st.active = None;
            }
        }
    }

    /// Cached messages of a conversation, empty if it was never opened.
    pub fn messages(&self, id: &ConversationId) -> Vec<CachedMessage> {
        self.state().map(|st| st.cache.get(id)).unwrap_or_default()
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.state().ok().and_then(|st| st.active_id())
    }

    /// Stop following the open conversation. Its cache is kept.
    pub async fn close_conversation(&self) -> Result<()> {
        let (released, closed) = {
            let mut st = self.state()?;
            let sub = st.take_subscription();
            let closed = st.active.take().map(|a| a.id);
            st.bump_generation();
            (sub, closed)
        };
        self.release(released).await;

        if let Some(id) = closed {
            info!(conversation = %id, "Conversation closed");
            self.emit(ChatEvent::SubscriptionChanged {
                conversation_id: None,
            });
        }
        Ok(())
    }

    /// Send a message. The cache shows it at once as a pending entry; the
    /// returned id is the one the store assigned.
    pub async fn send_message(
        &self,
        conversation: ConversationId,
        body: &str,
    ) -> Result<MessageId> {
        let (author, local_id) = {
            let mut guard = self.state()?;
            let st = &mut *guard;
            let user = st.session.clone().ok_or(ClientError::Unauthenticated)?;

            if body.trim().is_empty() {
                return Err(ClientError::EmptyMessage);
            }
            if body.len() > MAX_MESSAGE_SIZE {
                return Err(ClientError::MessageTooLarge {
                    size: body.len(),
                    max: MAX_MESSAGE_SIZE,
                });
            }
            let is_broadcast = st
                .directory
                .get(&conversation)
                .is_some_and(|c| c.kind == ConversationKind::Broadcast);
            if is_broadcast && !user.is_admin() {
                return Err(ClientError::Forbidden(
                    "only administrators can post to broadcast conversations".into(),
                ));
            }

            let local_id = st.next_local_id();
            st.reconciler
                .issue(&mut st.cache, local_id, conversation, &user, body);
            (user.id, local_id)
        };

        self.emit(ChatEvent::MessagesChanged {
            conversation_id: conversation,
        });
        self.deliver(conversation, local_id, author, body).await
    }

    /// Resend a failed message under its original local id.
    pub async fn retry_send(
        &self,
        conversation: ConversationId,
        local_id: LocalId,
    ) -> Result<MessageId> {
        let (author, body) = {
            let mut guard = self.state()?;
            let st = &mut *guard;
            let user = st.session.as_ref().ok_or(ClientError::Unauthenticated)?.id;
            let body = st
                .reconciler
                .begin_retry(&mut st.cache, conversation, local_id)
                .ok_or(ClientError::UnknownPendingSend(local_id))?;
            (user, body)
        };

        self.emit(ChatEvent::MessagesChanged {
            conversation_id: conversation,
        });
        self.deliver(conversation, local_id, author, &body).await
    }

    async fn deliver(
        &self,
        conversation: ConversationId,
        local_id: LocalId,
        author: UserId,
        body: &str,
    ) -> Result<MessageId> {
        match self.backend().insert_message(&conversation, &author, body).await {
            Ok(message) => {
                let msg_id = message.id;
                {
                    let mut guard = self.state()?;
                    let st = &mut *guard;
                    if st.session.as_ref().map(|u| u.id) == Some(author) {
                        let outcome = st.reconciler.confirm(&mut st.cache, local_id, message);
                        debug!(msg_id = %msg_id, local = %local_id, ?outcome, "Send confirmed");
                    }
                }
                info!(msg_id = %msg_id, conversation = %conversation, "Message sent");
                self.emit(ChatEvent::MessagesChanged {
                    conversation_id: conversation,
                });
                Ok(msg_id)
            }
            Err(e) => {
                let err = ClientError::from(e);
                {
                    let mut guard = self.state()?;
                    let st = &mut *guard;
                    if st.session.as_ref().map(|u| u.id) == Some(author) {
                        let outcome = st.reconciler.fail(&mut st.cache, conversation, local_id);
                        warn!(
                            conversation = %conversation,
                            local = %local_id,
                            ?outcome,
                            error = %err,
                            "Send failed"
                        );
                    }
                }
                self.emit(ChatEvent::SendFailed {
                    conversation_id: conversation,
                    local_id,
                    error: err.to_string(),
                });
                self.emit(ChatEvent::MessagesChanged {
                    conversation_id: conversation,
                });
                Err(err)
            }
        }
    }
}
