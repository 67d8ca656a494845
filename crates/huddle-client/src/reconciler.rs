//! Merges the optimistic send path with the push path.
//!
//! A send is issued as a provisional entry keyed by a [`LocalId`] and
//! tracked in the pending map under `(conversation, local id)`. When the
//! store confirms it, the provisional entry is either promoted to the
//! confirmed message or, if the push for the same id already landed,
//! dropped. Pushes are matched by store id only.

use std::collections::HashMap;

use tracing::debug;

use huddle_shared::{ConversationId, CurrentUser, Message};

use crate::cache::{CachedMessage, DeliveryState, LocalId, MessageCache};
use crate::config::SendFailurePolicy;

/// Bookkeeping for a send that has not been confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub body: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The provisional entry now carries the store id.
    Promoted,
    /// The push path delivered the message first; the provisional entry was removed.
    AlreadyPresent,
    /// The provisional entry was gone (conversation re-opened); the confirmed
    /// message was inserted.
    Inserted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    MarkedFailed,
    RolledBack,
}

#[derive(Debug)]
pub struct Reconciler {
    pending: HashMap<(ConversationId, LocalId), PendingSend>,
    policy: SendFailurePolicy,
}

impl Reconciler {
    pub fn new(policy: SendFailurePolicy) -> Self {
        Self {
            pending: HashMap::new(),
            policy,
        }
    }

    /// Step 1: show the message at once and remember it as pending.
    pub fn issue(
        &mut self,
        cache: &mut MessageCache,
        local_id: LocalId,
        conversation: ConversationId,
        author: &CurrentUser,
        body: &str,
    ) -> CachedMessage {
        let entry = CachedMessage::provisional(local_id, conversation, author, body);
        self.pending.insert(
            (conversation, local_id),
            PendingSend {
                body: body.to_string(),
                attempts: 1,
            },
        );
        cache.insert(entry.clone());
        debug!(conversation = %conversation, local = %local_id, "Provisional entry issued");
        entry
    }

    /// Step 2: the store returned the authoritative copy.
    pub fn confirm(
        &mut self,
        cache: &mut MessageCache,
        local_id: LocalId,
        mut message: Message,
    ) -> ConfirmOutcome {
        let conversation = message.conversation_id;
        self.pending.remove(&(conversation, local_id));

        if cache.contains(&conversation, &message.id) {
            cache.remove_local(&conversation, local_id);
            debug!(
                msg_id = %message.id,
                local = %local_id,
                "Confirmation after push, provisional dropped"
            );
            return ConfirmOutcome::AlreadyPresent;
        }

        // The store does not echo author metadata on insert; keep what the
        // provisional entry showed.
        if message.author.is_none() {
            message.author = cache
                .get_local(&conversation, local_id)
                .and_then(|e| e.author.clone());
        }

        let msg_id = message.id;
        if cache.promote_local(&conversation, local_id, message.clone().into()) {
            debug!(msg_id = %msg_id, local = %local_id, "Provisional entry promoted");
            ConfirmOutcome::Promoted
        } else {
            cache.insert(message.into());
            debug!(
                msg_id = %msg_id,
                local = %local_id,
                "Provisional entry gone, confirmed copy inserted"
            );
            ConfirmOutcome::Inserted
        }
    }

    /// Step 3: a push arrived for the open conversation.
    pub fn apply_push(&self, cache: &mut MessageCache, message: Message) -> PushOutcome {
        if cache.contains(&message.conversation_id, &message.id) {
            debug!(msg_id = %message.id, "Duplicate push ignored");
            return PushOutcome::Duplicate;
        }
        cache.insert(message.into());
        PushOutcome::Inserted
    }

    /// The insert failed; apply the configured failure policy.
    pub fn fail(
        &mut self,
        cache: &mut MessageCache,
        conversation: ConversationId,
        local_id: LocalId,
    ) -> FailOutcome {
        match self.policy {
            SendFailurePolicy::MarkFailed => {
                cache.set_state(&conversation, local_id, DeliveryState::Failed);
                FailOutcome::MarkedFailed
            }
            SendFailurePolicy::Rollback => {
                self.pending.remove(&(conversation, local_id));
                cache.remove_local(&conversation, local_id);
                FailOutcome::RolledBack
            }
        }
    }

    /// Move a failed send back to pending. Returns the body to resend, or
    /// `None` when no failed entry with that key exists.
    pub fn begin_retry(
        &mut self,
        cache: &mut MessageCache,
        conversation: ConversationId,
        local_id: LocalId,
    ) -> Option<String> {
        let failed = cache
            .get_local(&conversation, local_id)
            .is_some_and(|e| e.state == DeliveryState::Failed);
        if !failed {
            return None;
        }

        let pending = self.pending.get_mut(&(conversation, local_id))?;
        pending.attempts += 1;
        cache.set_state(&conversation, local_id, DeliveryState::Pending);
        Some(pending.body.clone())
    }

    /// Forget pending sends of a conversation whose list was just replaced.
    pub fn forget_conversation(&mut self, conversation: &ConversationId) {
        self.pending.retain(|(c, _), _| c != conversation);
    }

    pub fn pending(
        &self,
        conversation: &ConversationId,
        local_id: LocalId,
    ) -> Option<&PendingSend> {
        self.pending.get(&(*conversation, local_id))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use huddle_shared::{MessageId, Role, UserId};

    use super::*;
    use crate::cache::EntryId;
    use crate::config::OrderingPolicy;

    fn me() -> CurrentUser {
        CurrentUser {
            id: UserId::new(),
            name: "Ada".into(),
            avatar_url: Some("https://cdn.example/ada.png".into()),
            role: Role::User,
        }
    }

    fn stored(conversation: ConversationId, author: &CurrentUser, body: &str) -> Message {
        Message {
            id: MessageId::new(),
            conversation_id: conversation,
            author_id: author.id,
            body: body.into(),
            created_at: Utc::now(),
            author: None,
        }
    }

    fn setup(policy: SendFailurePolicy) -> (Reconciler, MessageCache, ConversationId, CurrentUser) {
        (
            Reconciler::new(policy),
            MessageCache::new(OrderingPolicy::Chronological),
            ConversationId::new(),
            me(),
        )
    }

    #[test]
    fn test_issue_then_confirm_promotes() {
        let (mut rec, mut cache, c, user) = setup(SendFailurePolicy::MarkFailed);
        rec.issue(&mut cache, LocalId(1), c, &user, "hello");
        assert_eq!(cache.len(&c), 1);
        assert_eq!(rec.pending_count(), 1);

        let confirmed = stored(c, &user, "hello");
        let id = confirmed.id;
        assert_eq!(rec.confirm(&mut cache, LocalId(1), confirmed), ConfirmOutcome::Promoted);

        let list = cache.get(&c);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].entry_id, EntryId::Remote(id));
        assert_eq!(list[0].state, DeliveryState::Confirmed);
        assert_eq!(list[0].author.as_ref().and_then(|a| a.name.as_deref()), Some("Ada"));
        assert_eq!(rec.pending_count(), 0);
    }

    #[test]
    fn test_push_before_confirm_yields_one_entry() {
        let (mut rec, mut cache, c, user) = setup(SendFailurePolicy::MarkFailed);
        rec.issue(&mut cache, LocalId(1), c, &user, "hello");

        let confirmed = stored(c, &user, "hello");
        assert_eq!(rec.apply_push(&mut cache, confirmed.clone()), PushOutcome::Inserted);
        // Provisional and pushed copy both visible until confirmation.
        assert_eq!(cache.len(&c), 2);

        assert_eq!(
            rec.confirm(&mut cache, LocalId(1), confirmed.clone()),
            ConfirmOutcome::AlreadyPresent
        );
        let list = cache.get(&c);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_id(), Some(confirmed.id));
    }

    #[test]
    fn test_push_after_confirm_is_duplicate() {
        let (mut rec, mut cache, c, user) = setup(SendFailurePolicy::MarkFailed);
        rec.issue(&mut cache, LocalId(1), c, &user, "hello");
        let confirmed = stored(c, &user, "hello");
        rec.confirm(&mut cache, LocalId(1), confirmed.clone());

        assert_eq!(rec.apply_push(&mut cache, confirmed), PushOutcome::Duplicate);
        assert_eq!(cache.len(&c), 1);
    }

    #[test]
    fn test_confirm_after_replace_inserts() {
        let (mut rec, mut cache, c, user) = setup(SendFailurePolicy::MarkFailed);
        rec.issue(&mut cache, LocalId(1), c, &user, "hello");
        cache.replace(c, Vec::new());
        rec.forget_conversation(&c);

        let confirmed = stored(c, &user, "hello");
        assert_eq!(rec.confirm(&mut cache, LocalId(1), confirmed), ConfirmOutcome::Inserted);
        assert_eq!(cache.len(&c), 1);
    }

    #[test]
    fn test_failure_marks_then_retry() {
        let (mut rec, mut cache, c, user) = setup(SendFailurePolicy::MarkFailed);
        rec.issue(&mut cache, LocalId(3), c, &user, "again");

        assert_eq!(rec.fail(&mut cache, c, LocalId(3)), FailOutcome::MarkedFailed);
        assert_eq!(cache.get(&c)[0].state, DeliveryState::Failed);

        assert_eq!(rec.begin_retry(&mut cache, c, LocalId(3)).as_deref(), Some("again"));
        assert_eq!(cache.get(&c)[0].state, DeliveryState::Pending);
        assert_eq!(rec.pending(&c, LocalId(3)).map(|p| p.attempts), Some(2));
    }

    #[test]
    fn test_retry_requires_failed_state() {
        let (mut rec, mut cache, c, user) = setup(SendFailurePolicy::MarkFailed);
        rec.issue(&mut cache, LocalId(3), c, &user, "in flight");
        assert!(rec.begin_retry(&mut cache, c, LocalId(3)).is_none());
        assert!(rec.begin_retry(&mut cache, c, LocalId(99)).is_none());
    }

    #[test]
    fn test_failure_rollback_removes_entry() {
        let (mut rec, mut cache, c, user) = setup(SendFailurePolicy::Rollback);
        rec.issue(&mut cache, LocalId(4), c, &user, "oops");

        assert_eq!(rec.fail(&mut cache, c, LocalId(4)), FailOutcome::RolledBack);
        assert!(cache.get(&c).is_empty());
        assert_eq!(rec.pending_count(), 0);
    }
}
