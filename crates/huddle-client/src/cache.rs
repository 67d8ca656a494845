//! Per-conversation ordered message lists.
//!
//! The cache is the only owner of the lists the UI renders. Entries are
//! either provisional (keyed by a client-local id) or authoritative (keyed
//! by the store-assigned [`MessageId`]); no two entries of one conversation
//! share an authoritative id.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use huddle_shared::{AuthorInfo, ConversationId, CurrentUser, Message, MessageId, UserId};

use crate::config::OrderingPolicy;

/// Client-side key of a provisional entry. Never sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub u64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntryId {
    Local(LocalId),
    Remote(MessageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Shown locally, store confirmation outstanding.
    Pending,
    Confirmed,
    /// The insert failed; the entry waits for a retry.
    Failed,
}

/// One row of a conversation as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMessage {
    pub entry_id: EntryId,
    pub conversation_id: ConversationId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<AuthorInfo>,
    pub state: DeliveryState,
}

impl CachedMessage {
    pub fn provisional(
        local_id: LocalId,
        conversation_id: ConversationId,
        author: &CurrentUser,
        body: &str,
    ) -> Self {
        Self {
            entry_id: EntryId::Local(local_id),
            conversation_id,
            author_id: author.id,
            body: body.to_string(),
            created_at: Utc::now(),
            author: Some(author.author_info()),
            state: DeliveryState::Pending,
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        match self.entry_id {
            EntryId::Remote(id) => Some(id),
            EntryId::Local(_) => None,
        }
    }

    pub fn local_id(&self) -> Option<LocalId> {
        match self.entry_id {
            EntryId::Local(id) => Some(id),
            EntryId::Remote(_) => None,
        }
    }
}

impl From<Message> for CachedMessage {
    fn from(m: Message) -> Self {
        Self {
            entry_id: EntryId::Remote(m.id),
            conversation_id: m.conversation_id,
            author_id: m.author_id,
            body: m.body,
            created_at: m.created_at,
            author: m.author,
            state: DeliveryState::Confirmed,
        }
    }
}

#[derive(Debug)]
pub struct MessageCache {
    lists: HashMap<ConversationId, Vec<CachedMessage>>,
    ordering: OrderingPolicy,
}

impl MessageCache {
    pub fn new(ordering: OrderingPolicy) -> Self {
        Self {
            lists: HashMap::new(),
            ordering,
        }
    }

    /// Snapshot of a conversation, empty if it was never opened.
    pub fn get(&self, conversation: &ConversationId) -> Vec<CachedMessage> {
        self.lists.get(conversation).cloned().unwrap_or_default()
    }

    pub fn len(&self, conversation: &ConversationId) -> usize {
        self.lists.get(conversation).map_or(0, Vec::len)
    }

    /// Replace a conversation's list with an authoritative history.
    ///
    /// The history is expected oldest-first; it is sorted (stable) and
    /// de-duplicated by id anyway so the cache invariants hold whatever the
    /// store returns.
    pub fn replace(&mut self, conversation: ConversationId, history: Vec<Message>) -> usize {
        let mut seen = HashSet::with_capacity(history.len());
        let mut entries: Vec<CachedMessage> = history
            .into_iter()
            .filter(|m| m.conversation_id == conversation && seen.insert(m.id))
            .map(CachedMessage::from)
            .collect();
        entries.sort_by_key(|e| e.created_at);

        let count = entries.len();
        self.lists.insert(conversation, entries);
        count
    }

    pub fn contains(&self, conversation: &ConversationId, id: &MessageId) -> bool {
        self.lists
            .get(conversation)
            .is_some_and(|list| list.iter().any(|e| e.message_id().as_ref() == Some(id)))
    }

    /// Insert an entry according to the ordering policy. Returns its index.
    pub fn insert(&mut self, entry: CachedMessage) -> usize {
        let ordering = self.ordering;
        let list = self.lists.entry(entry.conversation_id).or_default();
        let idx = match ordering {
            OrderingPolicy::Arrival => list.len(),
            OrderingPolicy::Chronological => {
                list.partition_point(|e| e.created_at <= entry.created_at)
            }
        };
        list.insert(idx, entry);
        idx
    }

    pub fn get_local(
        &self,
        conversation: &ConversationId,
        local: LocalId,
    ) -> Option<&CachedMessage> {
        self.lists
            .get(conversation)?
            .iter()
            .find(|e| e.local_id() == Some(local))
    }

    pub fn remove_local(
        &mut self,
        conversation: &ConversationId,
        local: LocalId,
    ) -> Option<CachedMessage> {
        let list = self.lists.get_mut(conversation)?;
        let pos = list.iter().position(|e| e.local_id() == Some(local))?;
        Some(list.remove(pos))
    }

    /// Swap a provisional entry for its confirmed form.
    ///
    /// Under arrival ordering the entry keeps its slot; under chronological
    /// ordering it moves to the slot matching the store timestamp.
    pub fn promote_local(
        &mut self,
        conversation: &ConversationId,
        local: LocalId,
        confirmed: CachedMessage,
    ) -> bool {
        let Some(list) = self.lists.get_mut(conversation) else {
            return false;
        };
        let Some(pos) = list.iter().position(|e| e.local_id() == Some(local)) else {
            return false;
        };

        match self.ordering {
            OrderingPolicy::Arrival => list[pos] = confirmed,
            OrderingPolicy::Chronological => {
                list.remove(pos);
                self.insert(confirmed);
            }
        }
        true
    }

    pub fn set_state(
        &mut self,
        conversation: &ConversationId,
        local: LocalId,
        state: DeliveryState,
    ) -> bool {
        let entry = self
            .lists
            .get_mut(conversation)
            .and_then(|list| list.iter_mut().find(|e| e.local_id() == Some(local)));
        match entry {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.lists.clear();
    }
}
