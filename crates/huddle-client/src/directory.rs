//! The set of conversations visible to the signed-in user.

use std::collections::HashSet;

use tracing::debug;

use huddle_shared::{Conversation, ConversationId, ConversationKind, Profile, UserId};
use huddle_store::ChatBackend;

use crate::error::Result;

/// Result of one directory fetch.
#[derive(Debug, Default)]
pub struct DirectoryLoad {
    pub conversations: Vec<Conversation>,
    /// Counterpart profiles resolved along the way.
    pub profiles: Vec<Profile>,
}

/// Memberships plus every broadcast conversation, de-duplicated in
/// first-seen order, with private conversations renamed after the
/// counterpart's profile.
pub async fn fetch(backend: &dyn ChatBackend, user: &UserId) -> Result<DirectoryLoad> {
    let mut ids = backend.list_memberships(user).await?;
    let broadcasts = backend
        .list_conversations_by_kind(ConversationKind::Broadcast)
        .await?;
    ids.extend(broadcasts.iter().map(|c| c.id));

    let mut seen = HashSet::with_capacity(ids.len());
    ids.retain(|id| seen.insert(*id));

    if ids.is_empty() {
        return Ok(DirectoryLoad::default());
    }

    let mut conversations = backend.get_conversations_by_ids(&ids).await?;
    let mut profiles = Vec::new();

    for conversation in conversations
        .iter_mut()
        .filter(|c| c.kind == ConversationKind::Private)
    {
        let Some(other) = conversation.counterpart(user) else {
            continue;
        };
        match backend.get_profile(&other).await {
            Ok(profile) => {
                apply_counterpart_name(conversation, &profile);
                profiles.push(profile);
            }
            Err(e) => {
                debug!(
                    conversation = %conversation.id,
                    user = %other,
                    error = %e,
                    "Counterpart lookup failed, keeping stored name"
                );
            }
        }
    }

    Ok(DirectoryLoad {
        conversations,
        profiles,
    })
}

/// A profile name overrides the stored name of a private conversation.
pub fn apply_counterpart_name(conversation: &mut Conversation, profile: &Profile) {
    if let Some(name) = profile.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
        conversation.name = name.to_string();
    }
}

/// Cached directory. `None` until the first successful load.
#[derive(Debug, Default)]
pub struct Directory {
    conversations: Option<Vec<Conversation>>,
}

impl Directory {
    pub fn is_loaded(&self) -> bool {
        self.conversations.is_some()
    }

    pub fn replace(&mut self, conversations: Vec<Conversation>) {
        self.conversations = Some(conversations);
    }

    pub fn list(&self) -> &[Conversation] {
        self.conversations.as_deref().unwrap_or(&[])
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.list().iter().find(|c| c.id == *id)
    }

    /// `None` while nothing has been loaded.
    pub fn contains(&self, id: &ConversationId) -> Option<bool> {
        self.conversations
            .as_ref()
            .map(|list| list.iter().any(|c| c.id == *id))
    }

    /// Add a freshly created conversation. Ignored before the first load,
    /// which will pick it up from the store.
    pub fn add(&mut self, conversation: Conversation) {
        if let Some(list) = self.conversations.as_mut() {
            if !list.iter().any(|c| c.id == conversation.id) {
                list.push(conversation);
            }
        }
    }

    /// Case-insensitive substring match on the display name.
    pub fn search(&self, query: &str) -> Vec<Conversation> {
        let needle = query.trim().to_lowercase();
        self.list()
            .iter()
            .filter(|c| needle.is_empty() || c.display_name().to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.conversations = None;
    }
}
