use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{PRIVATE_MEMBER_COUNT, UNTITLED_CONVERSATION};
use crate::error::ModelError;

// User identity = opaque id issued by the auth provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Name of the push channel carrying inserts for this conversation.
    pub fn to_topic(&self) -> String {
        format!("chat:{}", self.0)
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the authoritative store when a message is persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
    /// Visible to every user regardless of membership.
    Broadcast,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            "broadcast" => Ok(Self::Broadcast),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}

/// A named channel of messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// Stored name. For private conversations the directory replaces it with
    /// the counterpart's profile name when one is available.
    pub name: String,
    pub kind: ConversationKind,
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            UNTITLED_CONVERSATION
        } else {
            &self.name
        }
    }

    /// The non-self member of a private conversation.
    pub fn counterpart(&self, me: &UserId) -> Option<UserId> {
        if self.kind != ConversationKind::Private {
            return None;
        }
        self.members.iter().find(|m| *m != me).copied()
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.kind == ConversationKind::Broadcast || self.members.contains(user)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.kind == ConversationKind::Private && self.members.len() != PRIVATE_MEMBER_COUNT {
            return Err(ModelError::PrivateMemberCount(self.members.len()));
        }
        Ok(())
    }
}

/// Request to create a conversation in the authoritative store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewConversation {
    pub name: String,
    pub kind: ConversationKind,
    pub members: BTreeSet<UserId>,
}

impl NewConversation {
    pub fn private(me: UserId, other: UserId) -> Result<Self, ModelError> {
        if me == other {
            return Err(ModelError::SelfConversation(me));
        }
        Ok(Self {
            name: String::new(),
            kind: ConversationKind::Private,
            members: [me, other].into_iter().collect(),
        })
    }

    pub fn group(name: impl Into<String>, members: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            name: name.into(),
            kind: ConversationKind::Group,
            members: members.into_iter().collect(),
        }
    }

    pub fn broadcast(name: impl Into<String>, owner: UserId) -> Self {
        Self {
            name: name.into(),
            kind: ConversationKind::Broadcast,
            members: [owner].into_iter().collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.kind == ConversationKind::Private && self.members.len() != PRIVATE_MEMBER_COUNT {
            return Err(ModelError::PrivateMemberCount(self.members.len()));
        }
        Ok(())
    }
}

/// Author display metadata resolved at read time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorInfo {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorInfo>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(ModelError::UnknownRole(other.to_string())),
        }
    }
}

/// Public profile of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl Profile {
    pub fn author_info(&self) -> AuthorInfo {
        AuthorInfo {
            name: self.full_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// The signed-in user as seen by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn author_info(&self) -> AuthorInfo {
        AuthorInfo {
            name: Some(self.name.clone()),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

impl From<Profile> for CurrentUser {
    fn from(p: Profile) -> Self {
        Self {
            name: p.full_name.unwrap_or_else(|| p.id.short()),
            id: p.id,
            avatar_url: p.avatar_url,
            role: p.role,
        }
    }
}
