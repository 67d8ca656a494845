//! Test doubles for driving a [`ChatClient`] through awkward timings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use huddle_shared::{
    Conversation, ConversationId, ConversationKind, CurrentUser, Message, NewConversation,
    Profile, Role, UserId,
};
use huddle_store::{ChatBackend, Result, SqliteBackend, StoreError, Subscription, SubscriptionId};

use crate::client::ChatClient;
use crate::config::ClientConfig;

fn scripted_failure() -> StoreError {
    StoreError::Unavailable("scripted failure".into())
}

/// In-memory SQLite backend with switches for failures and gates that
/// park a call until the test lets it through.
pub(crate) struct ScriptedBackend {
    pub inner: SqliteBackend,
    pub fail_inserts: AtomicBool,
    pub fail_profiles: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_subscribe: AtomicBool,
    hold_confirmations: AtomicBool,
    confirmations: Semaphore,
    history_gate: Mutex<Option<ConversationId>>,
    history_release: Semaphore,
    /// Signalled when a gated history read is parked.
    pub history_entered: Notify,
    memberships_gate: AtomicBool,
    memberships_release: Semaphore,
    /// Signalled when a gated membership read is parked.
    pub memberships_entered: Notify,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            inner: SqliteBackend::open_in_memory().unwrap(),
            fail_inserts: AtomicBool::new(false),
            fail_profiles: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            hold_confirmations: AtomicBool::new(false),
            confirmations: Semaphore::new(0),
            history_gate: Mutex::new(None),
            history_release: Semaphore::new(0),
            history_entered: Notify::new(),
            memberships_gate: AtomicBool::new(false),
            memberships_release: Semaphore::new(0),
            memberships_entered: Notify::new(),
        }
    }

    /// Inserts still persist and push, but their result is withheld until
    /// [`release_confirmation`](Self::release_confirmation).
    pub fn hold_confirmations(&self) {
        self.hold_confirmations.store(true, Ordering::SeqCst);
    }

    pub fn release_confirmation(&self) {
        self.confirmations.add_permits(1);
    }

    /// Park the next history read of `conversation`.
    pub fn gate_history(&self, conversation: ConversationId) {
        *self.history_gate.lock().unwrap() = Some(conversation);
    }

    pub fn release_history(&self) {
        self.history_release.add_permits(1);
    }

    /// Park the next membership read after it has read the store.
    pub fn gate_memberships(&self) {
        self.memberships_gate.store(true, Ordering::SeqCst);
    }

    pub fn release_memberships(&self) {
        self.memberships_release.add_permits(1);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(scripted_failure());
        }
        Ok(())
    }

    /// Store a profile and return the matching signed-in user.
    pub async fn seed_user(&self, name: &str, role: Role) -> CurrentUser {
        let profile = Profile {
            id: UserId::new(),
            full_name: Some(name.to_string()),
            avatar_url: None,
            role,
        };
        self.inner.upsert_profile(&profile).await.unwrap();
        CurrentUser::from(profile)
    }

    pub async fn seed_conversation(&self, new: NewConversation) -> Conversation {
        self.inner.create_conversation(new).await.unwrap()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn list_memberships(&self, user: &UserId) -> Result<Vec<ConversationId>> {
        self.check_reads()?;
        let ids = self.inner.list_memberships(user).await?;
        if self.memberships_gate.swap(false, Ordering::SeqCst) {
            self.memberships_entered.notify_one();
            self.memberships_release.acquire().await.unwrap().forget();
        }
        Ok(ids)
    }

    async fn list_conversations_by_kind(
        &self,
        kind: ConversationKind,
    ) -> Result<Vec<Conversation>> {
        self.check_reads()?;
        self.inner.list_conversations_by_kind(kind).await
    }

    async fn get_conversations_by_ids(&self, ids: &[ConversationId]) -> Result<Vec<Conversation>> {
        self.check_reads()?;
        self.inner.get_conversations_by_ids(ids).await
    }

    async fn get_profile(&self, user: &UserId) -> Result<Profile> {
        if self.fail_profiles.load(Ordering::SeqCst) {
            return Err(scripted_failure());
        }
        self.inner.get_profile(user).await
    }

    async fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        let gated = {
            let mut gate = self.history_gate.lock().unwrap();
            if gate.as_ref() == Some(conversation) {
                gate.take();
                true
            } else {
                false
            }
        };
        if gated {
            self.history_entered.notify_one();
            self.history_release.acquire().await.unwrap().forget();
        }
        self.check_reads()?;
        self.inner.list_messages(conversation).await
    }

    async fn insert_message(
        &self,
        conversation: &ConversationId,
        author: &UserId,
        body: &str,
    ) -> Result<Message> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(scripted_failure());
        }
        let message = self.inner.insert_message(conversation, author, body).await?;
        if self.hold_confirmations.load(Ordering::SeqCst) {
            self.confirmations.acquire().await.unwrap().forget();
        }
        Ok(message)
    }

    async fn subscribe(&self, conversation: &ConversationId) -> Result<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(scripted_failure());
        }
        self.inner.subscribe(conversation).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.inner.unsubscribe(id).await
    }

    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation> {
        self.inner.create_conversation(new).await
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.inner.upsert_profile(profile).await
    }
}

pub(crate) fn client_with(config: ClientConfig) -> (Arc<ScriptedBackend>, ChatClient) {
    let backend = Arc::new(ScriptedBackend::new());
    let client = ChatClient::new(backend.clone(), config);
    (backend, client)
}

pub(crate) fn client() -> (Arc<ScriptedBackend>, ChatClient) {
    client_with(ClientConfig::default())
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub(crate) async fn wait_until<F>(what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
