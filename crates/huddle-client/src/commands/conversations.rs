use tracing::{debug, info, warn};

use huddle_shared::{Conversation, ConversationId, NewConversation, UserId};

use crate::client::ChatClient;
use crate::directory;
use crate::error::{ClientError, Result};
use crate::events::ChatEvent;

impl ChatClient {
    /// Load the conversations visible to the signed-in user.
    ///
    /// On failure the previously loaded directory is kept. A load overtaken
    /// by a newer one, or by a change of user, returns
    /// [`ClientError::StaleResult`] without touching the directory.
    pub async fn load_directory(&self) -> Result<Vec<Conversation>> {
        let (user, ticket) = {
            let mut st = self.state()?;
            let user = st.session.clone().ok_or(ClientError::Unauthenticated)?;
            st.directory_generation += 1;
            (user, st.directory_generation)
        };

        let load = match directory::fetch(self.backend(), &user.id).await {
            Ok(load) => load,
            Err(e) => {
                warn!(user = %user.id, error = %e, "Directory load failed");
                return Err(e);
            }
        };

        let count = load.conversations.len();
        {
            let mut st = self.state()?;
            if st.session.as_ref().map(|u| u.id) != Some(user.id)
                || st.directory_generation != ticket
            {
                debug!(user = %user.id, "Directory load overtaken, result discarded");
                return Err(ClientError::StaleResult);
            }
            for profile in load.profiles {
                st.profiles.insert(profile.id, profile);
            }
            st.directory.replace(load.conversations.clone());
        }

        info!(user = %user.id, count, "Directory loaded");
        self.emit(ChatEvent::DirectoryChanged { count });
        Ok(load.conversations)
    }

    /// The last successfully loaded directory, in fetch order.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.state()
            .map(|st| st.directory.list().to_vec())
            .unwrap_or_default()
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.state().ok().and_then(|st| st.directory.get(id).cloned())
    }

    /// Filter the loaded directory by display name.
    pub fn search_conversations(&self, query: &str) -> Vec<Conversation> {
        self.state()
            .map(|st| st.directory.search(query))
            .unwrap_or_default()
    }

    /// Start a one-to-one conversation with `other`.
    pub async fn start_private_chat(&self, other: UserId) -> Result<Conversation> {
        let user = self.require_user()?;
        let new = NewConversation::private(user.id, other)?;

        let mut conversation = self.backend().create_conversation(new).await?;
        if let Some(profile) = self.fetch_profile(&other).await {
            directory::apply_counterpart_name(&mut conversation, &profile);
        }

        self.register_conversation(conversation.clone())?;
        Ok(conversation)
    }

    /// Create a group conversation. The signed-in user is always a member.
    pub async fn create_group<I>(&self, name: &str, members: I) -> Result<Conversation>
    where
        I: IntoIterator<Item = UserId>,
    {
        let user = self.require_user()?;
        let new = NewConversation::group(name, members.into_iter().chain([user.id]));

        let conversation = self.backend().create_conversation(new).await?;
        self.register_conversation(conversation.clone())?;
        Ok(conversation)
    }

    /// Create a broadcast conversation, visible to every user.
    pub async fn create_broadcast(&self, name: &str) -> Result<Conversation> {
        let user = self.require_user()?;
        let new = NewConversation::broadcast(name, user.id);

        let conversation = self.backend().create_conversation(new).await?;
        self.register_conversation(conversation.clone())?;
        Ok(conversation)
    }

    fn register_conversation(&self, conversation: Conversation) -> Result<()> {
        let count = {
            let mut st = self.state()?;
            st.directory.add(conversation.clone());
            st.directory.list().len()
        };
        info!(
            conversation = %conversation.id,
            kind = %conversation.kind,
            "Conversation registered"
        );
        self.emit(ChatEvent::DirectoryChanged { count });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use huddle_shared::{ConversationKind, Role};

    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_broadcast_visible_without_memberships() {
        let (backend, client) = testing::client();
        let admin = backend.seed_user("Admin", Role::Admin).await;
        let reader = backend.seed_user("Reader", Role::User).await;
        let bc1 = backend
            .seed_conversation(NewConversation::broadcast("Announcements", admin.id))
            .await;

        client.sign_in(reader).await.unwrap();
        let list = client.load_directory().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, bc1.id);
        assert_eq!(list[0].kind, ConversationKind::Broadcast);
    }

    #[tokio::test]
    async fn test_directory_has_no_duplicates() {
        let (backend, client) = testing::client();
        let admin = backend.seed_user("Admin", Role::Admin).await;
        let group = backend
            .seed_conversation(NewConversation::group("team", [admin.id]))
            .await;
        // The owner is a member of the broadcast as well.
        let bc = backend
            .seed_conversation(NewConversation::broadcast("news", admin.id))
            .await;

        client.sign_in(admin).await.unwrap();
        let ids: Vec<_> = client
            .load_directory()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&group.id));
        assert!(ids.contains(&bc.id));
    }

    #[tokio::test]
    async fn test_private_chat_named_after_counterpart() {
        let (backend, client) = testing::client();
        let me = backend.seed_user("Me", Role::User).await;
        let grace = backend.seed_user("Grace Hopper", Role::User).await;
        backend
            .seed_conversation(NewConversation::private(me.id, grace.id).unwrap())
            .await;

        client.sign_in(me).await.unwrap();
        let list = client.load_directory().await.unwrap();
        assert_eq!(list[0].name, "Grace Hopper");
    }

    #[tokio::test]
    async fn test_private_chat_keeps_stored_name_when_profile_fails() {
        let (backend, client) = testing::client();
        let me = backend.seed_user("Me", Role::User).await;
        let other = backend.seed_user("Other", Role::User).await;
        backend
            .seed_conversation(NewConversation::private(me.id, other.id).unwrap())
            .await;

        client.sign_in(me).await.unwrap();
        backend.fail_profiles.store(true, Ordering::SeqCst);
        let list = client.load_directory().await.unwrap();
        assert_eq!(list[0].name, "");
        assert_eq!(list[0].display_name(), "Untitled Chat");
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_directory() {
        let (backend, client) = testing::client();
        let me = backend.seed_user("Me", Role::User).await;
        backend
            .seed_conversation(NewConversation::group("team", [me.id]))
            .await;

        client.sign_in(me).await.unwrap();
        client.load_directory().await.unwrap();

        backend.fail_reads.store(true, Ordering::SeqCst);
        let err = client.load_directory().await.unwrap_err();
        assert!(matches!(err, ClientError::StoreUnavailable(_)));
        assert_eq!(client.conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_overtaken_load_is_discarded() {
        let (backend, client) = testing::client();
        let me = backend.seed_user("Me", Role::User).await;
        backend
            .seed_conversation(NewConversation::group("first", [me.id]))
            .await;
        client.sign_in(me.clone()).await.unwrap();

        backend.gate_memberships();
        let slow_client = client.clone();
        let slow = tokio::spawn(async move { slow_client.load_directory().await });
        backend.memberships_entered.notified().await;

        backend
            .seed_conversation(NewConversation::group("second", [me.id]))
            .await;
        assert_eq!(client.load_directory().await.unwrap().len(), 2);

        backend.release_memberships();
        let err = slow.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::StaleResult));
        assert_eq!(client.conversations().len(), 2);
    }

    #[tokio::test]
    async fn test_load_requires_sign_in() {
        let (_backend, client) = testing::client();
        let err = client.load_directory().await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_created_conversations_join_directory() {
        let (backend, client) = testing::client();
        let me = backend.seed_user("Me", Role::Admin).await;
        let linus = backend.seed_user("Linus", Role::User).await;

        client.sign_in(me.clone()).await.unwrap();
        client.load_directory().await.unwrap();

        let dm = client.start_private_chat(linus.id).await.unwrap();
        assert_eq!(dm.name, "Linus");
        assert!(dm.is_member(&me.id));

        let group = client.create_group("Design Team", [linus.id]).await.unwrap();
        assert!(group.members.contains(&me.id));
        assert_eq!(group.members.len(), 2);

        client.create_broadcast("Release notes").await.unwrap();
        assert_eq!(client.conversations().len(), 3);

        let hits = client.search_conversations("design");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, group.id);
        assert_eq!(client.conversation(&dm.id).map(|c| c.kind), Some(ConversationKind::Private));
    }

    #[tokio::test]
    async fn test_private_chat_with_self_rejected() {
        let (backend, client) = testing::client();
        let me = backend.seed_user("Me", Role::User).await;
        client.sign_in(me.clone()).await.unwrap();

        let err = client.start_private_chat(me.id).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidConversation(_)));
    }
}
