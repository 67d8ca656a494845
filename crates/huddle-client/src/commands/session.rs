use tracing::info;

use huddle_shared::{CurrentUser, Role, UserId};
use huddle_store::StoreError;

use crate::client::ChatClient;
use crate::error::{ClientError, Result};
use crate::events::ChatEvent;

impl ChatClient {
    /// Install the signed-in user. Switching to a different user drops every
    /// cached directory entry, message and pending send of the previous one.
    pub async fn sign_in(&self, user: CurrentUser) -> Result<()> {
        let released = {
            let mut st = self.state()?;
            let same_user = st.session.as_ref().map(|u| u.id) == Some(user.id);
            let released = if same_user {
                None
            } else {
                let sub = st.take_subscription();
                st.reset();
                sub
            };
            st.session = Some(user.clone());
            released
        };
        self.release(released).await;

        info!(user = %user.id, role = user.role.as_str(), "Signed in");
        Ok(())
    }

    /// Sign in by user id, reading name, avatar and role from the profile.
    /// A missing profile falls back to a short id and the default role.
    pub async fn sign_in_as(&self, user_id: UserId) -> Result<CurrentUser> {
        let user = match self.backend().get_profile(&user_id).await {
            Ok(profile) => CurrentUser::from(profile),
            Err(StoreError::NotFound) => CurrentUser {
                id: user_id,
                name: user_id.short(),
                avatar_url: None,
                role: Role::User,
            },
            Err(e) => return Err(e.into()),
        };
        self.sign_in(user.clone()).await?;
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<()> {
        let (released, previous) = {
            let mut st = self.state()?;
            let sub = st.take_subscription();
            st.reset();
            (sub, st.session.take())
        };
        self.release(released).await;

        self.emit(ChatEvent::SubscriptionChanged {
            conversation_id: None,
        });
        self.emit(ChatEvent::DirectoryChanged { count: 0 });
        if let Some(user) = previous {
            info!(user = %user.id, "Signed out");
        }
        Ok(())
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.state().ok().and_then(|st| st.session.clone())
    }

    pub(crate) fn require_user(&self) -> Result<CurrentUser> {
        self.state()?.session.clone().ok_or(ClientError::Unauthenticated)
    }
}
