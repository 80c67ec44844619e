use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{models::sessionmodel::Session, service::error::WaitlistError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session-changed notification from the auth client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(event: AuthChangeEvent, session: Option<Session>) -> Self {
        AuthChange { event, session }
    }
}

/// The client half of the auth provider, as seen by the session gate.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// The persisted session, if it is still valid.
    async fn get_session(&self) -> Result<Option<Session>, WaitlistError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;

    async fn sign_out(&self) -> Result<(), WaitlistError>;
}
