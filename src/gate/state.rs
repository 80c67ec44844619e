use super::provider::{AuthChange, AuthChangeEvent};
use crate::models::sessionmodel::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Initializing,
    Anonymous,
    Authenticated(Session),
}

impl GateState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            GateState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self, GateState::Initializing)
    }

    /// The state a notification asks for, or `None` when it carries nothing
    /// to apply. A refresh never signs the visitor out.
    pub fn from_change(change: &AuthChange) -> Option<GateState> {
        match change.event {
            AuthChangeEvent::SignedIn
            | AuthChangeEvent::TokenRefreshed
            | AuthChangeEvent::UserUpdated => {
                change.session.clone().map(GateState::Authenticated)
            }
            AuthChangeEvent::SignedOut => Some(GateState::Anonymous),
        }
    }

    pub fn from_recovered(session: Option<Session>) -> GateState {
        match session {
            Some(session) => GateState::Authenticated(session),
            None => GateState::Anonymous,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn session() -> Session {
        Session {
            access_token: "t".to_string(),
            user_id: Uuid::new_v4(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn refresh_without_a_session_is_ignored() {
        let change = AuthChange::new(AuthChangeEvent::TokenRefreshed, None);
        assert_eq!(GateState::from_change(&change), None);
    }

    #[test]
    fn sign_out_ignores_any_attached_session() {
        let change = AuthChange::new(AuthChangeEvent::SignedOut, Some(session()));
        assert_eq!(GateState::from_change(&change), Some(GateState::Anonymous));
    }

    #[test]
    fn sign_in_carries_the_session() {
        let session = session();
        let change = AuthChange::new(AuthChangeEvent::SignedIn, Some(session.clone()));
        assert_eq!(
            GateState::from_change(&change),
            Some(GateState::Authenticated(session))
        );
    }
}
