use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated session as handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Rebuild a session from the fragment a login redirect lands on, e.g.
    /// `access_token=...&token_type=bearer&user_id=...&expires_at=...`.
    pub fn from_redirect_fragment(fragment: &str) -> Option<Session> {
        #[derive(Deserialize)]
        struct Fragment {
            access_token: String,
            user_id: Uuid,
            expires_at: DateTime<Utc>,
        }

        let fragment = fragment.trim_start_matches('#');
        let parsed: Fragment = serde_urlencoded::from_str(fragment).ok()?;
        Some(Session {
            access_token: parsed.access_token,
            user_id: parsed.user_id,
            expires_at: parsed.expires_at,
        })
    }

    pub fn to_redirect_fragment(&self) -> String {
        format!(
            "access_token={}&token_type=bearer&user_id={}&expires_at={}",
            urlencoding::encode(&self.access_token),
            self.user_id,
            urlencoding::encode(&self.expires_at.to_rfc3339()),
        )
    }
}

/// A stored one-time login token. Only the hash of the token is kept.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LoginToken {
    pub token_hash: String,
    pub member_id: Uuid,
    pub redirect_to: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}
