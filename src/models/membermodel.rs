use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Member {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub brand_name: Option<String>,
    pub referral_code: String,
    pub created_at: DateTime<Utc>,
}

/// A member about to be written. `email` is already normalized.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub brand_name: Option<String>,
    pub referral_code: String,
}

/// Trim and case-fold an address so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
