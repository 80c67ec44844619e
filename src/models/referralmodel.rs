use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::membermodel::Member;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct ReferralEdge {
    pub id: Uuid,
    pub referrer_code: String,
    pub referred_member_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A referee as shown on the referrer's dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct ReferredMember {
    pub full_name: String,
    pub brand_name: Option<String>,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

/// One member with their live referral count, before ranks are assigned.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MemberTally {
    pub member_id: Uuid,
    pub full_name: String,
    pub brand_name: Option<String>,
    pub referral_code: String,
    pub referral_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LeaderboardEntry {
    pub full_name: String,
    pub brand_name: Option<String>,
    pub referral_code: String,
    pub referral_count: i64,
    pub rank: u32,
}

/// What the store reports back from an attempt to create a member.
#[derive(Debug, Clone)]
pub enum CreateMemberOutcome {
    Created {
        member: Member,
        referral: Option<ReferralEdge>,
    },
    /// The normalized email already belongs to a member, possibly one
    /// inserted by a concurrent request.
    EmailTaken,
    /// The generated referral code collided with an existing one.
    CodeTaken,
}
