use async_trait::async_trait;
use uuid::Uuid;

use super::{db::DBClient, StoreError};
use crate::models::referralmodel::{MemberTally, ReferralEdge, ReferredMember};

#[async_trait]
pub trait ReferralExt {
    /// Live count of edges pointing at `referral_code`.
    async fn get_referral_count(&self, referral_code: &str) -> Result<i64, StoreError>;

    async fn get_referral_by_referee(
        &self,
        referee_id: Uuid,
    ) -> Result<Option<ReferralEdge>, StoreError>;

    /// The newest `limit` referees of `referral_code`, newest first.
    async fn get_recent_referrals(
        &self,
        referral_code: &str,
        limit: i64,
    ) -> Result<Vec<ReferredMember>, StoreError>;

    /// Members with their referral counts, ordered by count descending,
    /// then join time, then id.
    async fn get_referral_tallies(&self, limit: i64) -> Result<Vec<MemberTally>, StoreError>;
}

#[async_trait]
impl ReferralExt for DBClient {
    async fn get_referral_count(&self, referral_code: &str) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referrer_code = $1")
                .bind(referral_code)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn get_referral_by_referee(
        &self,
        referee_id: Uuid,
    ) -> Result<Option<ReferralEdge>, StoreError> {
        let edge = sqlx::query_as::<_, ReferralEdge>(
            r#"
            SELECT id, referrer_code, referred_member_id, created_at
            FROM referrals
            WHERE referred_member_id = $1
            "#,
        )
        .bind(referee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(edge)
    }

    async fn get_recent_referrals(
        &self,
        referral_code: &str,
        limit: i64,
    ) -> Result<Vec<ReferredMember>, StoreError> {
        let referees = sqlx::query_as::<_, ReferredMember>(
            r#"
            SELECT m.full_name, m.brand_name, m.email, m.created_at AS joined_at
            FROM referrals r
            JOIN members m ON m.id = r.referred_member_id
            WHERE r.referrer_code = $1
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT $2
            "#,
        )
        .bind(referral_code)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(referees)
    }

    async fn get_referral_tallies(&self, limit: i64) -> Result<Vec<MemberTally>, StoreError> {
        let tallies = sqlx::query_as::<_, MemberTally>(
            r#"
            SELECT
                m.id AS member_id,
                m.full_name,
                m.brand_name,
                m.referral_code,
                COUNT(r.id) AS referral_count,
                m.created_at
            FROM members m
            LEFT JOIN referrals r ON r.referrer_code = m.referral_code
            GROUP BY m.id
            ORDER BY referral_count DESC, m.created_at ASC, m.id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(tallies)
    }
}
