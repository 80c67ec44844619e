use async_trait::async_trait;
use uuid::Uuid;

use super::{db::DBClient, StoreError};
use crate::models::{
    membermodel::{Member, NewMember},
    referralmodel::{CreateMemberOutcome, ReferralEdge},
};

const MEMBER_COLUMNS: &str = "id, email, full_name, brand_name, referral_code, created_at";

#[async_trait]
pub trait MemberExt {
    /// Look a member up by exactly one of id, normalized email or referral code.
    async fn get_member(
        &self,
        member_id: Option<Uuid>,
        email: Option<&str>,
        referral_code: Option<&str>,
    ) -> Result<Option<Member>, StoreError>;

    /// Insert a member and, when `referrer_code` names another existing
    /// member, the edge attributing the signup to them. Both rows are written
    /// atomically; uniqueness of email and referral code is decided here.
    async fn create_member(
        &self,
        new_member: NewMember,
        referrer_code: Option<&str>,
    ) -> Result<CreateMemberOutcome, StoreError>;

    async fn get_member_count(&self) -> Result<i64, StoreError>;
}

#[async_trait]
impl MemberExt for DBClient {
    async fn get_member(
        &self,
        member_id: Option<Uuid>,
        email: Option<&str>,
        referral_code: Option<&str>,
    ) -> Result<Option<Member>, StoreError> {
        let mut member: Option<Member> = None;

        if let Some(member_id) = member_id {
            member = sqlx::query_as::<_, Member>(&format!(
                "SELECT {} FROM members WHERE id = $1",
                MEMBER_COLUMNS
            ))
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(email) = email {
            member = sqlx::query_as::<_, Member>(&format!(
                "SELECT {} FROM members WHERE LOWER(email) = LOWER($1)",
                MEMBER_COLUMNS
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(referral_code) = referral_code {
            member = sqlx::query_as::<_, Member>(&format!(
                "SELECT {} FROM members WHERE referral_code = $1",
                MEMBER_COLUMNS
            ))
            .bind(referral_code)
            .fetch_optional(&self.pool)
            .await?;
        }

        Ok(member)
    }

    async fn create_member(
        &self,
        new_member: NewMember,
        referrer_code: Option<&str>,
    ) -> Result<CreateMemberOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members (id, email, full_name, brand_name, referral_code)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            MEMBER_COLUMNS
        ))
        .bind(new_member.id)
        .bind(&new_member.email)
        .bind(&new_member.full_name)
        .bind(&new_member.brand_name)
        .bind(&new_member.referral_code)
        .fetch_optional(&mut *tx)
        .await?;

        let member = match inserted {
            Some(member) => member,
            None => {
                let email_taken: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM members WHERE LOWER(email) = LOWER($1))",
                )
                .bind(&new_member.email)
                .fetch_one(&mut *tx)
                .await?;
                tx.rollback().await?;

                return Ok(if email_taken {
                    CreateMemberOutcome::EmailTaken
                } else {
                    CreateMemberOutcome::CodeTaken
                });
            }
        };

        let mut referral = None;
        if let Some(referrer_code) = referrer_code {
            referral = sqlx::query_as::<_, ReferralEdge>(
                r#"
                INSERT INTO referrals (id, referrer_code, referred_member_id)
                SELECT $1, m.referral_code, $3
                FROM members m
                WHERE m.referral_code = $2 AND m.id <> $3
                ON CONFLICT (referred_member_id) DO NOTHING
                RETURNING id, referrer_code, referred_member_id, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(referrer_code)
            .bind(member.id)
            .fetch_optional(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(CreateMemberOutcome::Created { member, referral })
    }

    async fn get_member_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
