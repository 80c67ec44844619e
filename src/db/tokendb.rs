use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{db::DBClient, StoreError};
use crate::models::sessionmodel::LoginToken;

#[async_trait]
pub trait LoginTokenExt {
    async fn save_login_token(&self, token: LoginToken) -> Result<(), StoreError>;

    /// Mark the token consumed and return it, provided it exists, has not
    /// been consumed and has not expired at `now`. At most one caller wins.
    async fn consume_login_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LoginToken>, StoreError>;

    /// Delete tokens that can no longer be redeemed at `now`, returning how
    /// many were removed.
    async fn purge_login_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
impl LoginTokenExt for DBClient {
    async fn save_login_token(&self, token: LoginToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO login_tokens (token_hash, member_id, redirect_to, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.member_id)
        .bind(&token.redirect_to)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_login_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LoginToken>, StoreError> {
        let token = sqlx::query_as::<_, LoginToken>(
            r#"
            UPDATE login_tokens
            SET consumed_at = $2
            WHERE token_hash = $1 AND consumed_at IS NULL AND expires_at > $2
            RETURNING token_hash, member_id, redirect_to, expires_at, consumed_at
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn purge_login_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM login_tokens WHERE consumed_at IS NOT NULL OR expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
