use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::WaitlistError;
use crate::{
    config::Config,
    db::{QueryTimeout, WaitlistStore},
    error::ErrorMessage,
    mail::{mails::send_login_link_email, Mailer},
    middleware::rate_limit::SubmissionLimiter,
    models::{membermodel::{normalize_email, Member}, sessionmodel::{LoginToken, Session}},
    utils::token::{self, TokenClaims},
};

/// Issues and redeems one-time login links and mints the session tokens
/// they are exchanged for.
pub struct MagicLinkService {
    store: Arc<dyn WaitlistStore>,
    mailer: Arc<dyn Mailer>,
    redis: Option<Arc<ConnectionManager>>,
    limiter: SubmissionLimiter,
    revoked: Mutex<HashMap<String, DateTime<Utc>>>,
    jwt_secret: String,
    jwt_maxage: i64,
    link_ttl: Duration,
    api_url: String,
    app_url: String,
    dashboard_url: String,
}

impl MagicLinkService {
    pub fn new(
        config: &Config,
        store: Arc<dyn WaitlistStore>,
        mailer: Arc<dyn Mailer>,
        redis: Option<Arc<ConnectionManager>>,
    ) -> Self {
        let limiter = SubmissionLimiter::new(
            "magic_link",
            config.waitlist_rate_limit_max,
            StdDuration::from_secs(config.waitlist_rate_limit_window_secs),
            redis.clone(),
        );

        MagicLinkService {
            store,
            mailer,
            redis,
            limiter,
            revoked: Mutex::new(HashMap::new()),
            jwt_secret: config.jwt_secret.clone(),
            jwt_maxage: config.jwt_maxage,
            link_ttl: Duration::minutes(config.login_link_ttl_minutes),
            api_url: config.api_url.clone(),
            app_url: config.app_url.clone(),
            dashboard_url: config.dashboard_url(),
        }
    }

    /// Only redirect back into our own site; anything else goes to the
    /// dashboard.
    fn safe_redirect(&self, redirect_to: Option<&str>) -> String {
        match redirect_to {
            Some(target) if target == self.app_url || target.starts_with(&format!("{}/", self.app_url)) => {
                target.to_string()
            }
            Some(target) => {
                tracing::warn!("Ignoring off-site redirect target {}", target);
                self.dashboard_url.clone()
            }
            None => self.dashboard_url.clone(),
        }
    }

    /// Email `member` a one-time link that lands on `redirect_to` signed in.
    pub async fn issue(&self, member: &Member, redirect_to: &str) -> Result<(), WaitlistError> {
        let raw_token = generate_login_token();
        let login_token = LoginToken {
            token_hash: hash_login_token(&raw_token),
            member_id: member.id,
            redirect_to: self.safe_redirect(Some(redirect_to)),
            expires_at: Utc::now() + self.link_ttl,
            consumed_at: None,
        };

        QueryTimeout::run(
            self.store.save_login_token(login_token),
            QueryTimeout::DEFAULT_TIMEOUT,
        )
        .await?;

        let login_link = format!("{}/auth/verify?token={}", self.api_url, raw_token);
        send_login_link_email(self.mailer.as_ref(), &member.email, &member.full_name, &login_link)
            .await?;

        tracing::info!("Login link issued to member {}", member.id);
        Ok(())
    }

    /// Handle an explicit "send me a login link" request. Unknown emails get
    /// the same answer as known ones.
    pub async fn request(&self, email: &str, redirect_to: Option<&str>) -> Result<(), WaitlistError> {
        let email = normalize_email(email);
        if !self.limiter.is_allowed(&email).await {
            tracing::warn!("Login link rate limit hit for {}", email);
            return Err(WaitlistError::rate_limited());
        }

        let member = QueryTimeout::run(
            self.store.get_member(None, Some(&email), None),
            QueryTimeout::LOOKUP_TIMEOUT,
        )
        .await?;

        match member {
            Some(member) => {
                let redirect = self.safe_redirect(redirect_to);
                self.issue(&member, &redirect).await
            }
            None => {
                tracing::info!("Login link requested for unknown email");
                Ok(())
            }
        }
    }

    /// Exchange a login link token for a session and its redirect target.
    pub async fn redeem(&self, raw_token: &str) -> Result<(Session, String), WaitlistError> {
        let consumed = QueryTimeout::run(
            self.store
                .consume_login_token(&hash_login_token(raw_token), Utc::now()),
            QueryTimeout::DEFAULT_TIMEOUT,
        )
        .await?;

        let login_token = consumed.ok_or_else(|| {
            WaitlistError::Unauthorized(ErrorMessage::ExpiredLoginLink.to_string())
        })?;

        let session = self.mint(login_token.member_id)?;
        tracing::info!("Member {} signed in via login link", login_token.member_id);
        Ok((session, login_token.redirect_to))
    }

    pub fn mint(&self, member_id: Uuid) -> Result<Session, WaitlistError> {
        let (access_token, expires_at) =
            token::create_token(&member_id.to_string(), self.jwt_secret.as_bytes(), self.jwt_maxage)
                .map_err(|e| {
                    tracing::error!("Failed to sign session token: {}", e);
                    WaitlistError::Unknown(ErrorMessage::ServerError.to_string())
                })?;

        Ok(Session {
            access_token,
            user_id: member_id,
            expires_at,
        })
    }

    /// Replace a still-valid session with a fresh one for the same member.
    /// The old token stays valid until it expires.
    pub fn refresh(&self, claims: &TokenClaims) -> Result<Session, WaitlistError> {
        let member_id = claims
            .member_id()
            .map_err(|e| WaitlistError::Unauthorized(e.message))?;
        self.mint(member_id)
    }

    /// Decode a bearer token and check it has not been signed out.
    pub async fn verify(&self, access_token: &str) -> Result<TokenClaims, WaitlistError> {
        let claims = token::decode_token(access_token, self.jwt_secret.as_bytes())
            .map_err(|e| WaitlistError::Unauthorized(e.message))?;

        if self.is_revoked(&claims.jti).await {
            return Err(WaitlistError::Unauthorized(
                "Token has been revoked. Please log in again.".to_string(),
            ));
        }
        Ok(claims)
    }

    pub async fn revoke(&self, claims: &TokenClaims) {
        let expires_at = claims.expires_at();
        let remaining = (expires_at - Utc::now()).num_seconds().max(1);

        if let Some(redis) = &self.redis {
            let mut conn = ConnectionManager::clone(redis);
            let result: Result<(), redis::RedisError> = redis::cmd("SET")
                .arg(format!("token_blacklist:{}", claims.jti))
                .arg(1)
                .arg("EX")
                .arg(remaining)
                .query_async(&mut conn)
                .await;
            match result {
                Ok(()) => return,
                Err(e) => tracing::warn!("Failed to revoke token in Redis: {}", e),
            }
        }

        let mut revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        revoked.retain(|_, expiry| *expiry > now);
        revoked.insert(claims.jti.clone(), expires_at);
    }

    async fn is_revoked(&self, jti: &str) -> bool {
        if let Some(redis) = &self.redis {
            let mut conn = ConnectionManager::clone(redis);
            let result: Result<bool, redis::RedisError> = redis::cmd("EXISTS")
                .arg(format!("token_blacklist:{}", jti))
                .query_async(&mut conn)
                .await;
            match result {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to check token revocation in Redis: {}", e),
            }
        }

        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }

    /// Delete login links that were used or have expired.
    pub async fn purge_dead_links(&self) -> Result<u64, WaitlistError> {
        let purged = QueryTimeout::run(
            self.store.purge_login_tokens(Utc::now()),
            QueryTimeout::DEFAULT_TIMEOUT,
        )
        .await?;
        if purged > 0 {
            tracing::info!("Purged {} dead login links", purged);
        }
        Ok(purged)
    }

    pub fn spawn_link_sweeper(service: Arc<MagicLinkService>, every: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = service.purge_dead_links().await {
                    tracing::warn!("Login link sweep failed: {}", e);
                }
            }
        })
    }
}

fn generate_login_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn hash_login_token(raw_token: &str) -> String {
    hex::encode(Sha256::digest(raw_token.as_bytes()))
}
