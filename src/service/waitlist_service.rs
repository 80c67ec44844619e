use std::{sync::Arc, time::Duration};

use uuid::Uuid;
use validator::Validate;

use super::{
    error::WaitlistError,
    magic_link_service::MagicLinkService,
    referral::{generate_referral_code, is_well_formed_code},
};
use crate::{
    config::Config,
    db::{QueryTimeout, WaitlistStore},
    dtos::waitlistdtos::{validation_message, WaitlistRequestDto},
    middleware::rate_limit::SubmissionLimiter,
    models::{
        membermodel::{Member, NewMember},
        referralmodel::CreateMemberOutcome,
    },
};

/// Attempts at finding an unused referral code before giving up.
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created {
        member: Member,
        referred_by: Option<String>,
    },
    /// The email already belonged to a member; a login link was sent instead.
    ExistingChallenged,
}

pub struct ReferralAttributor {
    store: Arc<dyn WaitlistStore>,
    magic_links: Arc<MagicLinkService>,
    limiter: SubmissionLimiter,
    dashboard_url: String,
    code_generator: fn() -> String,
}

impl ReferralAttributor {
    pub fn new(
        config: &Config,
        store: Arc<dyn WaitlistStore>,
        magic_links: Arc<MagicLinkService>,
        limiter: SubmissionLimiter,
    ) -> Self {
        ReferralAttributor {
            store,
            magic_links,
            limiter,
            dashboard_url: config.dashboard_url(),
            code_generator: generate_referral_code,
        }
    }

    pub fn limiter_for(config: &Config, redis: Option<Arc<redis::aio::ConnectionManager>>) -> SubmissionLimiter {
        SubmissionLimiter::new(
            "waitlist",
            config.waitlist_rate_limit_max,
            Duration::from_secs(config.waitlist_rate_limit_window_secs),
            redis,
        )
    }

    #[cfg(test)]
    fn with_code_generator(mut self, code_generator: fn() -> String) -> Self {
        self.code_generator = code_generator;
        self
    }

    pub async fn submit(&self, request: &WaitlistRequestDto) -> Result<SubmitOutcome, WaitlistError> {
        let request = request.normalized();
        request
            .validate()
            .map_err(|e| WaitlistError::InvalidInput(validation_message(&e)))?;

        if !self.limiter.is_allowed(&request.email).await {
            tracing::warn!("Waitlist rate limit hit for {}", request.email);
            return Err(WaitlistError::rate_limited());
        }

        let existing = QueryTimeout::run(
            self.store.get_member(None, Some(&request.email), None),
            QueryTimeout::LOOKUP_TIMEOUT,
        )
        .await?;

        if let Some(member) = existing {
            return self.challenge(&member).await;
        }

        let referrer = self.resolve_referrer(request.referral_code.as_deref()).await;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let referral_code = (self.code_generator)();
            let new_member = NewMember {
                id: Uuid::new_v4(),
                email: request.email.clone(),
                full_name: request.full_name.clone(),
                brand_name: request.brand_name.clone(),
                referral_code,
            };

            let outcome = QueryTimeout::run(
                self.store.create_member(new_member, referrer.as_deref()),
                QueryTimeout::DEFAULT_TIMEOUT,
            )
            .await?;

            match outcome {
                CreateMemberOutcome::Created { member, referral } => {
                    let referred_by = referral.map(|edge| edge.referrer_code);
                    tracing::info!(
                        "Member {} joined the waitlist (referred by {:?})",
                        member.id,
                        referred_by
                    );
                    return Ok(SubmitOutcome::Created {
                        member,
                        referred_by,
                    });
                }
                CreateMemberOutcome::EmailTaken => {
                    tracing::info!("Concurrent signup for {} already created the member", request.email);
                    let member = QueryTimeout::run(
                        self.store.get_member(None, Some(&request.email), None),
                        QueryTimeout::LOOKUP_TIMEOUT,
                    )
                    .await?
                    .ok_or_else(|| {
                        tracing::error!("Email {} reported taken but no member found", request.email);
                        WaitlistError::Unknown("Failed to complete signup".to_string())
                    })?;
                    return self.challenge(&member).await;
                }
                CreateMemberOutcome::CodeTaken => {
                    tracing::debug!("Referral code collision on attempt {}", attempt);
                }
            }
        }

        tracing::error!("Could not allocate a referral code after {} attempts", MAX_CODE_ATTEMPTS);
        Err(WaitlistError::Unknown("Failed to complete signup".to_string()))
    }

    async fn challenge(&self, member: &Member) -> Result<SubmitOutcome, WaitlistError> {
        self.magic_links.issue(member, &self.dashboard_url).await?;
        tracing::info!("Existing member {} challenged instead of re-registered", member.id);
        Ok(SubmitOutcome::ExistingChallenged)
    }

    /// Best effort: any problem with the hint means no referrer.
    async fn resolve_referrer(&self, hint: Option<&str>) -> Option<String> {
        let code = hint?;
        if !is_well_formed_code(code) {
            tracing::debug!("Ignoring malformed referral code {:?}", code);
            return None;
        }

        match QueryTimeout::run(
            self.store.get_member(None, None, Some(code)),
            QueryTimeout::LOOKUP_TIMEOUT,
        )
        .await
        {
            Ok(Some(referrer)) => Some(referrer.referral_code),
            Ok(None) => {
                tracing::debug!("Referral code {} does not resolve", code);
                None
            }
            Err(e) => {
                tracing::warn!("Could not resolve referral code {}: {}", code, e);
                None
            }
        }
    }
}
