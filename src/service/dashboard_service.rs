use std::sync::Arc;

use uuid::Uuid;

use super::{error::WaitlistError, referral::generate_share_link};
use crate::{
    config::Config,
    db::{QueryTimeout, WaitlistStore},
    dtos::waitlistdtos::{DashboardResponseDto, ProfileDto, RecentReferralDto},
    error::ErrorMessage,
};

/// Builds the signed-in member's dashboard: their profile, live referral
/// count, share link and the latest people who joined through them.
pub struct DashboardAggregator {
    store: Arc<dyn WaitlistStore>,
    app_url: String,
    recent_limit: i64,
}

impl DashboardAggregator {
    pub fn new(config: &Config, store: Arc<dyn WaitlistStore>) -> Self {
        DashboardAggregator {
            store,
            app_url: config.app_url.clone(),
            recent_limit: config.recent_referrals_limit,
        }
    }

    /// `member_id` must come from a verified session.
    pub async fn profile(&self, member_id: Uuid) -> Result<DashboardResponseDto, WaitlistError> {
        let member = QueryTimeout::run(
            self.store.get_member(Some(member_id), None, None),
            QueryTimeout::LOOKUP_TIMEOUT,
        )
        .await?
        .ok_or_else(|| {
            tracing::warn!("Session for missing member {}", member_id);
            WaitlistError::Unauthorized(ErrorMessage::MemberNoLongerExists.to_string())
        })?;

        let referrals = QueryTimeout::run(
            self.store.get_referral_count(&member.referral_code),
            QueryTimeout::DEFAULT_TIMEOUT,
        )
        .await?;

        let recent = QueryTimeout::run(
            self.store
                .get_recent_referrals(&member.referral_code, self.recent_limit),
            QueryTimeout::DEFAULT_TIMEOUT,
        )
        .await?;

        let share_link = generate_share_link(&self.app_url, &member.referral_code);

        Ok(DashboardResponseDto {
            profile: ProfileDto::from_member(&member, referrals, share_link),
            recent_referrals: recent.into_iter().map(RecentReferralDto::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemberExt, MemoryStore},
        models::{
            membermodel::{Member, NewMember},
            referralmodel::CreateMemberOutcome,
        },
    };

    async fn create(store: &MemoryStore, name: &str, code: &str, referrer: Option<&str>) -> Member {
        let outcome = store
            .create_member(
                NewMember {
                    id: Uuid::new_v4(),
                    email: format!("{}@x.com", name.to_lowercase()),
                    full_name: name.to_string(),
                    brand_name: Some(format!("{} Co", name)),
                    referral_code: code.to_string(),
                },
                referrer,
            )
            .await
            .unwrap();
        match outcome {
            CreateMemberOutcome::Created { member, .. } => member,
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dashboard_lists_referees_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let ada = create(&store, "Ada", "ADA00001", None).await;
        create(&store, "Bob", "BOB00001", Some("ADA00001")).await;
        create(&store, "Cy", "CY000001", Some("ADA00001")).await;
        create(&store, "Dee", "DEE00001", Some("BOB00001")).await;

        let aggregator = DashboardAggregator::new(&Config::for_tests(), store);
        let dashboard = aggregator.profile(ada.id).await.unwrap();

        assert_eq!(dashboard.profile.name, "Ada");
        assert_eq!(dashboard.profile.brand.as_deref(), Some("Ada Co"));
        assert_eq!(dashboard.profile.referrals, 2);
        assert_eq!(dashboard.profile.share_link, "https://qrew.test/?ref=ADA00001");

        let names: Vec<&str> = dashboard
            .recent_referrals
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Cy", "Bob"]);
        assert_eq!(dashboard.recent_referrals[1].email, "bob@x.com");
    }

    #[tokio::test]
    async fn recent_referrals_are_capped() {
        let store = Arc::new(MemoryStore::new());
        let ada = create(&store, "Ada", "ADA00001", None).await;
        for i in 0..3 {
            create(&store, &format!("Ref{}", i), &format!("REF0000{}", i), Some("ADA00001")).await;
        }

        let mut config = Config::for_tests();
        config.recent_referrals_limit = 2;
        let dashboard = DashboardAggregator::new(&config, store)
            .profile(ada.id)
            .await
            .unwrap();

        assert_eq!(dashboard.profile.referrals, 3);
        assert_eq!(dashboard.recent_referrals.len(), 2);
        assert_eq!(dashboard.recent_referrals[0].name, "Ref2");
    }

    #[tokio::test]
    async fn missing_member_is_unauthorized() {
        let aggregator = DashboardAggregator::new(&Config::for_tests(), Arc::new(MemoryStore::new()));
        let result = aggregator.profile(Uuid::new_v4()).await;
        assert!(matches!(result, Err(WaitlistError::Unauthorized(_))));
    }
}
