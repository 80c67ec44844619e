use std::sync::{atomic::AtomicBool, Arc, OnceLock};

use validator::Validate;

use super::{
    api::{JoinOutcome, WaitlistApi},
    ClientError, InFlight,
};
use crate::{
    dtos::waitlistdtos::{validation_message, WaitlistRequestDto},
    service::error::WaitlistError,
};

/// The public signup form. Remembers the `ref` it was opened with and lets
/// only one submission run at a time.
pub struct WaitlistForm {
    api: Arc<WaitlistApi>,
    referral_code: OnceLock<String>,
    submitting: AtomicBool,
}

impl WaitlistForm {
    pub fn new(api: Arc<WaitlistApi>) -> Self {
        WaitlistForm {
            api,
            referral_code: OnceLock::new(),
            submitting: AtomicBool::new(false),
        }
    }

    /// Record the `ref` query parameter of the landing URL. Only the first
    /// non-blank value is kept.
    pub fn capture_referral(&self, url: &str) -> Option<&str> {
        let query = url
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or_default();
        let query = query.split('#').next().unwrap_or_default();

        let found = serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .unwrap_or_default()
            .into_iter()
            .find(|(key, value)| key == "ref" && !value.trim().is_empty())
            .map(|(_, value)| value.trim().to_string());

        if let Some(code) = found {
            if self.referral_code.set(code).is_ok() {
                tracing::debug!("Captured referral code from landing URL");
            }
        }
        self.referral_code()
    }

    pub fn referral_code(&self) -> Option<&str> {
        self.referral_code.get().map(String::as_str)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(std::sync::atomic::Ordering::Acquire)
    }

    pub async fn submit(
        &self,
        full_name: &str,
        email: &str,
        brand_name: Option<&str>,
    ) -> Result<JoinOutcome, ClientError> {
        let _in_flight = InFlight::try_acquire(&self.submitting).ok_or(ClientError::AlreadySubmitting)?;

        let request = WaitlistRequestDto {
            full_name: full_name.to_string(),
            email: email.to_string(),
            brand_name: brand_name.map(str::to_string),
            referral_code: self.referral_code.get().cloned(),
        }
        .normalized();

        request
            .validate()
            .map_err(|e| WaitlistError::InvalidInput(validation_message(&e)))?;

        let outcome = self.api.join(&request).await?;
        tracing::info!("Waitlist submission finished: {:?}", outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemberExt, ReferralExt},
        test_support::{spawn_server, TEST_API_KEY},
    };

    fn offline_form() -> WaitlistForm {
        WaitlistForm::new(Arc::new(WaitlistApi::new("http://127.0.0.1:1", TEST_API_KEY).unwrap()))
    }

    #[test]
    fn ref_is_captured_once() {
        let form = offline_form();
        assert_eq!(form.capture_referral("https://qrew.app/"), None);
        assert_eq!(
            form.capture_referral("https://qrew.app/?utm=x&ref=ABCD1234#top"),
            Some("ABCD1234")
        );
        assert_eq!(
            form.capture_referral("https://qrew.app/?ref=ZZZZ9999"),
            Some("ABCD1234")
        );
    }

    #[test]
    fn blank_ref_is_not_captured() {
        let form = offline_form();
        assert_eq!(form.capture_referral("/?ref=%20"), None);
    }

    #[tokio::test]
    async fn obviously_invalid_input_never_leaves_the_form() {
        let form = offline_form();
        let result = form.submit("Ada", "not-an-email", None).await;
        assert!(matches!(
            result,
            Err(ClientError::Request(WaitlistError::InvalidInput(_)))
        ));
        assert!(!form.is_submitting());
    }

    #[tokio::test]
    async fn a_second_submit_while_one_is_running_is_rejected() {
        let server = spawn_server().await;
        let api = Arc::new(WaitlistApi::new(&server.base_url, TEST_API_KEY).unwrap());
        let form = WaitlistForm::new(api);

        let (first, second) = tokio::join!(
            form.submit("Ada", "ada@x.com", None),
            form.submit("Ada", "ada@x.com", None)
        );

        assert_eq!(first, Ok(JoinOutcome::Created));
        assert_eq!(second, Err(ClientError::AlreadySubmitting));
        assert_eq!(server.store.get_member_count().await.unwrap(), 1);
        assert!(!form.is_submitting());
    }

    #[tokio::test]
    async fn captured_ref_is_attached_to_the_submission() {
        let server = spawn_server().await;
        let api = Arc::new(WaitlistApi::new(&server.base_url, TEST_API_KEY).unwrap());

        let ada_form = WaitlistForm::new(api.clone());
        ada_form.submit("Ada", "ada@x.com", Some("Ada Co")).await.unwrap();
        let ada = server
            .store
            .get_member(None, Some("ada@x.com"), None)
            .await
            .unwrap()
            .unwrap();

        let bob_form = WaitlistForm::new(api);
        bob_form.capture_referral(&format!("/?ref={}", ada.referral_code.to_lowercase()));
        assert_eq!(
            bob_form.submit("Bob", "bob@x.com", None).await,
            Ok(JoinOutcome::Created)
        );
        assert_eq!(server.store.get_referral_count(&ada.referral_code).await.unwrap(), 1);
    }
}
