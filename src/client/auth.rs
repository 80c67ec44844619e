use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use super::api::{decode, http_client, response_message, transport_error, classify_failure};
use crate::{
    dtos::authdtos::SessionResponseDto,
    gate::{AuthChange, AuthChangeEvent, AuthClient},
    middleware::API_KEY_HEADER,
    models::sessionmodel::Session,
    service::error::WaitlistError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CAPACITY: usize = 16;

#[derive(Serialize)]
struct MagicLinkBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_to: Option<&'a str>,
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    token: &'a str,
}

/// Client side of passwordless sign-in. Holds the current session in memory
/// and announces every change to it.
pub struct HttpAuthClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
}

impl HttpAuthClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, WaitlistError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(HttpAuthClient {
            http: http_client(REQUEST_TIMEOUT)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            session: Mutex::new(None),
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn held(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        if self.events.send(AuthChange::new(event, session)).is_err() {
            tracing::debug!("No listeners for {:?}", event);
        }
    }

    /// Changes to the held session are announced under the lock, so
    /// listeners see them in the order they happened.
    fn store(&self, event: AuthChangeEvent, session: Session) -> Session {
        let mut held = self.held();
        *held = Some(session.clone());
        self.emit(event, Some(session.clone()));
        session
    }

    pub fn session(&self) -> Option<Session> {
        self.held().clone()
    }

    /// Adopt the session handed over in a login redirect fragment.
    pub fn restore_from_fragment(&self, fragment: &str) -> Option<Session> {
        let session = Session::from_redirect_fragment(fragment)?;
        tracing::info!("Session restored from login redirect");
        Some(self.store(AuthChangeEvent::SignedIn, session))
    }

    pub async fn send_login_link(&self, email: &str, redirect_to: Option<&str>) -> Result<(), WaitlistError> {
        let response = self
            .http
            .post(self.url("/auth/magic-link"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&MagicLinkBody { email, redirect_to })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response_message(response).await;
        Err(classify_failure(status.as_u16(), message))
    }

    /// Redeem the token from an emailed link.
    pub async fn verify_link(&self, token: &str) -> Result<Session, WaitlistError> {
        let response = self
            .http
            .post(self.url("/auth/verify"))
            .json(&VerifyBody { token })
            .send()
            .await
            .map_err(transport_error)?;

        let body: SessionResponseDto = decode(response).await?;
        Ok(self.store(AuthChangeEvent::SignedIn, body.session))
    }

    pub async fn refresh(&self) -> Result<Session, WaitlistError> {
        let current = self
            .session()
            .ok_or_else(|| WaitlistError::Unauthorized("No session to refresh".to_string()))?;

        let response = self
            .http
            .post(self.url("/auth/refresh"))
            .bearer_auth(&current.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let refreshed = decode::<SessionResponseDto>(response).await?.session;

        {
            let mut held = self.held();
            let still_current = held
                .as_ref()
                .is_some_and(|session| session.access_token == current.access_token);
            if still_current {
                *held = Some(refreshed.clone());
                self.emit(AuthChangeEvent::TokenRefreshed, Some(refreshed.clone()));
                return Ok(refreshed);
            }
        }

        tracing::info!("Session changed while refreshing; discarding the refreshed token");
        if let Err(e) = self.logout(&refreshed.access_token).await {
            tracing::warn!("Could not revoke the discarded session: {}", e);
        }
        Err(WaitlistError::Unauthorized(
            "Signed out while the session was being refreshed".to_string(),
        ))
    }

    fn forget(&self) {
        let mut held = self.held();
        if held.take().is_some() {
            self.emit(AuthChangeEvent::SignedOut, None);
        }
    }

    async fn logout(&self, access_token: &str) -> Result<(), WaitlistError> {
        let response = self
            .http
            .post(self.url("/auth/logout"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 401 {
            return Ok(());
        }
        let message = response_message(response).await;
        Err(classify_failure(status.as_u16(), message))
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn get_session(&self) -> Result<Option<Session>, WaitlistError> {
        let Some(current) = self.session() else {
            return Ok(None);
        };
        if current.is_expired_at(Utc::now()) {
            tracing::info!("Held session has expired");
            self.forget();
            return Ok(None);
        }

        let response = self
            .http
            .get(self.url("/auth/session"))
            .bearer_auth(&current.access_token)
            .send()
            .await
            .map_err(transport_error)?;

        match decode::<SessionResponseDto>(response).await {
            Ok(body) => Ok(Some(body.session)),
            Err(WaitlistError::Unauthorized(_)) => {
                tracing::info!("Server no longer accepts the held session");
                self.forget();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> Result<(), WaitlistError> {
        let current = {
            let mut held = self.held();
            let current = held.take();
            self.emit(AuthChangeEvent::SignedOut, None);
            current
        };

        match current {
            Some(current) => self.logout(&current.access_token).await,
            None => Ok(()),
        }
    }
}
