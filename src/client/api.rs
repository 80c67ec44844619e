use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::{
    dtos::waitlistdtos::{DashboardResponseDto, MessageResponseDto, WaitlistRequestDto},
    middleware::API_KEY_HEADER,
    models::{referralmodel::LeaderboardEntry, sessionmodel::Session},
    service::error::WaitlistError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Created,
    /// Already a member; a login link went to their inbox.
    ExistingChallenged,
}

/// Typed calls to the waitlist server.
#[derive(Debug, Clone)]
pub struct WaitlistApi {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WaitlistApi {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, WaitlistError> {
        WaitlistApi::with_timeout(base_url, api_key, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, WaitlistError> {
        Ok(WaitlistApi {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn join(&self, request: &WaitlistRequestDto) -> Result<JoinOutcome, WaitlistError> {
        let response = self
            .http
            .post(self.url("/waitlist"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let message = response_message(response).await;
        classify_join(status, &message)
    }

    pub async fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>, WaitlistError> {
        let mut request = self
            .http
            .get(self.url("/leaderboard"))
            .header(API_KEY_HEADER, &self.api_key);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        decode(response).await
    }

    pub async fn dashboard(&self, session: &Session) -> Result<DashboardResponseDto, WaitlistError> {
        let response = self
            .http
            .get(self.url("/dashboard"))
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, WaitlistError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            tracing::error!("Failed to build HTTP client: {}", e);
            WaitlistError::Unknown(e.to_string())
        })
}

pub(crate) fn transport_error(error: reqwest::Error) -> WaitlistError {
    tracing::warn!("Request to the waitlist server failed: {}", error);
    if error.is_timeout() {
        WaitlistError::Unavailable("The request timed out. Please try again.".to_string())
    } else {
        WaitlistError::Unavailable("We could not reach the server. Please try again.".to_string())
    }
}

/// The `message` of a JSON error body, or the raw body when it is not one.
pub(crate) async fn response_message(response: reqwest::Response) -> String {
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Could not read response body: {}", e);
            String::new()
        }
    };

    serde_json::from_str::<MessageResponseDto>(&text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or(text)
}

pub(crate) async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, WaitlistError> {
    let status = response.status();
    if !status.is_success() {
        let message = response_message(response).await;
        return Err(classify_failure(status.as_u16(), message));
    }

    response.json::<T>().await.map_err(|e| {
        tracing::error!("Unexpected response from the waitlist server: {}", e);
        WaitlistError::Unknown("Unexpected response from the server".to_string())
    })
}

pub fn classify_join(status: u16, message: &str) -> Result<JoinOutcome, WaitlistError> {
    if (200..300).contains(&status) {
        return Ok(JoinOutcome::Created);
    }
    if status == 409 || message.to_lowercase().contains("already") {
        return Ok(JoinOutcome::ExistingChallenged);
    }
    Err(classify_failure(status, message.to_string()))
}

pub fn classify_failure(status: u16, message: String) -> WaitlistError {
    let message = if message.trim().is_empty() {
        format!("Request failed with status {}", status)
    } else {
        message
    };

    match status {
        429 => WaitlistError::RateLimited(message),
        400 | 422 => WaitlistError::InvalidInput(message),
        401 | 403 => WaitlistError::Unauthorized(message),
        502..=504 => WaitlistError::Unavailable(message),
        _ => WaitlistError::Unknown(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_server, TEST_API_KEY};

    fn request(full_name: &str, email: &str, referral_code: Option<&str>) -> WaitlistRequestDto {
        WaitlistRequestDto {
            full_name: full_name.to_string(),
            email: email.to_string(),
            brand_name: None,
            referral_code: referral_code.map(str::to_string),
        }
    }

    #[test]
    fn join_responses_are_classified() {
        assert_eq!(classify_join(201, ""), Ok(JoinOutcome::Created));
        assert_eq!(classify_join(409, "conflict"), Ok(JoinOutcome::ExistingChallenged));
        assert_eq!(
            classify_join(400, "User already registered"),
            Ok(JoinOutcome::ExistingChallenged)
        );
        assert!(matches!(classify_join(429, "slow down"), Err(WaitlistError::RateLimited(_))));
        assert!(matches!(classify_join(422, "bad"), Err(WaitlistError::InvalidInput(_))));
        assert!(matches!(classify_join(503, "down"), Err(WaitlistError::Unavailable(_))));
        assert_eq!(
            classify_join(418, "teapot"),
            Err(WaitlistError::Unknown("teapot".to_string()))
        );
    }

    #[test]
    fn empty_messages_name_the_status() {
        assert_eq!(
            classify_failure(500, String::new()),
            WaitlistError::Unknown("Request failed with status 500".to_string())
        );
    }

    #[tokio::test]
    async fn join_and_leaderboard_against_a_live_server() {
        let server = spawn_server().await;
        let api = WaitlistApi::new(&server.base_url, TEST_API_KEY).unwrap();

        assert_eq!(
            api.join(&request("Ada", "ada@x.com", None)).await,
            Ok(JoinOutcome::Created)
        );
        let board = api.leaderboard(None).await.unwrap();
        assert_eq!(board.len(), 1);

        let code = board[0].referral_code.clone();
        assert_eq!(
            api.join(&request("Bob", "bob@x.com", Some(&code))).await,
            Ok(JoinOutcome::Created)
        );
        assert_eq!(
            api.join(&request("Ada", "ada@x.com", None)).await,
            Ok(JoinOutcome::ExistingChallenged)
        );

        let board = api.leaderboard(Some(1)).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].full_name, "Ada");
        assert_eq!(board[0].referral_count, 1);
        assert_eq!(server.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn server_side_validation_maps_to_invalid_input() {
        let server = spawn_server().await;
        let api = WaitlistApi::new(&server.base_url, TEST_API_KEY).unwrap();

        let result = api.join(&request("Ada", "not-an-email", None)).await;
        assert!(matches!(result, Err(WaitlistError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn wrong_api_key_is_unauthorized() {
        let server = spawn_server().await;
        let api = WaitlistApi::new(&server.base_url, "nope").unwrap();

        let result = api.leaderboard(None).await;
        assert!(matches!(result, Err(WaitlistError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let api = WaitlistApi::with_timeout(&base_url, TEST_API_KEY, Duration::from_secs(2)).unwrap();
        let result = api.leaderboard(None).await;
        assert!(matches!(result, Err(WaitlistError::Unavailable(_))));
    }
}
