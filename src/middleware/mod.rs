pub mod rate_limit;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    db::{MemberExt, QueryTimeout},
    error::{ErrorMessage, HttpError},
    models::membermodel::Member,
    service::error::WaitlistError,
    utils::token::TokenClaims,
    AppState,
};

pub use rate_limit::{RateLimiter, SubmissionLimiter};

pub const SESSION_COOKIE: &str = "token";
pub const API_KEY_HEADER: &str = "apikey";

/// Inserted by [`auth`] for handlers behind a session.
#[derive(Debug, Clone)]
pub struct AuthenticatedMember {
    pub member: Member,
    pub claims: TokenClaims,
    pub access_token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}

pub async fn auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = cookie_jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(req.headers()))
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let claims = app_state.magic_links.verify(&token).await?;
    let member_id = claims.member_id()?;

    let member = QueryTimeout::run(
        app_state.db_client.get_member(Some(member_id), None, None),
        QueryTimeout::LOOKUP_TIMEOUT,
    )
    .await
    .map_err(WaitlistError::from)?
    .ok_or_else(|| HttpError::unauthorized(ErrorMessage::MemberNoLongerExists.to_string()))?;

    req.extensions_mut().insert(AuthenticatedMember {
        member,
        claims,
        access_token: token,
    });

    Ok(next.run(req).await)
}

/// Guard for the endpoints the public site calls with its service key,
/// sent either as an `apikey` header or as a bearer token.
pub async fn require_api_key(
    Extension(app_state): Extension<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| bearer_token(req.headers()))
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::ApiKeyMissing.to_string()))?;

    if provided != app_state.env.service_api_key {
        tracing::warn!("Rejected request with an invalid API key");
        return Err(HttpError::unauthorized(ErrorMessage::ApiKeyInvalid.to_string()));
    }

    Ok(next.run(req).await)
}
