use std::sync::Arc;

use axum::{
    extract::Query,
    http::{header, HeaderMap, HeaderValue},
    middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::Cookie;
use validator::Validate;

use crate::{
    dtos::{
        authdtos::{MagicLinkRequestDto, SessionResponseDto, VerifyLoginQueryDto},
        waitlistdtos::{validation_message, Response},
    },
    error::HttpError,
    middleware::{auth, require_api_key, AuthenticatedMember, SESSION_COOKIE},
    models::sessionmodel::Session,
    AppState,
};

pub fn auth_handler() -> Router {
    let service_routes = Router::new()
        .route("/magic-link", post(request_magic_link))
        .layer(middleware::from_fn(require_api_key));

    let session_routes = Router::new()
        .route("/session", get(get_session))
        .route("/refresh", post(refresh_session))
        .route("/logout", post(logout))
        .layer(middleware::from_fn(auth));

    Router::new()
        .route("/verify", get(verify_login_link).post(exchange_login_token))
        .merge(service_routes)
        .merge(session_routes)
}

fn session_cookie_headers(token: String, max_age_minutes: i64) -> Result<HeaderMap, HttpError> {
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .max_age(time::Duration::minutes(max_age_minutes))
        .http_only(true)
        .build();

    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| HttpError::server_error(e.to_string()))?,
    );
    Ok(headers)
}

fn session_response(session: Session, jwt_maxage: i64) -> Result<impl IntoResponse, HttpError> {
    let headers = session_cookie_headers(session.access_token.clone(), jwt_maxage)?;

    let mut response = Json(SessionResponseDto::bearer(session)).into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}

pub async fn request_magic_link(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<MagicLinkRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    app_state
        .magic_links
        .request(&body.email, body.redirect_to.as_deref())
        .await?;

    Ok(Json(Response {
        status: "success",
        message: "If that email is on the waitlist, a login link is on its way.".to_string(),
    }))
}

/// Landing point of the emailed link: sets the session cookie and hands the
/// session to the site in the redirect fragment.
pub async fn verify_login_link(
    Query(query_params): Query<VerifyLoginQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let (session, redirect_to) = app_state.magic_links.redeem(&query_params.token).await?;

    let headers = session_cookie_headers(session.access_token.clone(), app_state.env.jwt_maxage)?;
    let target = format!("{}#{}", redirect_to, session.to_redirect_fragment());

    let mut response = Redirect::to(&target).into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}

pub async fn exchange_login_token(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<VerifyLoginQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let (session, _) = app_state.magic_links.redeem(&body.token).await?;
    session_response(session, app_state.env.jwt_maxage)
}

pub async fn get_session(
    Extension(auth): Extension<AuthenticatedMember>,
) -> Result<impl IntoResponse, HttpError> {
    let session = Session {
        access_token: auth.access_token,
        user_id: auth.member.id,
        expires_at: auth.claims.expires_at(),
    };
    Ok(Json(SessionResponseDto::bearer(session)))
}

pub async fn refresh_session(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedMember>,
) -> Result<impl IntoResponse, HttpError> {
    let session = app_state.magic_links.refresh(&auth.claims)?;
    tracing::debug!("Session refreshed for member {}", auth.member.id);
    session_response(session, app_state.env.jwt_maxage)
}

pub async fn logout(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedMember>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.magic_links.revoke(&auth.claims).await;
    tracing::info!("Member {} signed out", auth.member.id);

    let headers = session_cookie_headers(String::new(), 0)?;

    let mut response = Json(Response {
        status: "success",
        message: "Signed out".to_string(),
    })
    .into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}
