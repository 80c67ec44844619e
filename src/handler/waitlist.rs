use std::sync::Arc;

use axum::{
    extract::Query,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::waitlistdtos::{validation_message, LeaderboardQueryDto, Response, WaitlistRequestDto},
    error::HttpError,
    service::{ranking_service::DEFAULT_LEADERBOARD_SIZE, waitlist_service::SubmitOutcome},
    AppState,
};

pub fn waitlist_handler() -> Router {
    Router::new()
        .route("/waitlist", post(join_waitlist))
        .route("/leaderboard", get(get_leaderboard))
}

pub async fn join_waitlist(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<WaitlistRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    let outcome = app_state.attributor.submit(&body).await?;

    let response = match outcome {
        SubmitOutcome::Created { .. } => (
            StatusCode::CREATED,
            Json(Response {
                status: "success",
                message: "You're on the waitlist! Share your referral link to climb the leaderboard."
                    .to_string(),
            }),
        ),
        SubmitOutcome::ExistingChallenged => (
            StatusCode::CONFLICT,
            Json(Response {
                status: "fail",
                message: "You're already on the waitlist. We've emailed you a link to your dashboard."
                    .to_string(),
            }),
        ),
    };

    Ok(response)
}

pub async fn get_leaderboard(
    Query(query_params): Query<LeaderboardQueryDto>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    query_params
        .validate()
        .map_err(|e| HttpError::bad_request(validation_message(&e)))?;

    let limit = query_params.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE);
    let entries = app_state.ranking.top_n(limit).await?;

    Ok(Json(entries))
}
