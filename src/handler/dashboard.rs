use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Extension, Json, Router};

use crate::{error::HttpError, middleware::AuthenticatedMember, AppState};

pub fn dashboard_handler() -> Router {
    Router::new().route("/dashboard", get(get_dashboard))
}

pub async fn get_dashboard(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedMember>,
) -> Result<impl IntoResponse, HttpError> {
    let dashboard = app_state.dashboard.profile(auth.member.id).await?;
    Ok(Json(dashboard))
}
