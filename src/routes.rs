use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{auth::auth_handler, dashboard::dashboard_handler, waitlist::waitlist_handler},
    middleware::{auth, require_api_key},
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .merge(waitlist_handler().layer(middleware::from_fn(require_api_key)))
        .merge(dashboard_handler().layer(middleware::from_fn(auth)))
        .nest("/auth", auth_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .merge(api_routes)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        test_support::{test_state, test_state_with, TEST_API_KEY},
    };

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn join_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/waitlist")
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", TEST_API_KEY)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn leaderboard_request(query: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/leaderboard{}", query))
            .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (state, _, _) = test_state();
        let app = create_router(state);

        let response = send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn waitlist_requires_the_service_key() {
        let (state, _, _) = test_state();
        let app = create_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/waitlist")
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", "wrong")
            .body(Body::from(r#"{"full_name":"Ada","email":"ada@x.com"}"#))
            .unwrap();

        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["status"], "fail");
    }

    #[tokio::test]
    async fn ada_joins_then_is_challenged_on_resubmit() {
        let (state, store, mailer) = test_state();
        let app = create_router(state);

        let first = send(&app, join_request(json!({"full_name": "Ada", "email": "ada@x.com"}))).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let board = json_body(send(&app, leaderboard_request("")).await).await;
        assert_eq!(board[0]["full_name"], "Ada");
        assert_eq!(board[0]["referral_count"], 0);
        assert_eq!(board[0]["rank"], 1);

        let second = send(&app, join_request(json!({"full_name": "Ada", "email": "ADA@x.com"}))).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let message = json_body(second).await["message"].as_str().unwrap().to_string();
        assert!(message.contains("already"));

        assert_eq!(crate::db::MemberExt::get_member_count(store.as_ref()).await.unwrap(), 1);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn invalid_signups_are_bad_requests() {
        let (state, _, _) = test_state();
        let app = create_router(state);

        let response = send(&app, join_request(json!({"full_name": "", "email": "nope"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rapid_resubmits_are_throttled() {
        let mut config = Config::for_tests();
        config.waitlist_rate_limit_max = 1;
        let (state, _, _) = test_state_with(config);
        let app = create_router(state);

        let first = send(&app, join_request(json!({"full_name": "Ada", "email": "ada@x.com"}))).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = send(&app, join_request(json!({"full_name": "Ada", "email": "ada@x.com"}))).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn leaderboard_limit_is_bounded() {
        let (state, _, _) = test_state();
        let app = create_router(state);

        let response = send(&app, leaderboard_request("?limit=1000")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, leaderboard_request("?limit=5")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn dashboard_needs_a_session() {
        let (state, _, _) = test_state();
        let app = create_router(state);

        let response = send(&app, Request::builder().uri("/dashboard").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_link_signs_in_and_shows_the_dashboard() {
        let (state, _, mailer) = test_state();
        let app = create_router(state);

        send(&app, join_request(json!({"full_name": "Ada", "email": "ada@x.com"}))).await;
        let ada_code = {
            let board = json_body(send(&app, leaderboard_request("")).await).await;
            board[0]["referral_code"].as_str().unwrap().to_string()
        };
        let referred = send(
            &app,
            join_request(json!({"full_name": "Bob", "email": "bob@x.com", "ref": ada_code})),
        )
        .await;
        assert_eq!(referred.status(), StatusCode::CREATED);

        // Resubmitting Ada mails Ada a login link.
        send(&app, join_request(json!({"full_name": "Ada", "email": "ada@x.com"}))).await;
        let token = mailer.last_login_token().unwrap();

        let verify = send(
            &app,
            Request::builder()
                .uri(format!("/auth/verify?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(verify.status(), StatusCode::SEE_OTHER);
        assert!(verify.headers().get(header::SET_COOKIE).is_some());
        let location = verify.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert!(location.starts_with("https://qrew.test/dashboard#access_token="));

        let fragment = location.split_once('#').unwrap().1;
        let session = crate::models::sessionmodel::Session::from_redirect_fragment(fragment).unwrap();

        let dashboard = send(
            &app,
            Request::builder()
                .uri("/dashboard")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(dashboard.status(), StatusCode::OK);
        let body = json_body(dashboard).await;
        assert_eq!(body["profile"]["name"], "Ada");
        assert_eq!(body["profile"]["referrals"], 1);
        assert_eq!(body["recentReferrals"][0]["name"], "Bob");

        let logout = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(logout.status(), StatusCode::OK);

        let after = send(
            &app,
            Request::builder()
                .uri("/dashboard")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn used_login_links_are_refused() {
        let (state, _, mailer) = test_state();
        let app = create_router(state);

        send(&app, join_request(json!({"full_name": "Ada", "email": "ada@x.com"}))).await;
        send(&app, join_request(json!({"full_name": "Ada", "email": "ada@x.com"}))).await;
        let token = mailer.last_login_token().unwrap();

        let exchange = |token: String| {
            Request::builder()
                .method("POST")
                .uri("/auth/verify")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "token": token }).to_string()))
                .unwrap()
        };

        let first = send(&app, exchange(token.clone())).await;
        assert_eq!(first.status(), StatusCode::OK);
        let body = json_body(first).await;
        assert_eq!(body["token_type"], "bearer");

        let second = send(&app, exchange(token)).await;
        assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    }
}
