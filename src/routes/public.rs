use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. `/auth/session` never fails: callers without valid
/// credentials receive an unauthenticated session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Load balancer probe.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/register
        // Provider signup mirrored into `public.profiles`.
        .route("/auth/register", post(handlers::register_user))
        // GET /auth/login serves the sign-in page, POST exchanges credentials for a token.
        .route(
            "/auth/login",
            get(handlers::login_page).post(handlers::login),
        )
        // GET /auth/session
        // Session hydration for the dashboard client.
        .route("/auth/session", get(handlers::get_session))
        // POST /auth/logout
        .route("/auth/logout", post(handlers::logout))
}
