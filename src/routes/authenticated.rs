use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Every handler here takes an `AuthUser`; the layer applied in `create_router` rejects
/// anonymous requests with 401 before they reach a handler.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(handlers::get_me))
        // GET/PUT /me/credential
        // Pharmacists only: view or (re)submit license details for admin review.
        .route(
            "/me/credential",
            get(handlers::get_my_credential).put(handlers::submit_credential),
        )
}
