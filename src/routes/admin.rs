use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Pharmacist credential verification. Mounted under `/admin` behind the authentication
/// layer; each handler additionally requires `Role::Admin` and answers 403 otherwise.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/credentials/pending
        // Review queue, oldest submission first.
        .route(
            "/credentials/pending",
            get(handlers::get_pending_credentials),
        )
        // PUT /admin/credentials/{id}/verification
        // Marks a submission verified or rejected and records the reviewer.
        .route(
            "/credentials/{id}/verification",
            put(handlers::set_credential_verification),
        )
}
