use crate::{
    AppState, auth,
    guard::{self, ROLE_DASHBOARDS},
    handlers,
    models::GuardDecision,
    shell,
};
use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};

/// Pages Router Module
///
/// One dashboard per role, all behind `page_guard`. Paths come from the guard's role table so
/// every redirect target the guard can produce is a page mounted here.
pub fn page_routes(state: AppState) -> Router<AppState> {
    ROLE_DASHBOARDS
        .iter()
        .fold(Router::new(), |router, (_, path)| {
            router.route(path, get(handlers::dashboard_page))
        })
        .route_layer(middleware::from_fn_with_state(state, page_guard))
}

/// page_guard
///
/// Resolves the request's session, asks the route guard about the requested path and either
/// forwards the request (with the session in its extensions) or redirects with 303.
pub async fn page_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session = auth::resolve_session(request.headers(), &state).await;
    let required = guard::required_role_for(request.uri().path());

    match guard::decide(&session, required) {
        GuardDecision::Render => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        GuardDecision::Redirect { target } => {
            tracing::debug!(path = %request.uri().path(), %target, "page guard redirect");
            Redirect::to(&target).into_response()
        }
        // Request sessions are resolved before deciding, so this does not occur.
        GuardDecision::Wait => Html(shell::loading_page()).into_response(),
    }
}
