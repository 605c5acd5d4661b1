use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access-control core: session state and the route guard.
pub mod guard;
pub mod session;
pub mod storage;

// HTTP service.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod shell;

// Routing segregated by access tier (Public, Authenticated, Admin, Pages).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, pages, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use guard::{Navigator, RouteGuard, ShellView, decide};
pub use repository::{PostgresRepository, RepositoryState};
pub use session::{SessionError, SessionResolver, SessionStore, Subscription};

/// ApiDoc
///
/// OpenAPI document for the JSON API, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::get_session, handlers::logout,
        handlers::get_me, handlers::get_my_credential, handlers::submit_credential,
        handlers::get_pending_credentials, handlers::set_credential_verification
    ),
    components(
        schemas(
            models::Role, models::User, models::Session, models::CredentialStatus,
            models::PharmacistCredential, models::RegisterUserRequest, models::LoginRequest,
            models::LoginResponse, models::CredentialSubmission, models::VerificationDecision,
            models::UserProfile,
        )
    ),
    tags(
        (name = "pharmalink", description = "PharmaLink pharmacy staffing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable container for the services every request may need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer.
    pub repo: RepositoryState,
    /// Configuration loaded at startup.
    pub config: AppConfig,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects requests without a resolvable identity. Extracting `AuthUser` does the work: the
/// extractor answers 401 before `next` runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles every route tier, applies scoped and global middleware and registers the state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Dashboards redirect instead of answering 401/403.
        .merge(pages::page_routes(state.clone()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying the request id, so every log line of a request correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
