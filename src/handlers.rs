use crate::{
    AppState,
    auth::{self, AuthUser},
    guard::{self, LOGIN_PATH, ShellView},
    models::{
        CredentialStatus, CredentialSubmission, LoginRequest, LoginResponse,
        PharmacistCredential, RegisterUserRequest, Role, Session, User, UserProfile,
        VerificationDecision,
    },
    shell,
};
use axum::{
    Extension, Form, Json,
    extract::{FromRequest, Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

/// ProviderUser
///
/// The part of an auth provider user record we need: its canonical id.
#[derive(Deserialize)]
struct ProviderUser {
    id: Uuid,
}

/// ProviderTokenResponse
///
/// Response of the provider's password grant.
#[derive(Deserialize)]
struct ProviderTokenResponse {
    access_token: String,
    user: ProviderUser,
}

/// Returns the auth provider URL and key, or 503 when the provider is not configured.
fn auth_provider(state: &AppState) -> Result<(&str, &str), StatusCode> {
    match (&state.config.auth_url, &state.config.auth_key) {
        (Some(url), Some(key)) => Ok((url.as_str(), key.as_str())),
        _ => {
            tracing::warn!("auth provider is not configured");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// True when the request body is an HTML form submission.
fn is_form_post(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

/// Runs the provider's password grant and loads the matching profile.
async fn password_grant(
    state: &AppState,
    credentials: &LoginRequest,
) -> Result<(String, User), StatusCode> {
    let (auth_url, auth_key) = auth_provider(state)?;

    let response = reqwest::Client::new()
        .post(format!("{auth_url}/auth/v1/token?grant_type=password"))
        .header("apikey", auth_key)
        .json(&serde_json::json!({ "email": credentials.email, "password": credentials.password }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!("auth provider token request failed: {:?}", e);
            StatusCode::BAD_GATEWAY
        })?;

    if !response.status().is_success() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let grant = response
        .json::<ProviderTokenResponse>()
        .await
        .map_err(|e| {
            tracing::error!("unexpected token response: {:?}", e);
            StatusCode::BAD_GATEWAY
        })?;

    // A provider account without a profile row has no role and cannot use the platform.
    let user = state
        .repo
        .get_user(grant.user.id)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;
    tracing::info!(user_id = %user.id, role = %user.role, "signed in");

    Ok((grant.access_token, user))
}

// --- Authentication ---

/// register_user
///
/// [Public Route] Creates the account at the auth provider, then mirrors it into
/// `public.profiles` under the provider's id. Admin accounts cannot self-register.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Registered", body = User),
        (status = 400, description = "Rejected by the auth provider"),
        (status = 403, description = "Role cannot self-register"),
        (status = 503, description = "Auth provider not configured")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<Json<User>, StatusCode> {
    if payload.role == Role::Admin {
        return Err(StatusCode::FORBIDDEN);
    }
    let (auth_url, auth_key) = auth_provider(&state)?;

    let response = reqwest::Client::new()
        .post(format!("{auth_url}/auth/v1/signup"))
        .header("apikey", auth_key)
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| {
            tracing::error!("auth provider signup request failed: {:?}", e);
            StatusCode::BAD_GATEWAY
        })?;

    if !response.status().is_success() {
        // Duplicate email, weak password and similar provider-side rejections.
        return Err(StatusCode::BAD_REQUEST);
    }

    let provider_user = response.json::<ProviderUser>().await.map_err(|e| {
        tracing::error!("unexpected signup response: {:?}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let user = User {
        id: provider_user.id,
        email: payload.email,
        role: payload.role,
        related_id: None,
    };

    let created = state
        .repo
        .create_user(user)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    tracing::info!(user_id = %created.id, role = %created.role, "account registered");
    Ok(Json(created))
}

/// login
///
/// [Public Route] Exchanges email and password for a session token at the auth provider and
/// sets the session cookie. JSON callers get the token and session in the body; the sign-in
/// page's form post is answered with a 303 to the user's dashboard.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 303, description = "Signed in from the form, redirected to the dashboard"),
        (status = 401, description = "Bad credentials or no profile"),
        (status = 503, description = "Auth provider not configured")
    )
)]
pub async fn login(State(state): State<AppState>, request: Request) -> Result<Response, StatusCode> {
    let form_post = is_form_post(request.headers());
    let credentials = if form_post {
        let Form(credentials) = Form::<LoginRequest>::from_request(request, &state)
            .await
            .map_err(|rejection| rejection.status())?;
        credentials
    } else {
        let Json(credentials) = Json::<LoginRequest>::from_request(request, &state)
            .await
            .map_err(|rejection| rejection.status())?;
        credentials
    };

    let (token, user) = password_grant(&state, &credentials).await?;
    let jar = CookieJar::new().add(auth::session_cookie(
        token.clone(),
        state.config.cookie_secure(),
    ));

    if form_post {
        let dashboard = guard::dashboard_path(user.role);
        return Ok((jar, Redirect::to(dashboard)).into_response());
    }

    let body = LoginResponse {
        token,
        session: Session::authenticated(user),
    };
    Ok((jar, Json(body)).into_response())
}

/// get_session
///
/// [Public Route] The session the request presents. Invalid or missing credentials yield an
/// unauthenticated session rather than an error.
#[utoipa::path(
    get,
    path = "/auth/session",
    responses((status = 200, description = "Current session", body = Session))
)]
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Json<Session> {
    Json(auth::resolve_session(&headers, &state).await)
}

/// logout
///
/// [Public Route] Clears the session cookie and returns to the login page.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 303, description = "Signed out, redirected to the login page"))
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let jar = CookieJar::new().add(auth::removal_cookie(state.config.cookie_secure()));
    (jar, Redirect::to(LOGIN_PATH))
}

// --- Profile ---

/// get_me
///
/// [Authenticated Route] The caller's profile and home dashboard.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(user: AuthUser) -> Json<UserProfile> {
    Json(UserProfile {
        id: user.id,
        email: user.email,
        role: user.role,
        related_id: user.related_id,
        dashboard: guard::dashboard_path(user.role).to_string(),
        // Stable generated avatar seeded by the account id.
        avatar_url: Some(format!(
            "https://api.dicebear.com/7.x/initials/svg?seed={}",
            user.id
        )),
    })
}

/// get_my_credential
///
/// [Authenticated Route] A pharmacist's own license submission and its review status.
#[utoipa::path(
    get,
    path = "/me/credential",
    responses(
        (status = 200, description = "Credential", body = PharmacistCredential),
        (status = 403, description = "Not a pharmacist"),
        (status = 404, description = "Nothing submitted yet")
    )
)]
pub async fn get_my_credential(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PharmacistCredential>, StatusCode> {
    user.require(Role::Pharmacist)?;
    state
        .repo
        .get_credential_for_user(user.id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// submit_credential
///
/// [Authenticated Route] Submits or replaces a pharmacist's license details. Any previous
/// review is discarded and the submission goes back to pending.
#[utoipa::path(
    put,
    path = "/me/credential",
    request_body = CredentialSubmission,
    responses(
        (status = 200, description = "Submitted", body = PharmacistCredential),
        (status = 400, description = "Missing name or license number"),
        (status = 403, description = "Not a pharmacist")
    )
)]
pub async fn submit_credential(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CredentialSubmission>,
) -> Result<Json<PharmacistCredential>, StatusCode> {
    user.require(Role::Pharmacist)?;

    let submission = CredentialSubmission {
        full_name: payload.full_name.trim().to_string(),
        license_number: payload.license_number.trim().to_string(),
    };
    if submission.full_name.is_empty() || submission.license_number.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let credential = state
        .repo
        .upsert_credential(user.id, submission)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    tracing::info!(user_id = %user.id, credential_id = %credential.id, "credential submitted");
    Ok(Json(credential))
}

// --- Admin ---

/// get_pending_credentials
///
/// [Admin Route] The verification queue.
#[utoipa::path(
    get,
    path = "/admin/credentials/pending",
    responses(
        (status = 200, description = "Pending credentials", body = [PharmacistCredential]),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn get_pending_credentials(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<PharmacistCredential>>, StatusCode> {
    user.require(Role::Admin)?;
    Ok(Json(state.repo.get_pending_credentials().await))
}

/// set_credential_verification
///
/// [Admin Route] Records the review decision for a credential. Only `verified` and
/// `rejected` are accepted.
#[utoipa::path(
    put,
    path = "/admin/credentials/{id}/verification",
    params(("id" = Uuid, Path, description = "Credential ID")),
    request_body = VerificationDecision,
    responses(
        (status = 200, description = "Reviewed", body = PharmacistCredential),
        (status = 400, description = "Decision is not terminal"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn set_credential_verification(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(decision): Json<VerificationDecision>,
) -> Result<Json<PharmacistCredential>, StatusCode> {
    user.require(Role::Admin)?;
    if decision.status == CredentialStatus::Pending {
        return Err(StatusCode::BAD_REQUEST);
    }

    let credential = state
        .repo
        .set_credential_status(id, decision.status, user.id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    tracing::info!(
        credential_id = %credential.id,
        reviewer = %user.id,
        status = credential.status.as_str(),
        "credential reviewed"
    );
    Ok(Json(credential))
}

// --- Pages ---

/// login_page
///
/// Signed-in visitors are sent to their own dashboard instead of the form.
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = auth::resolve_session(&headers, &state).await;
    match session.role() {
        Some(role) => Redirect::to(guard::dashboard_path(role)).into_response(),
        None => Html(shell::login_page()).into_response(),
    }
}

/// dashboard_page
///
/// Reached only after the page guard has decided to render; the guard leaves the resolved
/// session in the request extensions.
pub async fn dashboard_page(Extension(session): Extension<Session>) -> Html<String> {
    let Some(role) = session.role() else {
        // Unreachable behind the guard; show nothing rather than a half-built page.
        return Html(shell::render(ShellView::Hidden, &session, "", ""));
    };

    let content = match role {
        Role::Pharmacy => "<p>Manage your job postings and review applications.</p>",
        Role::Pharmacist => {
            "<p>Browse open shifts and keep your <a href=\"/me/credential\">credentials</a> current.</p>"
        }
        Role::Admin => {
            "<p>Review pending <a href=\"/admin/credentials/pending\">pharmacist credentials</a>.</p>"
        }
    };

    Html(shell::render(
        ShellView::Content,
        &session,
        shell::dashboard_title(role),
        content,
    ))
}
