use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::Duration;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    models::{Role, Session, User},
    repository::RepositoryState,
    session::{SessionError, SessionResolver, SessionStore},
    storage::{MemoryCredentialStore, TOKEN_KEY},
};

/// Cookie carrying the session token for server-rendered pages.
pub const SESSION_COOKIE: &str = "pharmalink_token";

/// Header accepted in `Env::Local` in place of a token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload expected inside a session JWT. Provider-specific claims are ignored.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UUID, the primary key of `public.profiles`.
    pub sub: Uuid,
    /// Expiration time; expired tokens are rejected.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// Validates the signature and expiry of `token` and returns its claims.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Provider tokens carry an `aud` claim we have no use for.
    validation.validate_aud = false;

    decode::<Claims>(token, &decoding_key, &validation).map(|data| data.claims)
}

/// request_token
///
/// Extracts the session token from a `Bearer` authorization header, falling back to the
/// session cookie.
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        return Some(token.trim().to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(Cookie::value_trimmed)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// The session cookie handed out on sign-in. `secure` should be set whenever the site is
/// served over HTTPS.
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Expires the session cookie in the browser.
pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

/// JwtSessionResolver
///
/// Resolves a session token by validating it and looking the subject up in the repository.
/// Used both by the request extractors here and by `SessionStore::initialize`.
#[derive(Clone)]
pub struct JwtSessionResolver {
    repo: RepositoryState,
    secret: String,
}

impl JwtSessionResolver {
    pub fn new(repo: RepositoryState, secret: impl Into<String>) -> Self {
        Self {
            repo,
            secret: secret.into(),
        }
    }

    /// Builds a resolver from any state exposing the repository and configuration.
    pub fn from_state<S>(state: &S) -> Self
    where
        RepositoryState: FromRef<S>,
        AppConfig: FromRef<S>,
    {
        Self::new(
            RepositoryState::from_ref(state),
            AppConfig::from_ref(state).jwt_secret,
        )
    }
}

#[async_trait]
impl SessionResolver for JwtSessionResolver {
    async fn resolve(&self, token: &str) -> Result<User, SessionError> {
        let claims = decode_claims(token, &self.secret).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => SessionError::InvalidToken("expired".to_string()),
            _ => SessionError::InvalidToken(e.to_string()),
        })?;

        // The token can outlive the account; the profile row is authoritative for the role.
        self.repo
            .get_user(claims.sub)
            .await
            .ok_or(SessionError::UnknownUser(claims.sub))
    }
}

/// resolve_request_user
///
/// Identifies the caller of a request, or returns `None` for anonymous requests and for any
/// token that fails to resolve.
pub async fn resolve_request_user<S>(headers: &HeaderMap, state: &S) -> Option<User>
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    let repo = RepositoryState::from_ref(state);
    let config = AppConfig::from_ref(state);

    // Local development bypass: a known profile UUID in `x-user-id` stands in for a token.
    if config.env == Env::Local {
        let dev_user = headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok());
        if let Some(user_id) = dev_user {
            if let Some(user) = repo.get_user(user_id).await {
                return Some(user);
            }
        }
    }

    let token = request_token(headers)?;

    // Each request hydrates its own store from the presented token, bounded like any other
    // session initialization.
    let store = SessionStore::new(Arc::new(MemoryCredentialStore::with_entries([(
        TOKEN_KEY,
        token.as_str(),
    )])));
    let resolver = JwtSessionResolver::new(repo, config.jwt_secret);
    if let Err(e) = store.initialize(&resolver, config.session_init_timeout).await {
        tracing::debug!(error = %e, "request token rejected");
    }
    let session = store.read();
    if session.authenticated { session.user } else { None }
}

/// resolve_session
///
/// The `Session` a request presents. Server-side resolution is synchronous with the request,
/// so the result is never loading.
pub async fn resolve_session<S>(headers: &HeaderMap, state: &S) -> Session
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    match resolve_request_user(headers, state).await {
        Some(user) => Session::authenticated(user),
        None => Session::unauthenticated(),
    }
}

/// AuthUser
///
/// Resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub related_id: Option<Uuid>,
    pub email: String,
}

impl AuthUser {
    /// Rejects the request with 403 unless the caller has `role`.
    pub fn require(&self, role: Role) -> Result<(), StatusCode> {
        if self.role == role {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.id, actual = %self.role, required = %role, "role check failed");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            related_id: user.related_id,
            email: user.email,
        }
    }
}

/// AuthUser Extractor
///
/// Usable as a handler argument on any authenticated route. Rejects with 401 when the request
/// carries no resolvable identity.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve_request_user(&parts.headers, state)
            .await
            .map(AuthUser::from)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
