use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use pharmalink::{
    AppState,
    auth::{
        AuthUser, Claims, JwtSessionResolver, SESSION_COOKIE, removal_cookie, request_token,
        resolve_session, session_cookie,
    },
    config::{AppConfig, Env},
    models::{
        CredentialStatus, CredentialSubmission, PharmacistCredential, Role, Session, User,
    },
    repository::Repository,
    session::{SessionError, SessionResolver, SessionStore},
    storage::{MemoryCredentialStore, TOKEN_KEY},
};
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use uuid::Uuid;

// --- Mock Repository for Auth Logic ---

#[derive(Default)]
struct MockAuthRepo {
    user_to_return: Option<User>,
}

#[async_trait]
impl Repository for MockAuthRepo {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.user_to_return.clone().filter(|user| user.id == id)
    }
    async fn create_user(&self, user: User) -> Option<User> {
        Some(user)
    }
    async fn get_credential_for_user(&self, _user_id: Uuid) -> Option<PharmacistCredential> {
        None
    }
    async fn upsert_credential(
        &self,
        _user_id: Uuid,
        _submission: CredentialSubmission,
    ) -> Option<PharmacistCredential> {
        None
    }
    async fn get_pending_credentials(&self) -> Vec<PharmacistCredential> {
        vec![]
    }
    async fn set_credential_status(
        &self,
        _id: Uuid,
        _status: CredentialStatus,
        _reviewer: Uuid,
    ) -> Option<PharmacistCredential> {
        None
    }
}

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn create_token(user_id: Uuid, issued_at: u64, expires_at: u64) -> String {
    let claims = Claims {
        sub: user_id,
        iat: issued_at as usize,
        exp: expires_at as usize,
    };
    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn valid_token(user_id: Uuid) -> String {
    create_token(user_id, now(), now() + 3600)
}

fn test_user(role: Role) -> User {
    User {
        id: TEST_USER_ID,
        email: "test@example.com".to_string(),
        role,
        related_id: None,
    }
}

fn create_app_state(env: Env, repo: MockAuthRepo) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState {
        repo: Arc::new(repo),
        config,
    }
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(token: &str) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    parts
}

// --- Extractor Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let app_state = create_app_state(
        Env::Production,
        MockAuthRepo {
            user_to_return: Some(test_user(Role::Pharmacist)),
        },
    );
    let mut parts = with_bearer(&valid_token(TEST_USER_ID));

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(user.id, TEST_USER_ID);
    assert_eq!(user.role, Role::Pharmacist);
}

#[tokio::test]
async fn test_auth_success_with_session_cookie() {
    let app_state = create_app_state(
        Env::Production,
        MockAuthRepo {
            user_to_return: Some(test_user(Role::Pharmacy)),
        },
    );
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::COOKIE,
        header::HeaderValue::from_str(&format!(
            "theme=dark; {}={}",
            SESSION_COOKIE,
            valid_token(TEST_USER_ID)
        ))
        .unwrap(),
    );

    let user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user.unwrap().role, Role::Pharmacy);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, MockAuthRepo::default());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    // Well past the default leeway.
    let token = create_token(TEST_USER_ID, now() - 7200, now() - 3600);
    let app_state = create_app_state(
        Env::Production,
        MockAuthRepo {
            user_to_return: Some(test_user(Role::Admin)),
        },
    );
    let mut parts = with_bearer(&token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_for_deleted_user() {
    let app_state = create_app_state(Env::Production, MockAuthRepo::default());
    let mut parts = with_bearer(&valid_token(TEST_USER_ID));

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let app_state = create_app_state(
        Env::Local,
        MockAuthRepo {
            user_to_return: Some(test_user(Role::Admin)),
        },
    );
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&TEST_USER_ID.to_string()).unwrap(),
    );

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(user.id, TEST_USER_ID);
    assert_eq!(user.role, Role::Admin);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let app_state = create_app_state(
        Env::Production,
        MockAuthRepo {
            user_to_return: Some(test_user(Role::Admin)),
        },
    );
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&TEST_USER_ID.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_require_role() {
    let user = AuthUser::from(test_user(Role::Pharmacy));
    assert!(user.require(Role::Pharmacy).is_ok());
    assert_eq!(user.require(Role::Admin), Err(StatusCode::FORBIDDEN));
}

// --- Token and Session Resolution ---

#[test]
fn test_request_token_prefers_bearer() {
    let mut parts = with_bearer("from-header");
    parts.headers.insert(
        header::COOKIE,
        header::HeaderValue::from_str(&format!("{}=from-cookie", SESSION_COOKIE)).unwrap(),
    );
    assert_eq!(request_token(&parts.headers).as_deref(), Some("from-header"));
}

#[test]
fn test_request_token_ignores_empty_cookie() {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::COOKIE,
        header::HeaderValue::from_str(&format!("{}=", SESSION_COOKIE)).unwrap(),
    );
    assert_eq!(request_token(&parts.headers), None);
}

#[test]
fn test_request_token_strips_cookie_quotes() {
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::COOKIE,
        header::HeaderValue::from_str(&format!("{}=\"abc.def\"", SESSION_COOKIE)).unwrap(),
    );
    assert_eq!(request_token(&parts.headers).as_deref(), Some("abc.def"));
}

#[tokio::test]
async fn test_auth_success_with_quoted_cookie() {
    let app_state = create_app_state(
        Env::Production,
        MockAuthRepo {
            user_to_return: Some(test_user(Role::Pharmacy)),
        },
    );
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::COOKIE,
        header::HeaderValue::from_str(&format!(
            "{}=\"{}\"",
            SESSION_COOKIE,
            valid_token(TEST_USER_ID)
        ))
        .unwrap(),
    );

    let user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(user.unwrap().id, TEST_USER_ID);
}

#[test]
fn test_session_cookie_attributes() {
    let cookie = session_cookie("jwt".to_string(), true);
    assert_eq!(cookie.name(), SESSION_COOKIE);
    assert_eq!(cookie.value(), "jwt");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.path(), Some("/"));

    let local = session_cookie("jwt".to_string(), false);
    assert!(!local.to_string().contains("Secure"));
}

#[test]
fn test_removal_cookie_expires_immediately() {
    let cookie = removal_cookie(true).to_string();
    assert!(cookie.starts_with(&format!("{}=;", SESSION_COOKIE)));
    assert!(cookie.contains("Max-Age=0"));
    assert!(cookie.contains("Secure"));
}

#[tokio::test]
async fn test_resolve_session_never_fails() {
    let app_state = create_app_state(Env::Production, MockAuthRepo::default());
    let parts = with_bearer("not-a-jwt");

    let session = resolve_session(&parts.headers, &app_state).await;

    assert_eq!(session, Session::unauthenticated());
}

#[tokio::test]
async fn test_jwt_resolver_rejects_wrong_secret() {
    let resolver = JwtSessionResolver::new(
        Arc::new(MockAuthRepo {
            user_to_return: Some(test_user(Role::Pharmacy)),
        }),
        "a-different-secret",
    );

    let result = resolver.resolve(&valid_token(TEST_USER_ID)).await;

    assert!(matches!(result, Err(SessionError::InvalidToken(_))));
}

#[tokio::test]
async fn test_jwt_resolver_reports_unknown_user() {
    let state = create_app_state(Env::Production, MockAuthRepo::default());
    let resolver = JwtSessionResolver::from_state(&state);

    let result = resolver.resolve(&valid_token(TEST_USER_ID)).await;

    assert!(matches!(result, Err(SessionError::UnknownUser(id)) if id == TEST_USER_ID));
}

#[tokio::test]
async fn test_store_hydrates_through_jwt_resolver() {
    let state = create_app_state(
        Env::Production,
        MockAuthRepo {
            user_to_return: Some(test_user(Role::Pharmacist)),
        },
    );
    let resolver = JwtSessionResolver::from_state(&state);
    let token = valid_token(TEST_USER_ID);
    let store = SessionStore::new(Arc::new(MemoryCredentialStore::with_entries([(
        TOKEN_KEY,
        token.as_str(),
    )])));

    store
        .initialize(&resolver, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(store.read().role(), Some(Role::Pharmacist));
}
