use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity ---

/// Role
///
/// The closed set of account types on the platform. Every role owns exactly one dashboard
/// (see `guard::ROLE_DASHBOARDS`), and the role tag is persisted next to the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Pharmacy,
    Pharmacist,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Pharmacy, Role::Pharmacist, Role::Admin];

    /// The tag used in the database, in JWT claims and in the credential store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pharmacy => "pharmacy",
            Role::Pharmacist => "pharmacist",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UnknownRole
///
/// Raised when a persisted or transmitted role tag is outside the closed role set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role tag `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// User
///
/// The account record stored in `public.profiles`. `related_id` points at the pharmacy or
/// pharmacist profile owned by this account (absent for admins and unfinished sign-ups).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // Stored as TEXT; rows carrying an unknown tag fail to decode.
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub related_id: Option<Uuid>,
}

// --- Session & Guard ---

/// Session
///
/// Client-held authentication state. While `is_loading` is true neither `authenticated`
/// nor `user` may be used for access decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Session {
    pub authenticated: bool,
    pub is_loading: bool,
    pub user: Option<User>,
}

impl Session {
    /// The state every session starts in, before hydration has run.
    pub fn initializing() -> Self {
        Self {
            authenticated: false,
            is_loading: true,
            user: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            is_loading: false,
            user: None,
        }
    }

    pub fn authenticated(user: User) -> Self {
        Self {
            authenticated: true,
            is_loading: false,
            user: Some(user),
        }
    }

    /// Role of the signed-in user, if the session is resolved and authenticated.
    pub fn role(&self) -> Option<Role> {
        if self.is_loading || !self.authenticated {
            return None;
        }
        self.user.as_ref().map(|user| user.role)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initializing()
    }
}

/// GuardDecision
///
/// Outcome of evaluating a session against a page's role requirement. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[ts(export)]
pub enum GuardDecision {
    /// Session still initializing: show a neutral placeholder, do not navigate.
    Wait,
    /// Render the page's children unchanged.
    Render,
    /// Render nothing and navigate to `target`.
    Redirect { target: String },
}

// --- Pharmacist Credentials ---

/// CredentialStatus
///
/// Review state of a pharmacist's license submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum CredentialStatus {
    Pending,
    Verified,
    Rejected,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Pending => "pending",
            CredentialStatus::Verified => "verified",
            CredentialStatus::Rejected => "rejected",
        }
    }
}

/// UnknownCredentialStatus
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown credential status `{0}`")]
pub struct UnknownCredentialStatus(pub String);

impl TryFrom<String> for CredentialStatus {
    type Error = UnknownCredentialStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(CredentialStatus::Pending),
            "verified" => Ok(CredentialStatus::Verified),
            "rejected" => Ok(CredentialStatus::Rejected),
            _ => Err(UnknownCredentialStatus(value)),
        }
    }
}

/// PharmacistCredential
///
/// A license submission from `public.pharmacist_credentials`, reviewed by an admin before the
/// pharmacist can be matched with pharmacies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PharmacistCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub license_number: String,
    #[sqlx(try_from = "String")]
    pub status: CredentialStatus,
    // Admin who made the last review decision.
    pub reviewed_by: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads ---

/// RegisterUserRequest
///
/// Input for `POST /auth/register`. The password is forwarded to the auth provider and never
/// stored or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// CredentialSubmission
///
/// Input for `PUT /me/credential`. Resubmitting resets the review to pending.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CredentialSubmission {
    pub full_name: String,
    pub license_number: String,
}

/// VerificationDecision
///
/// Input for `PUT /admin/credentials/{id}/verification`. Only terminal statuses are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VerificationDecision {
    pub status: CredentialStatus,
}

// --- Responses ---

/// LoginResponse
///
/// The token is also set as the `pharmalink_token` cookie so server-rendered dashboards can
/// resolve the session.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub session: Session,
}

/// UserProfile
///
/// Output of `GET /me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub related_id: Option<Uuid>,
    // Home page for this account, from the fixed role table.
    pub dashboard: String,
    pub avatar_url: Option<String>,
}
