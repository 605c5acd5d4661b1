use crate::models::{CredentialStatus, CredentialSubmission, PharmacistCredential, User};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Persistence contract used by the extractors and handlers. `Send + Sync + async_trait`
/// lets `Arc<dyn Repository>` cross Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    // Mirrors an account created at the auth provider. None if the insert failed.
    async fn create_user(&self, user: User) -> Option<User>;

    // --- Pharmacist credentials ---
    async fn get_credential_for_user(&self, user_id: Uuid) -> Option<PharmacistCredential>;
    // Creates or replaces the user's submission; the review starts over as pending.
    async fn upsert_credential(
        &self,
        user_id: Uuid,
        submission: CredentialSubmission,
    ) -> Option<PharmacistCredential>;
    // Admin review queue, oldest first.
    async fn get_pending_credentials(&self) -> Vec<PharmacistCredential>;
    async fn set_credential_status(
        &self,
        id: Uuid,
        status: CredentialStatus,
        reviewer: Uuid,
    ) -> Option<PharmacistCredential>;
}

/// RepositoryState
pub type RepositoryState = Arc<dyn Repository>;

const CREDENTIAL_COLUMNS: &str = "id, user_id, full_name, license_number, status, reviewed_by, created_at, updated_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Query failures are logged and surface as empty results.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, role, related_id FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            // Includes rows whose role tag is outside the known set.
            tracing::error!("get_user error: {:?}", e);
            None
        })
    }

    async fn create_user(&self, user: User) -> Option<User> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO profiles (id, email, role, related_id)
               VALUES ($1, $2, $3, $4)
               RETURNING id, email, role, related_id"#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.related_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| tracing::error!("create_user error: {:?}", e))
        .ok()
    }

    async fn get_credential_for_user(&self, user_id: Uuid) -> Option<PharmacistCredential> {
        let sql = format!("SELECT {CREDENTIAL_COLUMNS} FROM pharmacist_credentials WHERE user_id = $1");
        sqlx::query_as::<_, PharmacistCredential>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_credential_for_user error: {:?}", e);
                None
            })
    }

    async fn upsert_credential(
        &self,
        user_id: Uuid,
        submission: CredentialSubmission,
    ) -> Option<PharmacistCredential> {
        let sql = format!(
            r#"INSERT INTO pharmacist_credentials (id, user_id, full_name, license_number, status)
               VALUES ($1, $2, $3, $4, 'pending')
               ON CONFLICT (user_id) DO UPDATE
               SET full_name = EXCLUDED.full_name,
                   license_number = EXCLUDED.license_number,
                   status = 'pending',
                   reviewed_by = NULL,
                   updated_at = now()
               RETURNING {CREDENTIAL_COLUMNS}"#
        );
        sqlx::query_as::<_, PharmacistCredential>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(submission.full_name)
            .bind(submission.license_number)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| tracing::error!("upsert_credential error: {:?}", e))
            .ok()
    }

    async fn get_pending_credentials(&self) -> Vec<PharmacistCredential> {
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM pharmacist_credentials WHERE status = 'pending' ORDER BY created_at ASC"
        );
        match sqlx::query_as::<_, PharmacistCredential>(&sql)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("get_pending_credentials error: {:?}", e);
                vec![]
            }
        }
    }

    async fn set_credential_status(
        &self,
        id: Uuid,
        status: CredentialStatus,
        reviewer: Uuid,
    ) -> Option<PharmacistCredential> {
        let sql = format!(
            r#"UPDATE pharmacist_credentials
               SET status = $2, reviewed_by = $3, updated_at = now()
               WHERE id = $1
               RETURNING {CREDENTIAL_COLUMNS}"#
        );
        sqlx::query_as::<_, PharmacistCredential>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(reviewer)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("set_credential_status error: {:?}", e);
                None
            })
    }
}
