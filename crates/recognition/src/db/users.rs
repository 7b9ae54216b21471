//! Read-only access to `gateway.users` for internal identity checks.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tracing::instrument;

use bestby_core::UserUid;

use super::RepositoryError;
use crate::middleware::auth::{Authenticator, InternalCredentials};

/// Repository for user lookups owned by the gateway schema.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether the username, user UID and internal token belong to one user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn internal_identity_matches(
        &self,
        username: &str,
        user_uid: &UserUid,
        internal_token: &str,
    ) -> Result<bool, RepositoryError> {
        let row: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS(
                SELECT 1 FROM gateway.users
                WHERE username = $1 AND user_uid = $2 AND internal_token = $3
            )
            ",
        )
        .bind(username)
        .bind(user_uid)
        .bind(internal_token)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

#[async_trait]
impl Authenticator for UserRepository {
    async fn verify(&self, credentials: &InternalCredentials) -> Result<bool, RepositoryError> {
        self.internal_identity_matches(
            &credentials.username,
            &credentials.user_uid,
            credentials.internal_token.expose_secret(),
        )
        .await
    }
}
