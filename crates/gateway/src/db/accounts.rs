//! Account repository backed by `gateway.users` and `gateway.devices`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use tracing::{debug, instrument};

use bestby_core::{DeviceUid, UserUid};

use super::{
    AccountStore, DeviceSession, NewDevice, NewUser, RepositoryError, UserInsert, UserRecord,
};

/// Repository for users and devices.
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    /// Create a new account repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_uid: UserUid,
    username: String,
    name: String,
    password_hash: String,
    internal_token: String,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    username: String,
    user_uid: UserUid,
    device_uid: DeviceUid,
    internal_token: String,
}

async fn insert_device<'e, E>(executor: E, device: &NewDevice) -> Result<bool, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let inserted: Option<(DeviceUid,)> = sqlx::query_as(
        r"
        INSERT INTO gateway.devices (device_uid, user_uid, token_hash, user_agent)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        RETURNING device_uid
        ",
    )
    .bind(&device.device_uid)
    .bind(&device.user_uid)
    .bind(&device.token_hash)
    .bind(device.user_agent.as_deref())
    .fetch_optional(executor)
    .await?;

    Ok(inserted.is_some())
}

#[async_trait]
impl AccountStore for AccountRepository {
    #[instrument(skip_all, fields(username = %user.username))]
    async fn create_user(
        &self,
        user: &NewUser,
        device: &NewDevice,
    ) -> Result<UserInsert, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<(UserUid,)> = sqlx::query_as(
            r"
            INSERT INTO gateway.users (user_uid, username, name, password_hash, internal_token)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING user_uid
            ",
        )
        .bind(&user.user_uid)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.internal_token.expose_secret())
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            let (username_taken,): (bool,) = sqlx::query_as(
                r"
                SELECT EXISTS(SELECT 1 FROM gateway.users WHERE username = $1)
                ",
            )
            .bind(&user.username)
            .fetch_one(&mut *tx)
            .await?;

            tx.rollback().await?;
            return Ok(if username_taken {
                UserInsert::UsernameTaken
            } else {
                UserInsert::UidTaken
            });
        }

        if !insert_device(&mut *tx, device).await? {
            tx.rollback().await?;
            return Ok(UserInsert::UidTaken);
        }

        tx.commit().await?;
        debug!(user_uid = %user.user_uid, "User registered");
        Ok(UserInsert::Inserted)
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT user_uid, username, name, password_hash, internal_token
            FROM gateway.users
            WHERE username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserRecord {
            user_uid: r.user_uid,
            username: r.username,
            name: r.name,
            password_hash: r.password_hash,
            internal_token: SecretString::from(r.internal_token),
        }))
    }

    #[instrument(skip_all, fields(user_uid = %device.user_uid))]
    async fn add_device(&self, device: &NewDevice) -> Result<bool, RepositoryError> {
        Ok(insert_device(&self.pool, device).await?)
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn find_session(
        &self,
        username: &str,
        token_hash: &str,
    ) -> Result<Option<DeviceSession>, RepositoryError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r"
            UPDATE gateway.devices d
            SET last_seen_at = NOW()
            FROM gateway.users u
            WHERE d.user_uid = u.user_uid
              AND u.username = $1
              AND d.token_hash = $2
            RETURNING u.username, u.user_uid, d.device_uid, u.internal_token
            ",
        )
        .bind(username)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DeviceSession {
            username: r.username,
            user_uid: r.user_uid,
            device_uid: r.device_uid,
            internal_token: SecretString::from(r.internal_token),
        }))
    }
}
