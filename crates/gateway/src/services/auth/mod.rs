//! Authentication service.
//!
//! Users log in with a username and password; every successful registration
//! or login issues a new device with a random bearer token. Only the
//! SHA-256 of a device token is stored. Each user also owns an internal
//! token that the gateway forwards to the recognition service and never
//! reveals to clients.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use bestby_core::{DeviceUid, UserUid, random_uid};

use crate::db::{AccountStore, DeviceSession, NewDevice, NewUser, UserInsert};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Username length bounds.
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 64;

/// Attempts at finding free UIDs before giving up.
const MAX_UID_ATTEMPTS: usize = 8;

/// Credentials handed to a newly authenticated device.
#[derive(Debug)]
pub struct DeviceGrant {
    pub user_uid: UserUid,
    pub device_uid: DeviceUid,
    /// Shown to the client once; only its hash is stored.
    pub device_token: SecretString,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AccountStore>,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Register a new user together with their first device.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUsername` or `AuthError::WeakPassword` for
    /// invalid input, and `AuthError::UsernameExists` if the username is taken.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        name: &str,
        user_agent: Option<&str>,
    ) -> Result<DeviceGrant, AuthError> {
        let username = validate_username(username)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        for _ in 0..MAX_UID_ATTEMPTS {
            let user = NewUser {
                user_uid: UserUid::generate(),
                username: username.to_string(),
                name: name.trim().to_string(),
                password_hash: password_hash.clone(),
                internal_token: SecretString::from(random_uid()),
            };
            let (device, device_token) = new_device(&user.user_uid, user_agent);

            match self.store.create_user(&user, &device).await? {
                UserInsert::Inserted => {
                    info!(user_uid = %user.user_uid, "User registered");
                    return Ok(DeviceGrant {
                        user_uid: user.user_uid,
                        device_uid: device.device_uid,
                        device_token,
                    });
                }
                UserInsert::UsernameTaken => return Err(AuthError::UsernameExists),
                UserInsert::UidTaken => warn!("User UID collision, regenerating"),
            }
        }

        Err(AuthError::UidExhausted(MAX_UID_ATTEMPTS))
    }

    /// Verify a password and issue a new device.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownUser` if the username is not registered and
    /// `AuthError::IncorrectAuth` if the password is wrong.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        user_agent: Option<&str>,
    ) -> Result<DeviceGrant, AuthError> {
        let user = self
            .store
            .find_user(username.trim())
            .await?
            .ok_or(AuthError::UnknownUser)?;

        verify_password(password, &user.password_hash)?;

        for _ in 0..MAX_UID_ATTEMPTS {
            let (device, device_token) = new_device(&user.user_uid, user_agent);
            if self.store.add_device(&device).await? {
                info!(user_uid = %user.user_uid, device_uid = %device.device_uid, "Device issued");
                return Ok(DeviceGrant {
                    user_uid: user.user_uid,
                    device_uid: device.device_uid,
                    device_token,
                });
            }
            warn!("Device UID collision, regenerating");
        }

        Err(AuthError::UidExhausted(MAX_UID_ATTEMPTS))
    }

    /// Resolve a username and device token to a device session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionInvalid` if the token does not belong to a
    /// device of this user.
    pub async fn authenticate(
        &self,
        username: &str,
        device_token: &str,
    ) -> Result<DeviceSession, AuthError> {
        self.store
            .find_session(username.trim(), &hash_device_token(device_token))
            .await?
            .ok_or(AuthError::SessionInvalid)
    }
}

/// Normalize and validate a username.
fn validate_username(username: &str) -> Result<&str, AuthError> {
    let username = username.trim();
    let length = username.chars().count();

    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(AuthError::InvalidUsername(format!(
            "must be {MIN_USERNAME_LENGTH} to {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AuthError::InvalidUsername(
            "only letters, digits, '_', '-' and '.' are allowed".to_string(),
        ));
    }

    Ok(username)
}

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::IncorrectAuth)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::IncorrectAuth)
}

/// Hex SHA-256 of a device token, as stored in `gateway.devices`.
fn hash_device_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generate a device row and the plaintext token for it.
fn new_device(user_uid: &UserUid, user_agent: Option<&str>) -> (NewDevice, SecretString) {
    let token = random_uid();
    let device = NewDevice {
        device_uid: DeviceUid::generate(),
        user_uid: user_uid.clone(),
        token_hash: hash_device_token(&token),
        user_agent: user_agent.map(str::to_string),
    };
    (device, SecretString::from(token))
}
