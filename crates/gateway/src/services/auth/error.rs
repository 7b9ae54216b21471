//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username does not meet the format rules.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// No user with this username.
    #[error("unknown username")]
    UnknownUser,

    /// Wrong password.
    #[error("incorrect credentials")]
    IncorrectAuth,

    /// Username already registered.
    #[error("username already exists")]
    UsernameExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The device token does not belong to the user.
    #[error("device session not found")]
    SessionInvalid,

    /// Every generated UID collided.
    #[error("no free identifier after {0} attempts")]
    UidExhausted(usize),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
