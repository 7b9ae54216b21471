//! In-process account store for tests and local runs.
//!
//! Enforces the same uniqueness rules as the `gateway` schema.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::{
    AccountStore, DeviceSession, NewDevice, NewUser, RepositoryError, UserInsert, UserRecord,
};

#[derive(Default)]
struct State {
    users: HashMap<String, UserRecord>,
    devices: Vec<NewDevice>,
}

impl State {
    fn device_conflicts(&self, device: &NewDevice) -> bool {
        self.devices
            .iter()
            .any(|d| d.device_uid == device.device_uid || d.token_hash == device.token_hash)
    }
}

/// Thread-safe in-memory [`AccountStore`].
#[derive(Default)]
pub struct MemoryAccounts {
    state: Mutex<State>,
}

impl MemoryAccounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered devices across all users.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn create_user(
        &self,
        user: &NewUser,
        device: &NewDevice,
    ) -> Result<UserInsert, RepositoryError> {
        let mut state = self.lock();
        if state.users.contains_key(&user.username) {
            return Ok(UserInsert::UsernameTaken);
        }
        let uid_taken = state.users.values().any(|u| {
            u.user_uid == user.user_uid
                || u.internal_token.expose_secret() == user.internal_token.expose_secret()
        });
        if uid_taken || state.device_conflicts(device) {
            return Ok(UserInsert::UidTaken);
        }

        state.users.insert(
            user.username.clone(),
            UserRecord {
                user_uid: user.user_uid.clone(),
                username: user.username.clone(),
                name: user.name.clone(),
                password_hash: user.password_hash.clone(),
                internal_token: user.internal_token.clone(),
            },
        );
        state.devices.push(device.clone());
        Ok(UserInsert::Inserted)
    }

    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError> {
        Ok(self.lock().users.get(username).cloned())
    }

    async fn add_device(&self, device: &NewDevice) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        if state.device_conflicts(device) {
            return Ok(false);
        }
        state.devices.push(device.clone());
        Ok(true)
    }

    async fn find_session(
        &self,
        username: &str,
        token_hash: &str,
    ) -> Result<Option<DeviceSession>, RepositoryError> {
        let state = self.lock();
        let Some(user) = state.users.get(username) else {
            return Ok(None);
        };
        Ok(state
            .devices
            .iter()
            .find(|d| d.user_uid == user.user_uid && d.token_hash == token_hash)
            .map(|d| DeviceSession {
                username: user.username.clone(),
                user_uid: user.user_uid.clone(),
                device_uid: d.device_uid.clone(),
                internal_token: user.internal_token.clone(),
            }))
    }
}
