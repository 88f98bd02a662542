//! Scoped process environment for backends that only read ambient credentials.
//!
//! Prefer passing [`Credentials`](crate::Credentials) directly to the tile
//! reader. When a backend insists on environment variables, hold a
//! [`CredentialScope`] around the whole composite build: it serializes access
//! across threads and restores the previous values when dropped, on success,
//! error or panic alike.

use std::sync::{Mutex, MutexGuard};

use crate::Credentials;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard that sets environment variables and restores them on drop.
pub struct CredentialScope {
    previous: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl CredentialScope {
    /// Set `vars` for the lifetime of the returned guard.
    ///
    /// Blocks while another scope is active in this process.
    pub fn enter(vars: Vec<(String, String)>) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = vars
            .iter()
            .map(|(key, _)| (key.clone(), std::env::var(key).ok()))
            .collect();
        for (key, value) in &vars {
            std::env::set_var(key, value);
        }
        tracing::debug!(count = vars.len(), "Entered credential scope");

        Self {
            previous,
            _lock: lock,
        }
    }

    /// Scope exporting the variables derived from `credentials`.
    pub fn for_credentials(credentials: &Credentials) -> Self {
        Self::enter(credentials.env_vars())
    }
}

impl Drop for CredentialScope {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(&key, v),
                None => std::env::remove_var(&key),
            }
        }
        tracing::debug!("Left credential scope");
    }
}
