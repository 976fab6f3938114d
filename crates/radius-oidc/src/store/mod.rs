//! Ephemeral storage for authorization codes and refresh tokens
//!
//! Both kinds of record are single-use: [`CredentialStore::take_code`] and
//! [`CredentialStore::take_refresh_token`] remove the record in the same
//! step that returns it, so two concurrent redemptions of one key see
//! exactly one success.

mod memory;

pub use memory::{ExpiringTable, MemoryCredentialStore};

use crate::oauth::pkce::PkceMethod;
use crate::task::BackgroundTask;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{table} table is full ({limit} entries)")]
    Full { table: &'static str, limit: usize },
}

/// One-time authorization code issued after a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub username: String,
    pub groups: Vec<String>,
    pub role: Option<String>,
    pub scope: String,
    /// The redirect_uri the code was issued for
    pub redirect_uri: String,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<PkceMethod>,
}

/// Rotating refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub username: String,
    pub groups: Vec<String>,
    pub role: Option<String>,
    pub scope: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store a code until `ttl` elapses
    async fn put_code(&self, record: AuthorizationCode, ttl: Duration) -> Result<(), StoreError>;

    /// Remove and return a live code
    async fn take_code(&self, code: &str) -> Option<AuthorizationCode>;

    /// Store a refresh token until `ttl` elapses
    async fn put_refresh_token(&self, record: RefreshToken, ttl: Duration)
        -> Result<(), StoreError>;

    /// Remove and return a live refresh token
    async fn take_refresh_token(&self, token: &str) -> Option<RefreshToken>;

    /// Delete expired records, returning how many were removed
    async fn sweep(&self) -> usize;
}

/// Run [`CredentialStore::sweep`] every `interval`
pub fn start_sweeper(store: Arc<dyn CredentialStore>, interval: Duration) -> BackgroundTask {
    BackgroundTask::spawn_periodic("credential-sweep", interval, move || {
        let store = Arc::clone(&store);
        async move {
            let removed = store.sweep().await;
            if removed > 0 {
                debug!(removed, "Credential store sweep completed");
            }
        }
    })
}
