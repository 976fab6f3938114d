//! In-memory credential store

use super::{AuthorizationCode, CredentialStore, RefreshToken, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent map whose entries expire after a per-entry TTL.
///
/// Expired entries are invisible to [`ExpiringTable::take_once`] even before
/// [`ExpiringTable::sweep`] removes them.
pub struct ExpiringTable<V> {
    name: &'static str,
    entries: DashMap<String, Entry<V>>,
    /// 0 = unlimited
    max_entries: usize,
}

impl<V> ExpiringTable<V> {
    pub fn new(name: &'static str, max_entries: usize) -> Self {
        ExpiringTable {
            name,
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub fn put(&self, key: String, value: V, ttl: Duration) -> Result<(), StoreError> {
        if self.max_entries > 0 && self.entries.len() >= self.max_entries {
            self.sweep();
            if self.entries.len() >= self.max_entries {
                return Err(StoreError::Full {
                    table: self.name,
                    limit: self.max_entries,
                });
            }
        }

        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    /// Atomically remove `key` and return its value if it has not expired
    pub fn take_once(&self, key: &str) -> Option<V> {
        let (_, entry) = self.entries.remove(key)?;
        (entry.expires_at > Instant::now()).then_some(entry.value)
    }

    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// [`CredentialStore`] holding both tables in process memory
pub struct MemoryCredentialStore {
    codes: ExpiringTable<AuthorizationCode>,
    refresh_tokens: ExpiringTable<RefreshToken>,
}

impl MemoryCredentialStore {
    pub fn new(max_entries: usize) -> Self {
        MemoryCredentialStore {
            codes: ExpiringTable::new("authorization code", max_entries),
            refresh_tokens: ExpiringTable::new("refresh token", max_entries),
        }
    }

    pub fn codes(&self) -> &ExpiringTable<AuthorizationCode> {
        &self.codes
    }

    pub fn refresh_tokens(&self) -> &ExpiringTable<RefreshToken> {
        &self.refresh_tokens
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put_code(&self, record: AuthorizationCode, ttl: Duration) -> Result<(), StoreError> {
        self.codes.put(record.code.clone(), record, ttl)
    }

    async fn take_code(&self, code: &str) -> Option<AuthorizationCode> {
        self.codes.take_once(code)
    }

    async fn put_refresh_token(
        &self,
        record: RefreshToken,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.refresh_tokens.put(record.token.clone(), record, ttl)
    }

    async fn take_refresh_token(&self, token: &str) -> Option<RefreshToken> {
        self.refresh_tokens.take_once(token)
    }

    async fn sweep(&self) -> usize {
        self.codes.sweep() + self.refresh_tokens.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::start_sweeper;
    use std::sync::Arc;

    fn code(value: &str) -> AuthorizationCode {
        AuthorizationCode {
            code: value.to_string(),
            username: "alice".to_string(),
            groups: vec!["ops".to_string()],
            role: None,
            scope: "openid".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            nonce: None,
            code_challenge: None,
            code_challenge_method: None,
        }
    }

    fn refresh(value: &str) -> RefreshToken {
        RefreshToken {
            token: value.to_string(),
            username: "alice".to_string(),
            groups: vec![],
            role: None,
            scope: "openid".to_string(),
        }
    }

    #[tokio::test]
    async fn test_code_is_taken_once() {
        let store = MemoryCredentialStore::default();
        store
            .put_code(code("abc"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.take_code("abc").await, Some(code("abc")));
        assert_eq!(store.take_code("abc").await, None);
        assert_eq!(store.take_code("unknown").await, None);
    }

    #[tokio::test]
    async fn test_tables_are_independent() {
        let store = MemoryCredentialStore::default();
        store
            .put_code(code("same"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put_refresh_token(refresh("same"), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.take_refresh_token("same").await.is_some());
        assert!(store.take_code("same").await.is_some());
    }

    #[tokio::test]
    async fn test_expired_code_is_not_returned() {
        tokio::time::pause();
        let store = MemoryCredentialStore::default();
        store
            .put_code(code("late"), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.take_code("late").await, None);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        tokio::time::pause();
        let store = MemoryCredentialStore::default();
        store
            .put_code(code("short"), Duration::from_secs(5))
            .await
            .unwrap();
        store
            .put_code(code("long"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put_refresh_token(refresh("r"), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.sweep().await, 2);
        assert_eq!(store.codes().len(), 1);
        assert!(store.refresh_tokens().is_empty());
        assert!(store.take_code("long").await.is_some());
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let store = MemoryCredentialStore::new(2);
        store.put_code(code("a"), Duration::from_secs(60)).await.unwrap();
        store.put_code(code("b"), Duration::from_secs(60)).await.unwrap();

        let err = store
            .put_code(code("c"), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Full { limit: 2, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_redemption_has_one_winner() {
        let store = Arc::new(MemoryCredentialStore::default());
        store
            .put_code(code("race"), Duration::from_secs(60))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.take_code("race").await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_sweeper_task_removes_expired_records() {
        let store = Arc::new(MemoryCredentialStore::default());
        store
            .put_code(code("gone"), Duration::from_millis(10))
            .await
            .unwrap();

        let sweeper = start_sweeper(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        sweeper.shutdown().await;

        assert!(store.codes().is_empty());
    }
}
