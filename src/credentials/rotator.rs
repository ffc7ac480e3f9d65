use std::collections::HashSet;
use std::future::Future;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{ AppError, PollError, Result };

/// A credential handed out for one request.
///
/// Failure and recovery are reported against the lease's index, so two requests running
/// concurrently never advance the pool twice for the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialLease {
    pub index: usize,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub failed: usize,
    pub current: usize,
    pub available: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    current: usize,
    failed: HashSet<usize>,
}

impl PoolState {
    fn reset(&mut self) {
        self.current = 0;
        self.failed.clear();
    }
}

/// Rotates through a fixed list of API keys, skipping the ones a provider rejected.
pub struct CredentialRotator {
    name: String,
    keys: Vec<String>,
    state: Mutex<PoolState>,
}

impl CredentialRotator {
    pub fn new(name: impl Into<String>, keys: Vec<String>) -> Result<Self> {
        let name = name.into();
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(AppError::Config(format!("No {} API keys configured", name)));
        }

        Ok(Self {
            name,
            keys,
            state: Mutex::new(PoolState::default()),
        })
    }

    /// Returns the first non-failed key at or after the current index.
    ///
    /// A pool whose keys have all failed is reset first and serves index 0.
    pub async fn acquire(&self) -> CredentialLease {
        let mut state = self.state.lock().await;
        let total = self.keys.len();

        if state.failed.len() >= total {
            tracing::warn!(pool = %self.name, "All credentials failed, resetting pool");
            state.reset();
        }

        let mut index = state.current % total;
        while state.failed.contains(&index) {
            index = (index + 1) % total;
        }
        state.current = index;

        CredentialLease {
            index,
            secret: self.keys[index].clone(),
        }
    }

    /// Marks the leased key as failed and moves the pool past it.
    pub async fn mark_failed(&self, lease: &CredentialLease) {
        let mut state = self.state.lock().await;
        let total = self.keys.len();

        state.failed.insert(lease.index);
        if state.current == lease.index {
            state.current = (state.current + 1) % total;
        }

        tracing::warn!(
            pool = %self.name,
            index = lease.index,
            failed = state.failed.len(),
            total,
            "Credential rejected, rotating"
        );

        if state.failed.len() >= total {
            tracing::warn!(pool = %self.name, "All credentials failed, resetting pool");
            state.reset();
        }
    }

    pub async fn mark_recovered(&self, lease: &CredentialLease) {
        let mut state = self.state.lock().await;
        if state.failed.remove(&lease.index) {
            tracing::info!(pool = %self.name, index = lease.index, "Credential recovered");
        }
    }

    pub async fn reset(&self) {
        self.state.lock().await.reset();
        tracing::info!(pool = %self.name, "Credential pool reset");
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        let total = self.keys.len();
        PoolStatus {
            total,
            failed: state.failed.len(),
            current: state.current,
            available: total - state.failed.len(),
        }
    }

    /// Runs `op` with successive credentials until it succeeds, fails for a reason other
    /// than the credential, or every key in the pool has been tried once.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> std::result::Result<T, PollError>
        where F: FnMut(CredentialLease) -> Fut, Fut: Future<Output = std::result::Result<T, PollError>>
    {
        let attempts = self.keys.len();

        for _ in 0..attempts {
            let lease = self.acquire().await;
            match op(lease.clone()).await {
                Ok(value) => {
                    self.mark_recovered(&lease).await;
                    return Ok(value);
                }
                Err(e) if e.is_credential() => {
                    self.mark_failed(&lease).await;
                }
                Err(e) => {
                    return Err(e);
                }
            }
        }

        tracing::error!(pool = %self.name, attempts, "All credentials exhausted");
        Err(PollError::CredentialsExhausted(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    fn pool(n: usize) -> CredentialRotator {
        CredentialRotator::new(
            "test",
            (0..n).map(|i| format!("key-{}", i)).collect()
        ).unwrap()
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(CredentialRotator::new("test", vec![]).is_err());
        assert!(CredentialRotator::new("test", vec!["  ".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_rotation_settles_on_working_key() {
        let rotator = pool(3);
        let calls = AtomicUsize::new(0);

        let used = rotator
            .execute(|lease| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if lease.index < 2 { Err(PollError::Credential(401)) } else { Ok(lease.index) }
                }
            }).await
            .unwrap();

        assert_eq!(used, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(rotator.status().await, PoolStatus {
            total: 3,
            failed: 2,
            current: 2,
            available: 1,
        });

        // The next fetch starts at the key that worked.
        let next = rotator.execute(|lease| async move { Ok::<_, PollError>(lease.index) }).await;
        assert_eq!(next, Ok(2));
    }

    #[tokio::test]
    async fn test_exhaustion_resets_pool() {
        let rotator = pool(3);

        let result = rotator.execute(|_| async { Err::<(), _>(PollError::Credential(429)) }).await;
        assert_eq!(result, Err(PollError::CredentialsExhausted(3)));

        let status = rotator.status().await;
        assert_eq!(status.failed, 0);
        assert_eq!(status.current, 0);
        assert_eq!(rotator.acquire().await.index, 0);
    }

    #[tokio::test]
    async fn test_non_credential_errors_do_not_rotate() {
        let rotator = pool(2);
        let result = rotator.execute(|_| async {
            Err::<(), _>(PollError::Upstream(500))
        }).await;

        assert_eq!(result, Err(PollError::Upstream(500)));
        assert_eq!(rotator.status().await.failed, 0);
        assert_eq!(rotator.acquire().await.index, 0);
    }

    #[tokio::test]
    async fn test_stale_lease_does_not_advance_twice() {
        let rotator = pool(3);
        let first = rotator.acquire().await;
        let second = rotator.acquire().await;
        assert_eq!(first, second);

        rotator.mark_failed(&first).await;
        rotator.mark_failed(&second).await;

        assert_eq!(rotator.acquire().await.index, 1);
    }

    #[tokio::test]
    async fn test_acquire_skips_failed_keys() {
        let rotator = pool(3);
        let lease = rotator.acquire().await;
        rotator.mark_failed(&lease).await;
        let lease = rotator.acquire().await;
        assert_eq!(lease.index, 1);
        assert_eq!(lease.secret, "key-1");

        rotator.mark_recovered(&CredentialLease { index: 0, secret: String::new() }).await;
        assert_eq!(rotator.status().await.failed, 0);
        rotator.reset().await;
        assert_eq!(rotator.status().await.current, 0);
    }
}
