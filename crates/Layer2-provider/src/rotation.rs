//! Credential rotation on rate-limit and invalid-key failures

use crate::pool::CredentialPool;
use chrono::Utc;
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};
use vibe_foundation::{Credential, Error, Result, DEFAULT_MAX_CREDENTIAL_ATTEMPTS};

/// Configuration for rotation behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Maximum number of credentials tried for one operation
    pub max_attempts: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_CREDENTIAL_ATTEMPTS,
        }
    }
}

impl RotationPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Error classification for rotation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Key hit its quota; exhaust it and rotate
    RateLimited,

    /// Key was rejected; exhaust it and rotate
    InvalidCredential,

    /// Not a credential problem; abort immediately
    Fatal,
}

/// Trait for errors that can be classified for rotation
pub trait RotatableError {
    fn classify(&self) -> FailureClass;
}

/// Execute an async operation with a pooled credential, rotating on
/// credential failures.
///
/// Rate-limited or rejected credentials are marked exhausted and another
/// one is acquired, up to `policy.max_attempts`. Any other failure is
/// returned as-is. When the bound is hit the result is
/// [`Error::NoCredentialsAvailable`].
pub async fn with_rotation<T, E, F, Fut>(
    pool: &CredentialPool,
    policy: &RotationPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    E: RotatableError + fmt::Display + Into<Error>,
    F: FnMut(Credential) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    for attempt in 1..=policy.max_attempts {
        let credential = pool.acquire()?;
        let id = credential.id.clone();

        match operation(credential).await {
            Ok(result) => {
                pool.record_use(&id, Utc::now())?;
                debug!(
                    "{}: succeeded with credential {} on attempt {}",
                    operation_name,
                    id.short(),
                    attempt
                );
                return Ok(result);
            }
            Err(e) => match e.classify() {
                FailureClass::RateLimited | FailureClass::InvalidCredential => {
                    warn!(
                        "{}: credential {} failed on attempt {}, rotating: {}",
                        operation_name,
                        id.short(),
                        attempt,
                        e
                    );
                    pool.mark_exhausted(&id)?;
                }
                FailureClass::Fatal => {
                    debug!(
                        "{}: non-credential error on attempt {}: {}",
                        operation_name, attempt, e
                    );
                    return Err(e.into());
                }
            },
        }
    }

    warn!(
        "{}: max credential attempts ({}) exceeded",
        operation_name, policy.max_attempts
    );
    Err(Error::NoCredentialsAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderError;
    use std::sync::Arc;
    use vibe_foundation::{CredentialStatus, CredentialStore, Storage};

    fn pool_of(n: usize) -> CredentialPool {
        let storage = Arc::new(Storage::in_memory().expect("storage"));
        for i in 0..n {
            storage
                .insert_credential(&Credential::new(format!("AIza-test-key-{}", i)))
                .expect("insert");
        }
        CredentialPool::load(storage).expect("pool")
    }

    #[tokio::test]
    async fn test_k_rate_limits_exhaust_k_credentials() {
        let pool = pool_of(3);
        let mut calls = 0;

        let result: Result<()> = with_rotation(&pool, &RotationPolicy::default(), "test", |_| {
            calls += 1;
            async {
                Err(ProviderError::RateLimited {
                    retry_after_ms: None,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(Error::NoCredentialsAvailable)));
        assert_eq!(calls, 3);
        assert!(pool
            .snapshot()
            .iter()
            .all(|c| c.status == CredentialStatus::Exhausted));
    }

    #[tokio::test]
    async fn test_bound_collapses_into_no_credentials() {
        let pool = pool_of(7);
        let mut calls = 0;

        let result: Result<()> = with_rotation(&pool, &RotationPolicy::new(5), "test", |_| {
            calls += 1;
            async { Err(ProviderError::Authentication("API key not valid".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::NoCredentialsAvailable)));
        assert_eq!(calls, 5);
        assert_eq!(pool.active_count(), 2);
    }

    #[tokio::test]
    async fn test_rotates_then_succeeds() {
        let pool = pool_of(2);
        let mut seen = Vec::new();

        let result = with_rotation(&pool, &RotationPolicy::default(), "test", |cred| {
            seen.push(cred.id.clone());
            let first = seen.len() == 1;
            async move {
                if first {
                    Err(ProviderError::RateLimited {
                        retry_after_ms: None,
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert_eq!(pool.active_count(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_masked() {
        let pool = pool_of(2);
        let mut calls = 0;

        let result: Result<()> = with_rotation(&pool, &RotationPolicy::default(), "test", |_| {
            calls += 1;
            async { Err(ProviderError::Timeout("60s".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::TransientNetworkFailure(_))));
        assert_eq!(calls, 1);
        assert_eq!(pool.active_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = pool_of(0);
        let result: Result<()> =
            with_rotation(&pool, &RotationPolicy::default(), "test", |_| async {
                Ok::<(), ProviderError>(())
            })
            .await;
        assert!(matches!(result, Err(Error::NoCredentialsAvailable)));
    }
}
