//! Credential pool with least-recently-used rotation
//!
//! ## 구조
//!
//! ```text
//! acquire()
//!   ├─ lock(snapshot) ── select_least_recently_used ── lease (stamp + version) ── unlock
//!   └─ store.compare_and_swap ──┬─ ok   → Credential
//!                               └─ lost → reload snapshot, select again
//! ```
//!
//! The in-memory critical section never performs I/O; the store's
//! compare-and-swap is the final arbiter between concurrent acquirers,
//! including acquirers in other processes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vibe_foundation::{
    Credential, CredentialId, CredentialStatus, CredentialStore, Error, Result, SecretString,
};

/// How many lost compare-and-swap races a single call tolerates
const MAX_CAS_ATTEMPTS: usize = 8;

/// Transition log capacity
const MAX_TRANSITIONS: usize = 256;

// ============================================================================
// Pure selection
// ============================================================================

/// Index of the Active credential with the oldest `last_used_at`.
///
/// Never-used credentials come first; ties are broken by id.
pub fn select_least_recently_used(credentials: &[Credential]) -> Option<usize> {
    credentials
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_active())
        // Option ordering puts None before Some
        .min_by(|(_, a), (_, b)| {
            a.last_used_at
                .cmp(&b.last_used_at)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(idx, _)| idx)
}

// ============================================================================
// Transition log
// ============================================================================

/// What happened to a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Selected by `acquire`
    Leased,
    /// Successful model call recorded
    Used,
    /// Active → Exhausted
    Exhausted,
    /// New credential added
    Donated,
    /// Exhausted → Active through re-donation
    Reactivated,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Leased => "leased",
            Self::Used => "used",
            Self::Exhausted => "exhausted",
            Self::Donated => "donated",
            Self::Reactivated => "reactivated",
        };
        f.write_str(s)
    }
}

/// An entry of the pool's state-transition log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTransition {
    pub credential_id: CredentialId,
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
}

struct PoolState {
    credentials: Vec<Credential>,
    transitions: VecDeque<PoolTransition>,
}

impl PoolState {
    fn record(&mut self, credential_id: &CredentialId, kind: TransitionKind) {
        if self.transitions.len() >= MAX_TRANSITIONS {
            self.transitions.pop_front();
        }
        self.transitions.push_back(PoolTransition {
            credential_id: credential_id.clone(),
            kind,
            at: Utc::now(),
        });
    }

    fn position(&self, id: &CredentialId) -> Option<usize> {
        self.credentials.iter().position(|c| &c.id == id)
    }
}

// ============================================================================
// CredentialPool
// ============================================================================

/// Rotating set of model API credentials shared by every session.
pub struct CredentialPool {
    store: Arc<dyn CredentialStore>,
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Snapshot the store into a new pool
    pub fn load(store: Arc<dyn CredentialStore>) -> Result<Self> {
        let credentials = store.list_credentials()?;
        debug!("Loaded credential pool with {} entries", credentials.len());

        Ok(Self {
            store,
            state: Mutex::new(PoolState {
                credentials,
                transitions: VecDeque::new(),
            }),
        })
    }

    /// Replace the in-memory snapshot with the store's current contents
    pub fn reload(&self) -> Result<()> {
        let credentials = self.store.list_credentials()?;
        self.state.lock().credentials = credentials;
        Ok(())
    }

    /// Lease the least-recently-used Active credential.
    ///
    /// The lease stamps `last_used_at` so a concurrent caller picks the
    /// next-oldest credential instead.
    pub fn acquire(&self) -> Result<Credential> {
        let mut reloaded = false;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let lease = {
                let mut state = self.state.lock();
                match select_least_recently_used(&state.credentials) {
                    Some(idx) => {
                        let credential = &mut state.credentials[idx];
                        let expected = credential.version;
                        credential.last_used_at = Some(Utc::now());
                        credential.version += 1;
                        let leased = credential.clone();
                        state.record(&leased.id, TransitionKind::Leased);
                        Some((leased, expected))
                    }
                    None => None,
                }
            };

            let Some((leased, expected)) = lease else {
                // Donations from other processes only show up after a reload
                if reloaded {
                    return Err(Error::NoCredentialsAvailable);
                }
                self.reload()?;
                reloaded = true;
                continue;
            };

            if self.store.compare_and_swap(&leased, expected)? {
                debug!("Leased credential {}", leased.id.short());
                return Ok(leased);
            }

            debug!(
                "Lost lease race on credential {}, reloading",
                leased.id.short()
            );
            self.reload()?;
        }

        Err(Error::Storage(
            "Credential lease kept losing compare-and-swap".to_string(),
        ))
    }

    /// Record a successful use of `id` at `at`
    pub fn record_use(&self, id: &CredentialId, at: DateTime<Utc>) -> Result<Credential> {
        self.transition(id, TransitionKind::Used, |credential| {
            credential.last_used_at = Some(at);
            true
        })
    }

    /// Active → Exhausted. Idempotent: an already exhausted credential is
    /// returned unchanged without a store write.
    pub fn mark_exhausted(&self, id: &CredentialId) -> Result<Credential> {
        let credential = self.transition(id, TransitionKind::Exhausted, |credential| {
            if credential.status == CredentialStatus::Exhausted {
                return false;
            }
            credential.status = CredentialStatus::Exhausted;
            true
        })?;
        warn!("Credential {} marked exhausted", credential.id.short());
        Ok(credential)
    }

    /// Add a credential, or reactivate it when the secret is already known
    pub fn donate(&self, secret: impl Into<SecretString>) -> Result<Credential> {
        let secret = secret.into();
        if secret.is_blank() {
            return Err(Error::InvalidInput("Credential secret is empty".to_string()));
        }

        if let Some(existing) = self.store.find_by_secret(&secret)? {
            self.reload()?;
            return self.reset(&existing.id);
        }

        let credential = Credential::new(secret);
        self.store.insert_credential(&credential)?;

        let mut state = self.state.lock();
        state.credentials.push(credential.clone());
        state.record(&credential.id, TransitionKind::Donated);
        drop(state);

        info!("Credential {} donated", credential.id.short());
        Ok(credential)
    }

    /// Exhausted → Active. The only path back to Active.
    pub fn reset(&self, id: &CredentialId) -> Result<Credential> {
        let credential = self.transition(id, TransitionKind::Reactivated, |credential| {
            if credential.status == CredentialStatus::Active {
                return false;
            }
            credential.status = CredentialStatus::Active;
            true
        })?;
        info!("Credential {} is active", credential.id.short());
        Ok(credential)
    }

    /// Current in-memory view of every credential
    pub fn snapshot(&self) -> Vec<Credential> {
        self.state.lock().credentials.clone()
    }

    /// Recent state transitions, oldest first
    pub fn transitions(&self) -> Vec<PoolTransition> {
        self.state.lock().transitions.iter().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.state
            .lock()
            .credentials
            .iter()
            .filter(|c| c.is_active())
            .count()
    }

    /// Apply `change` to credential `id` and persist it with CAS.
    ///
    /// `change` returns `false` when there is nothing to write.
    fn transition<F>(&self, id: &CredentialId, kind: TransitionKind, change: F) -> Result<Credential>
    where
        F: Fn(&mut Credential) -> bool,
    {
        let mut reloaded = false;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let pending = {
                let mut state = self.state.lock();
                match state.position(id) {
                    Some(idx) => {
                        let credential = &mut state.credentials[idx];
                        let expected = credential.version;
                        let mut updated = credential.clone();
                        if change(&mut updated) {
                            updated.version += 1;
                            *credential = updated.clone();
                            state.record(id, kind);
                            Some(Ok((updated, expected)))
                        } else {
                            Some(Err(updated))
                        }
                    }
                    None => None,
                }
            };

            let (updated, expected) = match pending {
                Some(Ok(pending)) => pending,
                Some(Err(unchanged)) => return Ok(unchanged),
                None if reloaded => {
                    return Err(Error::NotFound(format!("Credential {}", id)));
                }
                None => {
                    self.reload()?;
                    reloaded = true;
                    continue;
                }
            };

            if self.store.compare_and_swap(&updated, expected)? {
                return Ok(updated);
            }

            debug!("Lost {} race on credential {}, reloading", kind, id.short());
            self.reload()?;
        }

        Err(Error::Storage(format!(
            "Credential {} update kept losing compare-and-swap",
            id.short()
        )))
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CredentialPool")
            .field("credentials", &state.credentials)
            .field("transitions", &state.transitions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vibe_foundation::Storage;

    fn pool_with(credentials: &[Credential]) -> (Arc<Storage>, CredentialPool) {
        let storage = Arc::new(Storage::in_memory().expect("storage"));
        for c in credentials {
            storage.insert_credential(c).expect("insert");
        }
        let pool = CredentialPool::load(storage.clone()).expect("pool");
        (storage, pool)
    }

    #[test]
    fn test_select_prefers_never_used_then_oldest() {
        let now = Utc::now();
        let creds = vec![
            Credential::new("k-recent-0000").with_id("a").with_last_used(now),
            Credential::new("k-old-0000000")
                .with_id("b")
                .with_last_used(now - Duration::minutes(5)),
            Credential::new("k-never-00000").with_id("c"),
        ];
        assert_eq!(select_least_recently_used(&creds), Some(2));
        assert_eq!(select_least_recently_used(&creds[..2]), Some(1));
    }

    #[test]
    fn test_select_skips_exhausted_and_breaks_ties_by_id() {
        let creds = vec![
            Credential::new("k-z-000000000").with_id("z"),
            Credential::new("k-a-000000000").with_id("a").exhausted(),
            Credential::new("k-m-000000000").with_id("m"),
        ];
        assert_eq!(select_least_recently_used(&creds), Some(2));

        let all_exhausted = vec![Credential::new("k-x-000000000").exhausted()];
        assert_eq!(select_least_recently_used(&all_exhausted), None);
        assert_eq!(select_least_recently_used(&[]), None);
    }

    #[test]
    fn test_consecutive_acquires_rotate() {
        let now = Utc::now();
        let older = Credential::new("k-older-00000").with_last_used(now - Duration::hours(2));
        let newer = Credential::new("k-newer-00000").with_last_used(now - Duration::hours(1));
        let (_storage, pool) = pool_with(&[newer.clone(), older.clone()]);

        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(first.id, older.id);
        assert_eq!(second.id, newer.id);

        // Round-robin continues
        assert_eq!(pool.acquire().unwrap().id, older.id);
    }

    #[test]
    fn test_concurrent_acquires_get_different_credentials() {
        let now = Utc::now();
        let a = Credential::new("k-a-000000000").with_last_used(now - Duration::hours(2));
        let b = Credential::new("k-b-000000000").with_last_used(now - Duration::hours(1));
        let (_storage, pool) = pool_with(&[a.clone(), b.clone()]);

        let (x, y) = std::thread::scope(|s| {
            let h1 = s.spawn(|| pool.acquire().unwrap());
            let h2 = s.spawn(|| pool.acquire().unwrap());
            (h1.join().unwrap(), h2.join().unwrap())
        });

        assert_ne!(x.id, y.id);
        let mut got = vec![x.id, y.id];
        got.sort();
        let mut want = vec![a.id, b.id];
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn test_lease_is_persisted() {
        let cred = Credential::new("k-persist-000");
        let (storage, pool) = pool_with(&[cred.clone()]);

        let leased = pool.acquire().unwrap();
        let stored = storage.get_credential(&cred.id).unwrap().unwrap();
        assert_eq!(stored.version, leased.version);
        assert!(stored.last_used_at.is_some());
    }

    #[test]
    fn test_stale_snapshot_loses_race_and_recovers() {
        let a = Credential::new("k-a-000000000");
        let b = Credential::new("k-b-000000000");
        let (storage, first) = pool_with(&[a, b]);
        let second = CredentialPool::load(storage.clone()).unwrap();

        let x = first.acquire().unwrap();
        // `second` still believes x is untouched; its CAS must fail and retry
        let y = second.acquire().unwrap();
        assert_ne!(x.id, y.id);
    }

    #[test]
    fn test_empty_pool_has_no_credentials() {
        let (_storage, pool) = pool_with(&[]);
        assert!(matches!(pool.acquire(), Err(Error::NoCredentialsAvailable)));

        let (_storage, pool) = pool_with(&[Credential::new("k-x-000000000").exhausted()]);
        assert!(matches!(pool.acquire(), Err(Error::NoCredentialsAvailable)));
    }

    #[test]
    fn test_acquire_sees_donation_from_other_handle() {
        let (storage, pool) = pool_with(&[]);
        let other = CredentialPool::load(storage).unwrap();
        other.donate("AIza-donated-key").unwrap();

        assert_eq!(pool.acquire().unwrap().secret.expose(), "AIza-donated-key");
    }

    #[test]
    fn test_mark_exhausted_is_idempotent() {
        let cred = Credential::new("k-exhaust-000");
        let (storage, pool) = pool_with(&[cred.clone()]);

        let first = pool.mark_exhausted(&cred.id).unwrap();
        let second = pool.mark_exhausted(&cred.id).unwrap();
        assert_eq!(first.status, CredentialStatus::Exhausted);
        assert_eq!(first.version, second.version);
        assert_eq!(storage.get_credential(&cred.id).unwrap().unwrap().version, 1);

        let exhausted: Vec<_> = pool
            .transitions()
            .into_iter()
            .filter(|t| t.kind == TransitionKind::Exhausted)
            .collect();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_unknown_credential_not_found() {
        let (_storage, pool) = pool_with(&[]);
        let result = pool.mark_exhausted(&CredentialId::from("missing"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_record_use() {
        let cred = Credential::new("k-use-0000000");
        let (storage, pool) = pool_with(&[cred.clone()]);
        let at = Utc::now();

        pool.record_use(&cred.id, at).unwrap();
        let stored = storage.get_credential(&cred.id).unwrap().unwrap();
        assert!(stored.last_used_at.is_some());
        assert_eq!(pool.transitions().last().unwrap().kind, TransitionKind::Used);
    }

    #[test]
    fn test_donate() {
        let (_storage, pool) = pool_with(&[]);

        assert!(matches!(pool.donate("   "), Err(Error::InvalidInput(_))));

        let donated = pool.donate("AIza-fresh-key").unwrap();
        assert!(donated.is_active());
        assert_eq!(pool.snapshot().len(), 1);

        pool.mark_exhausted(&donated.id).unwrap();
        let again = pool.donate("AIza-fresh-key").unwrap();
        assert_eq!(again.id, donated.id);
        assert!(again.is_active());
        assert_eq!(pool.snapshot().len(), 1);
        assert_eq!(
            pool.transitions().last().unwrap().kind,
            TransitionKind::Reactivated
        );
    }
}
