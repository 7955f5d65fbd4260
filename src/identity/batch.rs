//! Batch reconciliation driver
//!
//! Walks every profile through resolve + synchronize, one profile at a time.
//! Running two resolutions concurrently could let two profiles that share an
//! email both see "no match" and create duplicate accounts, so the loop never
//! has more than one profile in flight.
//!
//! A failing profile is retried only for retryable store errors, then tallied;
//! the run always continues with the next profile.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::db::SharedGateway;
use crate::identity::conflict::ConflictRecord;
use crate::identity::resolver::{IdentityResolver, Resolution, ResolutionAction};
use crate::identity::sync::{CredentialSynchronizer, SyncOutcome};
use crate::types::{IdentityError, ProfileId, Result};

/// Per-profile retry policy for retryable store failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Multiplied by the attempt number before each retry
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `attempt`, saturating instead of overflowing
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.checked_mul(attempt).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Outcome of reconciling one profile
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub resolution: Resolution,
    /// Present when the driver refreshed an already-linked account
    pub sync: Option<SyncOutcome>,
}

/// A profile the run gave up on
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFailure {
    pub profile_id: ProfileId,
    pub code: String,
    pub message: String,
    pub attempts: u32,
}

/// Summary of a full resync
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncReport {
    pub processed: usize,
    /// Account rows inserted
    pub created: usize,
    pub linked_existing: usize,
    pub already_linked: usize,
    pub skipped: usize,
    pub retries: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub failures: Vec<ProfileFailure>,
    pub duration_ms: u64,
}

impl ResyncReport {
    fn tally(&mut self, reconciled: Reconciled) {
        let resolution = reconciled.resolution;
        if resolution.created() {
            self.created += 1;
        }
        match resolution.action {
            ResolutionAction::AlreadyLinked => self.already_linked += 1,
            ResolutionAction::LinkedExisting => self.linked_existing += 1,
            ResolutionAction::Skipped => self.skipped += 1,
            ResolutionAction::Created | ResolutionAction::Aliased => {}
        }
        if let Some(conflict) = resolution.conflict {
            self.conflicts.push(conflict);
        }
    }
}

pub struct BatchDriver {
    store: SharedGateway,
    resolver: Arc<IdentityResolver>,
    sync: Arc<CredentialSynchronizer>,
    policy: RetryPolicy,
}

impl BatchDriver {
    pub fn new(
        store: SharedGateway,
        resolver: Arc<IdentityResolver>,
        sync: Arc<CredentialSynchronizer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            resolver,
            sync,
            policy,
        }
    }

    /// Re-read one profile, resolve it, and refresh its account when the
    /// resolver found an existing link
    pub async fn reconcile(&self, profile_id: &ProfileId) -> Result<Reconciled> {
        let profile = self
            .store
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("profile {}", profile_id)))?;

        let resolution = self.resolver.resolve(&profile).await?;

        let sync = match (&resolution.action, &resolution.account_id) {
            (ResolutionAction::AlreadyLinked, Some(account_id)) => {
                let account = self
                    .store
                    .get_account(account_id)
                    .await?
                    .ok_or_else(|| IdentityError::NotFound(format!("account {}", account_id)))?;
                Some(self.sync.synchronize(&profile, &account).await?)
            }
            _ => None,
        };

        Ok(Reconciled { resolution, sync })
    }

    /// Reconcile with retries. Returns the last error and the attempt count
    /// on failure.
    async fn reconcile_with_retry(
        &self,
        profile_id: &ProfileId,
    ) -> (std::result::Result<Reconciled, IdentityError>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.reconcile(profile_id).await {
                Ok(r) => return (Ok(r), attempt),
                Err(e) if e.is_retryable() && attempt <= self.policy.max_retries => {
                    warn!(
                        profile_id = %profile_id,
                        attempt,
                        "Retryable failure, backing off: {}",
                        e
                    );
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    /// Reconcile every profile sequentially
    pub async fn run(&self) -> Result<ResyncReport> {
        let started = Instant::now();
        // Ids only: a profile that cannot be read fails on its own below
        let profile_ids = self.store.list_profile_ids().await?;
        info!("Resync started for {} profile(s)", profile_ids.len());

        let mut report = ResyncReport::default();
        for profile_id in profile_ids {
            report.processed += 1;
            let (result, attempts) = self.reconcile_with_retry(&profile_id).await;
            report.retries += attempts.saturating_sub(1) as usize;

            match result {
                Ok(reconciled) => {
                    debug!(
                        profile_id = %profile_id,
                        action = ?reconciled.resolution.action,
                        "Profile reconciled"
                    );
                    report.tally(reconciled);
                }
                Err(e) => {
                    error!(profile_id = %profile_id, attempts, "Profile reconciliation failed: {}", e);
                    report.failures.push(ProfileFailure {
                        profile_id,
                        code: e.code().to_string(),
                        message: e.to_string(),
                        attempts,
                    });
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = report.processed,
            created = report.created,
            linked_existing = report.linked_existing,
            already_linked = report.already_linked,
            skipped = report.skipped,
            conflicts = report.conflicts.len(),
            failures = report.failures.len(),
            "Resync complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Argon2Hasher, CredentialHasher};
    use crate::db::{MemoryGateway, StoreGateway, StoreResult};
    use crate::identity::conflict::ConflictResolver;
    use crate::logging::CollectingConflictSink;
    use crate::types::{
        Account, AccountId, AccountUpdate, NewAccount, ProfileLogin, Role, StoreError,
        StudentProfile,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to a memory store, but the first `flaky` profile reads for
    /// `target` fail as unavailable
    struct FlakyProfileReads {
        inner: Arc<MemoryGateway>,
        target: ProfileId,
        flaky: AtomicUsize,
        terminal: bool,
    }

    #[async_trait]
    impl StoreGateway for FlakyProfileReads {
        async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
            self.inner.get_account(id).await
        }
        async fn find_accounts_by_email(&self, email: &str) -> StoreResult<Vec<Account>> {
            self.inner.find_accounts_by_email(email).await
        }
        async fn find_account_by_login(&self, identifier: &str) -> StoreResult<Option<Account>> {
            self.inner.find_account_by_login(identifier).await
        }
        async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
            self.inner.insert_account(account).await
        }
        async fn update_account(&self, id: &AccountId, update: AccountUpdate) -> StoreResult<bool> {
            self.inner.update_account(id, update).await
        }
        async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
            self.inner.list_accounts().await
        }
        async fn get_profile(&self, id: &ProfileId) -> StoreResult<Option<StudentProfile>> {
            if id == &self.target {
                let left = self.flaky.load(Ordering::SeqCst);
                if left > 0 {
                    self.flaky.store(left - 1, Ordering::SeqCst);
                    return Err(if self.terminal {
                        StoreError::Constraint("rejected".into())
                    } else {
                        StoreError::Unavailable("flaky".into())
                    });
                }
            }
            self.inner.get_profile(id).await
        }
        async fn list_profiles(&self) -> StoreResult<Vec<StudentProfile>> {
            self.inner.list_profiles().await
        }
        async fn find_profile_by_account(
            &self,
            account_id: &AccountId,
        ) -> StoreResult<Option<StudentProfile>> {
            self.inner.find_profile_by_account(account_id).await
        }
        async fn find_profile_login(&self, identifier: &str) -> StoreResult<Option<ProfileLogin>> {
            self.inner.find_profile_login(identifier).await
        }
        async fn set_profile_link(
            &self,
            id: &ProfileId,
            account_id: &AccountId,
        ) -> StoreResult<bool> {
            self.inner.set_profile_link(id, account_id).await
        }
    }

    fn profile(first: &str, email: &str, external_id: &str) -> StudentProfile {
        StudentProfile {
            id: ProfileId::from(""),
            external_id: external_id.to_string(),
            first_name: first.to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
            linked_account_id: None,
            status: "active".to_string(),
        }
    }

    fn driver(store: SharedGateway, max_retries: u32) -> BatchDriver {
        let hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2Hasher::with_params(64, 1).unwrap());
        let sync = Arc::new(CredentialSynchronizer::new(store.clone(), hasher));
        let conflicts = ConflictResolver::new(
            store.clone(),
            sync.clone(),
            Arc::new(CollectingConflictSink::default()),
        );
        let resolver = Arc::new(IdentityResolver::new(store.clone(), sync.clone(), conflicts));
        BatchDriver::new(
            store,
            resolver,
            sync,
            RetryPolicy {
                max_retries,
                backoff: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn test_run_tallies_each_action() {
        let store = Arc::new(MemoryGateway::new());
        store.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        store.seed_profile(profile("Bea", "a@b.com", "S2")).await;
        store.seed_profile(profile("Cal", "cal@b.com", "")).await;
        let driver = driver(store.clone(), 0);

        let first = driver.run().await.unwrap();
        assert_eq!(first.processed, 3);
        assert_eq!(first.created, 2);
        assert_eq!(first.skipped, 1);
        assert_eq!(first.conflicts.len(), 1);
        assert!(first.failures.is_empty());

        let second = driver.run().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.already_linked, 2);
        assert!(second.conflicts.is_empty());
        assert_eq!(store.account_inserts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_is_retried() {
        let memory = Arc::new(MemoryGateway::new());
        let p = memory.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        let store = Arc::new(FlakyProfileReads {
            inner: memory.clone(),
            target: p.id.clone(),
            flaky: AtomicUsize::new(2),
            terminal: false,
        });

        let report = driver(store, 2).run().await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.retries, 2);
        assert!(report.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_tallied_and_run_continues() {
        let memory = Arc::new(MemoryGateway::new());
        let ann = memory.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        memory.seed_profile(profile("Bea", "bea@b.com", "S2")).await;
        let store = Arc::new(FlakyProfileReads {
            inner: memory.clone(),
            target: ann.id.clone(),
            flaky: AtomicUsize::new(5),
            terminal: false,
        });

        let report = driver(store, 1).run().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.profile_id, ann.id);
        assert_eq!(failure.code, "STORE_UNAVAILABLE");
        assert_eq!(failure.attempts, 2);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let memory = Arc::new(MemoryGateway::new());
        let ann = memory.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        let store = Arc::new(FlakyProfileReads {
            inner: memory.clone(),
            target: ann.id.clone(),
            flaky: AtomicUsize::new(1),
            terminal: true,
        });

        let report = driver(store, 3).run().await.unwrap();
        assert_eq!(report.retries, 0);
        assert_eq!(report.failures[0].attempts, 1);
        assert_eq!(memory.account_inserts(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_profile_is_tallied_and_run_continues() {
        let store = Arc::new(MemoryGateway::new());
        let bad = store.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        store.seed_profile(profile("Bea", "bea@b.com", "S2")).await;
        store.corrupt_profile(&bad.id).await;

        let report = driver(store.clone(), 2).run().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].profile_id, bad.id);
        assert_eq!(report.failures[0].code, "INTERNAL_ERROR");
        assert_eq!(report.failures[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_unreadable_email_match_blocks_account_creation() {
        let store = Arc::new(MemoryGateway::new());
        let existing = store
            .seed_account(NewAccount {
                handle: "registered".to_string(),
                email: "a@b.com".to_string(),
                credential_hash: "hash".to_string(),
                role: Role::Student,
            })
            .await;
        store.corrupt_account(&existing.id).await;
        let ann = store.seed_profile(profile("Ann", "a@b.com", "S1")).await;

        let report = driver(store.clone(), 0).run().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].profile_id, ann.id);
        assert_eq!(store.account_inserts(), 0);
        assert!(store.get_profile(&ann.id).await.unwrap().unwrap().linked_account_id.is_none());
    }

    #[test]
    fn test_retry_delay_grows_linearly_and_saturates() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(200),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(600));

        let huge = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(u64::MAX),
        };
        assert_eq!(huge.delay(2), Duration::MAX);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_run() {
        let store = Arc::new(MemoryGateway::new());
        store.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        store.fail_next(1);

        assert!(driver(store, 3).run().await.is_err());
    }
}
