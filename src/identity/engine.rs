//! Identity engine
//!
//! Wires the resolver, synchronizer, matcher and batch driver around one
//! store gateway and exposes the operations callers use.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{AuthOutcome, AuthenticationMatcher, CredentialHasher};
use crate::db::SharedGateway;
use crate::identity::batch::{BatchDriver, Reconciled, ResyncReport, RetryPolicy};
use crate::identity::conflict::ConflictResolver;
use crate::identity::resolver::{IdentityResolver, Resolution};
use crate::identity::sync::{CredentialSynchronizer, SyncOutcome};
use crate::logging::{ConflictSink, TracingConflictSink};
use crate::types::{Account, AccountId, IdentityError, ProfileId, Result, Role, StudentProfile};

/// Account as shown to operators; the credential hash is left out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: AccountId,
    pub handle: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_profile_id: Option<ProfileId>,
}

/// Which identifier a login check used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginIdentifier {
    FullName,
    Email,
}

/// A profile that could not log in with its external id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCheckFailure {
    pub profile_id: ProfileId,
    pub identifier_kind: LoginIdentifier,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCheckReport {
    /// Profiles with an external id
    pub profiles: usize,
    pub attempts: usize,
    pub passed: usize,
    pub failures: Vec<LoginCheckFailure>,
}

pub struct IdentityEngine {
    store: SharedGateway,
    hasher: Arc<dyn CredentialHasher>,
    sink: Arc<dyn ConflictSink>,
    policy: RetryPolicy,
    sync: Arc<CredentialSynchronizer>,
    resolver: Arc<IdentityResolver>,
    matcher: Arc<AuthenticationMatcher>,
    driver: BatchDriver,
}

impl IdentityEngine {
    /// Engine with the tracing conflict sink and the default retry policy
    pub fn new(store: SharedGateway, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self::assemble(
            store,
            hasher,
            Arc::new(TracingConflictSink),
            RetryPolicy::default(),
        )
    }

    pub fn with_conflict_sink(self, sink: Arc<dyn ConflictSink>) -> Self {
        Self::assemble(self.store, self.hasher, sink, self.policy)
    }

    pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
        Self::assemble(self.store, self.hasher, self.sink, policy)
    }

    fn assemble(
        store: SharedGateway,
        hasher: Arc<dyn CredentialHasher>,
        sink: Arc<dyn ConflictSink>,
        policy: RetryPolicy,
    ) -> Self {
        let sync = Arc::new(CredentialSynchronizer::new(store.clone(), hasher.clone()));
        let conflicts = ConflictResolver::new(store.clone(), sync.clone(), sink.clone());
        let resolver = Arc::new(IdentityResolver::new(store.clone(), sync.clone(), conflicts));
        let matcher = Arc::new(AuthenticationMatcher::new(store.clone(), hasher.clone()));
        let driver = BatchDriver::new(store.clone(), resolver.clone(), sync.clone(), policy.clone());

        Self {
            store,
            hasher,
            sink,
            policy,
            sync,
            resolver,
            matcher,
            driver,
        }
    }

    /// Shared matcher, for composing a [`crate::auth::LoginService`]
    pub fn matcher(&self) -> Arc<AuthenticationMatcher> {
        self.matcher.clone()
    }

    async fn load_profile(&self, profile_id: &ProfileId) -> Result<StudentProfile> {
        self.store
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("profile {}", profile_id)))
    }

    /// Find or create the account for one profile
    pub async fn resolve(&self, profile_id: &ProfileId) -> Result<Resolution> {
        let profile = self.load_profile(profile_id).await?;
        self.resolver.resolve(&profile).await
    }

    /// Refresh the linked account from the profile. `None` when the profile
    /// is not linked to anything.
    pub async fn synchronize_credentials(&self, profile_id: &ProfileId) -> Result<Option<SyncOutcome>> {
        let profile = self.load_profile(profile_id).await?;
        let Some(account_id) = profile.linked_account_id.clone() else {
            debug!(profile_id = %profile_id, "Profile not linked, nothing to synchronize");
            return Ok(None);
        };

        let account = self
            .store
            .get_account(&account_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("account {}", account_id)))?;

        self.sync.synchronize(&profile, &account).await.map(Some)
    }

    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<AuthOutcome> {
        self.matcher.authenticate(identifier, secret).await
    }

    /// Reconcile every profile, one at a time
    pub async fn run_full_resync(&self) -> Result<ResyncReport> {
        self.driver.run().await
    }

    /// Hook for profile create and update: resolve, then refresh an existing link
    pub async fn on_profile_saved(&self, profile_id: &ProfileId) -> Result<Reconciled> {
        let reconciled = self.driver.reconcile(profile_id).await?;
        info!(
            profile_id = %profile_id,
            action = ?reconciled.resolution.action,
            "Profile saved, identity reconciled"
        );
        Ok(reconciled)
    }

    /// Try logging every profile in by full name and by email with its
    /// external id, reporting the ones that fail
    pub async fn verify_logins(&self) -> Result<LoginCheckReport> {
        let mut report = LoginCheckReport::default();

        for profile in self.store.list_profiles().await? {
            let Some(secret) = profile.login_secret() else {
                continue;
            };
            report.profiles += 1;

            let checks = [
                (LoginIdentifier::FullName, profile.full_name()),
                (LoginIdentifier::Email, profile.email.trim().to_string()),
            ];
            for (kind, identifier) in checks {
                if identifier.is_empty() {
                    continue;
                }
                report.attempts += 1;
                if self.matcher.authenticate(&identifier, secret).await?.is_authenticated() {
                    report.passed += 1;
                } else {
                    warn!(profile_id = %profile.id, identifier_kind = ?kind, "Login check failed");
                    report.failures.push(LoginCheckFailure {
                        profile_id: profile.id.clone(),
                        identifier_kind: kind,
                        identifier,
                    });
                }
            }
        }

        info!(
            profiles = report.profiles,
            attempts = report.attempts,
            failures = report.failures.len(),
            "Login check complete"
        );
        Ok(report)
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        let accounts = self.store.list_accounts().await?;
        let mut summaries = Vec::with_capacity(accounts.len());
        for account in accounts {
            let linked_profile_id = self
                .store
                .find_profile_by_account(&account.id)
                .await?
                .map(|p| p.id);
            summaries.push(summarize(account, linked_profile_id));
        }
        Ok(summaries)
    }
}

fn summarize(account: Account, linked_profile_id: Option<ProfileId>) -> AccountSummary {
    AccountSummary {
        id: account.id,
        handle: account.handle,
        email: account.email,
        role: account.role,
        linked_profile_id,
    }
}
