//! Identity resolver
//!
//! Finds or creates the account a student profile should be linked to.
//! Existing links are only replaced when their account has disappeared, and an
//! account linked to one profile is never repointed at another.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::SharedGateway;
use crate::identity::conflict::{ConflictReason, ConflictRecord, ConflictResolver};
use crate::identity::sync::CredentialSynchronizer;
use crate::types::{
    Account, AccountId, IdentityError, NewAccount, ProfileId, Result, Role, StudentProfile,
};

/// What the resolver did for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Link already pointed at an existing account; nothing written
    AlreadyLinked,
    /// New account created under the profile email and linked
    Created,
    /// Unlinked account found by email and linked
    LinkedExisting,
    /// Email collided; an alias account was linked
    Aliased,
    /// No external id and no usable link; left alone
    Skipped,
}

/// Result of resolving one profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub profile_id: ProfileId,
    /// `None` only when skipped
    pub account_id: Option<AccountId>,
    pub action: ResolutionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictRecord>,
}

impl Resolution {
    fn new(profile: &StudentProfile, account_id: Option<AccountId>, action: ResolutionAction) -> Self {
        Self {
            profile_id: profile.id.clone(),
            account_id,
            action,
            conflict: None,
        }
    }

    /// Whether a new account row was inserted
    pub fn created(&self) -> bool {
        match self.action {
            ResolutionAction::Created => true,
            ResolutionAction::Aliased => self.conflict.as_ref().is_some_and(|c| !c.adopted),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.conflict.is_some()
    }
}

pub struct IdentityResolver {
    store: SharedGateway,
    sync: Arc<CredentialSynchronizer>,
    conflicts: ConflictResolver,
}

impl IdentityResolver {
    pub fn new(
        store: SharedGateway,
        sync: Arc<CredentialSynchronizer>,
        conflicts: ConflictResolver,
    ) -> Self {
        Self {
            store,
            sync,
            conflicts,
        }
    }

    /// Resolve the account for `profile`. At most one account insert and one
    /// link write happen per call.
    pub async fn resolve(&self, profile: &StudentProfile) -> Result<Resolution> {
        if let Some(linked_id) = &profile.linked_account_id {
            if self.store.get_account(linked_id).await?.is_some() {
                debug!(profile_id = %profile.id, account_id = %linked_id, "Already linked");
                return Ok(Resolution::new(
                    profile,
                    Some(linked_id.clone()),
                    ResolutionAction::AlreadyLinked,
                ));
            }
            warn!(
                profile_id = %profile.id,
                account_id = %linked_id,
                "Linked account is missing, relinking"
            );
        }

        if profile.login_secret().is_none() {
            debug!(profile_id = %profile.id, "No external id, not linking");
            return Ok(Resolution::new(profile, None, ResolutionAction::Skipped));
        }

        let matches = if profile.email.trim().is_empty() {
            Vec::new()
        } else {
            self.store.find_accounts_by_email(&profile.email).await?
        };

        if matches.is_empty() {
            return self.create_and_link(profile).await;
        }

        let mut first_collision: Option<(Account, ConflictReason)> = None;
        for candidate in matches {
            match self.store.find_profile_by_account(&candidate.id).await? {
                Some(owner) if owner.id == profile.id => {
                    return Ok(Resolution::new(
                        profile,
                        Some(candidate.id),
                        ResolutionAction::AlreadyLinked,
                    ));
                }
                Some(_) => {
                    first_collision.get_or_insert((candidate, ConflictReason::EmailInUse));
                }
                None if candidate.role == Role::Student => {
                    return self.link_existing(profile, candidate).await;
                }
                None => {
                    first_collision.get_or_insert((candidate, ConflictReason::EmailHeldByStaff));
                }
            }
        }

        let (colliding, reason) = first_collision.ok_or_else(|| {
            IdentityError::Internal("email matches vanished during resolution".into())
        })?;

        let record = self
            .conflicts
            .resolve_conflict(profile, &colliding, reason)
            .await?;
        Ok(Resolution {
            profile_id: profile.id.clone(),
            account_id: Some(record.new_account_id.clone()),
            action: ResolutionAction::Aliased,
            conflict: Some(record),
        })
    }

    async fn create_and_link(&self, profile: &StudentProfile) -> Result<Resolution> {
        let credential_hash = self
            .sync
            .credential_for(profile)?
            .ok_or_else(|| IdentityError::Internal("profile without external id".into()))?;

        let account = self
            .store
            .insert_account(NewAccount {
                handle: profile.full_name(),
                email: profile.email.clone(),
                credential_hash,
                role: Role::Student,
            })
            .await?;
        self.link(profile, &account.id).await?;

        info!(profile_id = %profile.id, account_id = %account.id, "Created account");
        Ok(Resolution::new(profile, Some(account.id), ResolutionAction::Created))
    }

    async fn link_existing(&self, profile: &StudentProfile, account: Account) -> Result<Resolution> {
        self.link(profile, &account.id).await?;
        self.sync.synchronize(profile, &account).await?;

        info!(profile_id = %profile.id, account_id = %account.id, "Linked existing account");
        Ok(Resolution::new(
            profile,
            Some(account.id),
            ResolutionAction::LinkedExisting,
        ))
    }

    async fn link(&self, profile: &StudentProfile, account_id: &AccountId) -> Result<()> {
        if self.store.set_profile_link(&profile.id, account_id).await? {
            Ok(())
        } else {
            Err(IdentityError::NotFound(format!("profile {}", profile.id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Argon2Hasher, CredentialHasher};
    use crate::db::{MemoryGateway, StoreGateway};
    use crate::logging::CollectingConflictSink;

    struct Fixture {
        store: Arc<MemoryGateway>,
        hasher: Arc<Argon2Hasher>,
        resolver: IdentityResolver,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryGateway::new());
        let hasher = Arc::new(Argon2Hasher::with_params(64, 1).unwrap());
        let sync = Arc::new(CredentialSynchronizer::new(store.clone(), hasher.clone()));
        let conflicts = ConflictResolver::new(
            store.clone(),
            sync.clone(),
            Arc::new(CollectingConflictSink::default()),
        );
        let resolver = IdentityResolver::new(store.clone(), sync, conflicts);
        Fixture {
            store,
            hasher,
            resolver,
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

    async fn account(store: &MemoryGateway, email: &str, role: Role) -> Account {
        store
            .seed_account(NewAccount {
                handle: "registered".to_string(),
                email: email.to_string(),
                credential_hash: "registered-hash".to_string(),
                role,
            })
            .await
    }

    async fn reload(store: &MemoryGateway, id: &ProfileId) -> StudentProfile {
        store.get_profile(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_creates_account_when_no_email_match() {
        let f = fixture();
        let p = f.store.seed_profile(profile("Jane", "jane@x.com", "STU01")).await;

        let res = f.resolver.resolve(&p).await.unwrap();
        assert_eq!(res.action, ResolutionAction::Created);
        assert!(res.created());
        assert!(!res.is_conflict());

        let account_id = res.account_id.unwrap();
        let account = f.store.get_account(&account_id).await.unwrap().unwrap();
        assert_eq!(account.handle, "Jane Doe");
        assert_eq!(account.email, "jane@x.com");
        assert_eq!(account.role, Role::Student);
        assert!(f.hasher.verify("STU01", &account.credential_hash).unwrap());
        assert_eq!(reload(&f.store, &p.id).await.linked_account_id, Some(account_id));
    }

    #[tokio::test]
    async fn test_existing_link_is_noop() {
        let f = fixture();
        let p = f.store.seed_profile(profile("Jane", "jane@x.com", "STU01")).await;
        let first = f.resolver.resolve(&p).await.unwrap();

        let p = reload(&f.store, &p.id).await;
        let second = f.resolver.resolve(&p).await.unwrap();
        assert_eq!(second.action, ResolutionAction::AlreadyLinked);
        assert_eq!(second.account_id, first.account_id);
        assert_eq!(f.store.account_inserts(), 1);
    }

    #[tokio::test]
    async fn test_links_unlinked_account_with_same_email() {
        let f = fixture();
        let registered = account(&f.store, "JANE@x.com", Role::Student).await;
        let p = f.store.seed_profile(profile("Jane", "jane@x.com", "STU01")).await;

        let res = f.resolver.resolve(&p).await.unwrap();
        assert_eq!(res.action, ResolutionAction::LinkedExisting);
        assert!(!res.created());
        assert_eq!(res.account_id, Some(registered.id.clone()));

        let account = f.store.get_account(&registered.id).await.unwrap().unwrap();
        assert!(f.hasher.verify("STU01", &account.credential_hash).unwrap());
        assert_eq!(account.handle, "Jane Doe");
        assert_eq!(f.store.account_inserts(), 0);
    }

    #[tokio::test]
    async fn test_collision_with_linked_account_creates_alias() {
        let f = fixture();
        let a = f.store.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        let b = f.store.seed_profile(profile("Bea", "a@b.com", "S2")).await;

        let ra = f.resolver.resolve(&a).await.unwrap();
        let rb = f.resolver.resolve(&b).await.unwrap();

        assert_eq!(ra.action, ResolutionAction::Created);
        assert_eq!(rb.action, ResolutionAction::Aliased);
        assert!(rb.created());
        let conflict = rb.conflict.unwrap();
        assert_eq!(conflict.reason, ConflictReason::EmailInUse);
        assert_eq!(conflict.existing_account_id, ra.account_id.clone().unwrap());
        assert_eq!(conflict.alias_email, "a+S2@b.com");

        // A keeps its account
        assert_eq!(reload(&f.store, &a.id).await.linked_account_id, ra.account_id);
        assert_eq!(reload(&f.store, &b.id).await.linked_account_id, rb.account_id);
        assert_ne!(ra.account_id, rb.account_id);
    }

    #[tokio::test]
    async fn test_staff_account_with_same_email_is_not_taken_over() {
        let f = fixture();
        let warden = account(&f.store, "jane@x.com", Role::Warden).await;
        let p = f.store.seed_profile(profile("Jane", "jane@x.com", "STU01")).await;

        let res = f.resolver.resolve(&p).await.unwrap();
        assert_eq!(res.action, ResolutionAction::Aliased);
        assert_eq!(res.conflict.unwrap().reason, ConflictReason::EmailHeldByStaff);

        let untouched = f.store.get_account(&warden.id).await.unwrap().unwrap();
        assert_eq!(untouched.credential_hash, "registered-hash");
    }

    #[tokio::test]
    async fn test_prefers_unlinked_match_over_collision() {
        let f = fixture();
        let a = f.store.seed_profile(profile("Ann", "a@b.com", "S1")).await;
        f.resolver.resolve(&a).await.unwrap();
        let spare = account(&f.store, "a@b.com", Role::Student).await;
        let b = f.store.seed_profile(profile("Bea", "a@b.com", "S2")).await;

        let res = f.resolver.resolve(&b).await.unwrap();
        assert_eq!(res.action, ResolutionAction::LinkedExisting);
        assert_eq!(res.account_id, Some(spare.id));
    }

    #[tokio::test]
    async fn test_deleted_link_heals() {
        let f = fixture();
        let p = f.store.seed_profile(profile("Jane", "jane@x.com", "STU01")).await;
        let first = f.resolver.resolve(&p).await.unwrap();
        f.store.delete_account(first.account_id.as_ref().unwrap()).await;

        let p = reload(&f.store, &p.id).await;
        let res = f.resolver.resolve(&p).await.unwrap();
        assert_eq!(res.action, ResolutionAction::Created);
        assert_ne!(res.account_id, first.account_id);
    }

    #[tokio::test]
    async fn test_blank_external_id_is_never_linked() {
        let f = fixture();
        account(&f.store, "jane@x.com", Role::Student).await;
        let p = f.store.seed_profile(profile("Jane", "jane@x.com", "  ")).await;

        let res = f.resolver.resolve(&p).await.unwrap();
        assert_eq!(res.action, ResolutionAction::Skipped);
        assert!(res.account_id.is_none());
        assert!(reload(&f.store, &p.id).await.linked_account_id.is_none());
        assert_eq!(f.store.account_inserts(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let f = fixture();
        let p = f.store.seed_profile(profile("Jane", "jane@x.com", "STU01")).await;
        f.store.fail_next(1);

        let err = f.resolver.resolve(&p).await.unwrap_err();
        assert!(matches!(err, IdentityError::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }
}
