//! Conflict resolver
//!
//! When a profile's email already belongs to an account it may not take
//! over, the profile gets its own account under an alias email. The colliding
//! account is never written to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::SharedGateway;
use crate::identity::alias::alias_candidates;
use crate::identity::sync::CredentialSynchronizer;
use crate::logging::ConflictSink;
use crate::types::{
    Account, AccountId, IdentityError, NewAccount, ProfileId, Result, Role, StudentProfile,
};

/// Why the profile could not take the account holding its email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictReason {
    /// Account is linked to a different profile
    EmailInUse,
    /// Account is unlinked but belongs to an admin or warden
    EmailHeldByStaff,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailInUse => "email-in-use",
            Self::EmailHeldByStaff => "email-held-by-staff",
        }
    }
}

/// Audit record emitted for every resolved collision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub profile_id: ProfileId,
    pub reason: ConflictReason,
    pub existing_account_id: AccountId,
    pub new_account_id: AccountId,
    pub alias_email: String,
    /// True when an unlinked account already holding the alias was taken
    /// over instead of creating a new one
    pub adopted: bool,
    pub recorded_at: DateTime<Utc>,
}

pub struct ConflictResolver {
    store: SharedGateway,
    sync: Arc<CredentialSynchronizer>,
    sink: Arc<dyn ConflictSink>,
}

impl ConflictResolver {
    pub fn new(
        store: SharedGateway,
        sync: Arc<CredentialSynchronizer>,
        sink: Arc<dyn ConflictSink>,
    ) -> Self {
        Self { store, sync, sink }
    }

    /// Give `profile` an account under the first free alias and link it.
    ///
    /// An alias already held by an unlinked student account (left behind by
    /// an interrupted earlier run) is adopted rather than duplicated. An alias
    /// held by anything else moves on to the next candidate.
    pub async fn resolve_conflict(
        &self,
        profile: &StudentProfile,
        colliding: &Account,
        reason: ConflictReason,
    ) -> Result<ConflictRecord> {
        for alias in alias_candidates(profile) {
            let holders = self.store.find_accounts_by_email(&alias).await?;

            if holders.is_empty() {
                let account = self.create_alias_account(profile, &alias).await?;
                self.link(profile, &account.id).await?;
                return Ok(self.emit(profile, colliding, reason, account.id, alias, false));
            }

            for holder in holders {
                if holder.role != Role::Student {
                    continue;
                }
                if self.store.find_profile_by_account(&holder.id).await?.is_some() {
                    continue;
                }
                self.link(profile, &holder.id).await?;
                self.sync.synchronize(profile, &holder).await?;
                return Ok(self.emit(profile, colliding, reason, holder.id, alias, true));
            }
        }

        Err(IdentityError::ConstraintViolation(format!(
            "every alias for profile {} is taken",
            profile.id
        )))
    }

    async fn create_alias_account(&self, profile: &StudentProfile, alias: &str) -> Result<Account> {
        let credential_hash = match self.sync.credential_for(profile)? {
            Some(hash) => hash,
            None => self.sync.locked_credential()?,
        };

        let account = self
            .store
            .insert_account(NewAccount {
                handle: profile.full_name(),
                email: alias.to_string(),
                credential_hash,
                role: Role::Student,
            })
            .await?;

        info!(
            profile_id = %profile.id,
            account_id = %account.id,
            alias = %alias,
            "Created alias account"
        );
        Ok(account)
    }

    async fn link(&self, profile: &StudentProfile, account_id: &AccountId) -> Result<()> {
        if self.store.set_profile_link(&profile.id, account_id).await? {
            Ok(())
        } else {
            Err(IdentityError::NotFound(format!("profile {}", profile.id)))
        }
    }

    fn emit(
        &self,
        profile: &StudentProfile,
        colliding: &Account,
        reason: ConflictReason,
        new_account_id: AccountId,
        alias_email: String,
        adopted: bool,
    ) -> ConflictRecord {
        let record = ConflictRecord {
            profile_id: profile.id.clone(),
            reason,
            existing_account_id: colliding.id.clone(),
            new_account_id,
            alias_email,
            adopted,
            recorded_at: Utc::now(),
        };
        self.sink.record(&record);
        record
    }
}
