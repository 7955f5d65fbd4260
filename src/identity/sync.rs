//! Credential synchronizer
//!
//! Pushes the current profile state (display name, email, login secret) onto
//! its linked account. Safe to re-run: hashes are salted, so a second run
//! writes a different digest for the same secret and both verify.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::CredentialHasher;
use crate::db::SharedGateway;
use crate::identity::alias::{alias_candidates, is_alias_of};
use crate::types::{Account, AccountId, AccountUpdate, IdentityError, Result, StudentProfile};

/// What a synchronize call wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub account_id: AccountId,
    /// Email now stored on the account
    pub email: String,
    /// False when the profile has no external id
    pub credential_written: bool,
}

pub struct CredentialSynchronizer {
    store: SharedGateway,
    hasher: Arc<dyn CredentialHasher>,
}

impl CredentialSynchronizer {
    pub fn new(store: SharedGateway, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    /// Hash of the profile's trimmed external id, `None` when it is blank
    pub fn credential_for(&self, profile: &StudentProfile) -> Result<Option<String>> {
        profile
            .login_secret()
            .map(|secret| self.hasher.hash(secret))
            .transpose()
    }

    /// Hash of a random value nobody knows. Used for accounts that must exist
    /// but have no login secret yet.
    pub fn locked_credential(&self) -> Result<String> {
        self.hasher.hash(&uuid::Uuid::new_v4().to_string())
    }

    /// Email `account` should carry for `profile`.
    ///
    /// The profile email is used unless a different account already holds it;
    /// then an alias is kept or derived. Never returns an address owned by
    /// another account when a free alias exists.
    pub async fn target_email(&self, profile: &StudentProfile, account: &Account) -> Result<String> {
        if !self.held_by_other(&profile.email, &account.id).await? {
            return Ok(profile.email.clone());
        }

        if is_alias_of(profile, &account.email)
            && !self.held_by_other(&account.email, &account.id).await?
        {
            return Ok(account.email.clone());
        }

        for candidate in alias_candidates(profile) {
            if !self.held_by_other(&candidate, &account.id).await? {
                debug!(
                    account_id = %account.id,
                    email = %profile.email,
                    alias = %candidate,
                    "Profile email held by another account, using alias"
                );
                return Ok(candidate);
            }
        }

        Err(IdentityError::ConstraintViolation(format!(
            "no free alias for {}",
            profile.email
        )))
    }

    async fn held_by_other(&self, email: &str, account_id: &AccountId) -> Result<bool> {
        if email.trim().is_empty() {
            return Ok(false);
        }
        Ok(self
            .store
            .find_accounts_by_email(email)
            .await?
            .iter()
            .any(|a| &a.id != account_id))
    }

    /// Write handle, email and (when the profile has an external id) the
    /// credential hash onto `account`
    pub async fn synchronize(
        &self,
        profile: &StudentProfile,
        account: &Account,
    ) -> Result<SyncOutcome> {
        let email = self.target_email(profile, account).await?;
        let credential_hash = self.credential_for(profile)?;
        let credential_written = credential_hash.is_some();

        let update = AccountUpdate {
            handle: Some(profile.full_name()),
            email: Some(email.clone()),
            credential_hash,
        };

        if !self.store.update_account(&account.id, update).await? {
            return Err(IdentityError::NotFound(format!("account {}", account.id)));
        }

        if credential_written {
            info!(profile_id = %profile.id, account_id = %account.id, "Synchronized credentials");
        } else {
            debug!(
                profile_id = %profile.id,
                account_id = %account.id,
                "Refreshed display fields, no external id"
            );
        }

        Ok(SyncOutcome {
            account_id: account.id.clone(),
            email,
            credential_written,
        })
    }
}
