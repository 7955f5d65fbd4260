//! Store gateway seam
//!
//! Every component receives the gateway explicitly. Implementations re-read
//! storage on every call; nothing here caches identity state.

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{
    Account, AccountId, AccountUpdate, NewAccount, ProfileId, ProfileLogin, StoreError,
    StudentProfile,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lookups and writes on accounts and student profiles
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Account by id
    async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>>;

    /// Accounts whose email equals `email` ignoring ASCII case, oldest first
    async fn find_accounts_by_email(&self, email: &str) -> StoreResult<Vec<Account>>;

    /// Account whose handle equals `identifier` exactly, or whose email equals
    /// it ignoring ASCII case
    async fn find_account_by_login(&self, identifier: &str) -> StoreResult<Option<Account>>;

    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account>;

    /// Returns false when no account has this id
    async fn update_account(&self, id: &AccountId, update: AccountUpdate) -> StoreResult<bool>;

    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    async fn get_profile(&self, id: &ProfileId) -> StoreResult<Option<StudentProfile>>;

    /// All profiles in a stable order
    async fn list_profiles(&self) -> StoreResult<Vec<StudentProfile>>;

    /// Ids of all profiles in the same order as [`StoreGateway::list_profiles`].
    /// Backends that can list ids without decoding whole records should
    /// override this, so one unreadable profile does not hide the rest.
    async fn list_profile_ids(&self) -> StoreResult<Vec<ProfileId>> {
        Ok(self
            .list_profiles()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect())
    }

    /// Profile currently linked to `account_id`
    async fn find_profile_by_account(
        &self,
        account_id: &AccountId,
    ) -> StoreResult<Option<StudentProfile>>;

    /// Linked profile whose trimmed full name or email equals the trimmed
    /// identifier, ignoring ASCII case
    async fn find_profile_login(&self, identifier: &str) -> StoreResult<Option<ProfileLogin>>;

    /// Point the profile at `account_id`. Returns false when no profile has this id
    async fn set_profile_link(&self, id: &ProfileId, account_id: &AccountId)
        -> StoreResult<bool>;
}

pub type SharedGateway = Arc<dyn StoreGateway>;

/// Trimmed, ASCII-lowercased comparison key used by every case-insensitive
/// lookup. Non-ASCII letters keep their case, as with MongoDB's `$toLower`.
pub fn match_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
