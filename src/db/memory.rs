//! In-process store gateway
//!
//! Backs unit tests and dry runs. Storage semantics mirror the MongoDB
//! gateway: emails are not unique unless [`MemoryGateway::with_unique_emails`]
//! is used, and case-insensitive lookups fold ASCII case only.
//!
//! Faults can be injected per call count ([`MemoryGateway::fail_next`]), per
//! operation ([`MemoryGateway::fail_operation`]) or per record
//! ([`MemoryGateway::corrupt_profile`], [`MemoryGateway::corrupt_account`]).

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::db::gateway::{match_key, StoreGateway, StoreResult};
use crate::types::{
    Account, AccountId, AccountUpdate, NewAccount, ProfileId, ProfileLogin, StoreError,
    StudentProfile,
};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<u64, Account>,
    profiles: BTreeMap<u64, StudentProfile>,
    /// Records that exist but cannot be read back, like undecodable documents
    corrupt_accounts: BTreeSet<u64>,
    corrupt_profiles: BTreeSet<u64>,
    /// Operations that always fail with `StoreError::Unavailable`
    failing_operations: BTreeSet<&'static str>,
}

impl Tables {
    fn account(&self, key: u64, account: &Account) -> StoreResult<Account> {
        if self.corrupt_accounts.contains(&key) {
            return Err(StoreError::Corrupt(format!("account {key} cannot be decoded")));
        }
        Ok(account.clone())
    }

    fn profile(&self, key: u64, profile: &StudentProfile) -> StoreResult<StudentProfile> {
        if self.corrupt_profiles.contains(&key) {
            return Err(StoreError::Corrupt(format!("profile {key} cannot be decoded")));
        }
        Ok(profile.clone())
    }
}

/// Store gateway holding everything in memory
#[derive(Default)]
pub struct MemoryGateway {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    unique_emails: bool,
    /// Number of upcoming calls that fail with `StoreError::Unavailable`
    failures_pending: AtomicUsize,
    account_inserts: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject inserts and updates that would duplicate an email, the way a
    /// unique index would
    pub fn with_unique_emails() -> Self {
        Self {
            unique_emails: true,
            ..Self::default()
        }
    }

    /// Make the next `count` gateway calls fail as if the store were down
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Make every call to `operation` (a [`StoreGateway`] method name) fail as
    /// if the store were down
    pub async fn fail_operation(&self, operation: &'static str) {
        self.tables.write().await.failing_operations.insert(operation);
    }

    /// Keep the profile listed by id but make every read of it fail as corrupt
    pub async fn corrupt_profile(&self, id: &ProfileId) {
        if let Some(key) = parse_key(&id.0) {
            self.tables.write().await.corrupt_profiles.insert(key);
        }
    }

    /// Make every read that reaches this account fail as corrupt
    pub async fn corrupt_account(&self, id: &AccountId) {
        if let Some(key) = parse_key(&id.0) {
            self.tables.write().await.corrupt_accounts.insert(key);
        }
    }

    /// Total accounts inserted through the gateway since creation
    pub fn account_inserts(&self) -> usize {
        self.account_inserts.load(Ordering::SeqCst)
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn check_fault(&self, operation: &'static str) -> StoreResult<()> {
        if self.tables.read().await.failing_operations.contains(operation) {
            return Err(StoreError::Unavailable(format!("{operation} failing")));
        }
        let pending = self.failures_pending.load(Ordering::SeqCst);
        if pending > 0
            && self
                .failures_pending
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        Ok(())
    }

    /// Seed an account directly, bypassing the engine (registration path)
    pub async fn seed_account(&self, account: NewAccount) -> Account {
        let key = self.allocate();
        let account = Account {
            id: AccountId(key.to_string()),
            handle: account.handle,
            email: account.email,
            credential_hash: account.credential_hash,
            role: account.role,
        };
        self.tables.write().await.accounts.insert(key, account.clone());
        account
    }

    /// Seed a profile; its `id` is replaced with a generated one
    pub async fn seed_profile(&self, mut profile: StudentProfile) -> StudentProfile {
        let key = self.allocate();
        profile.id = ProfileId(key.to_string());
        self.tables.write().await.profiles.insert(key, profile.clone());
        profile
    }

    /// Remove an account as an external collaborator would
    pub async fn delete_account(&self, id: &AccountId) -> bool {
        match parse_key(&id.0) {
            Some(key) => self.tables.write().await.accounts.remove(&key).is_some(),
            None => false,
        }
    }

    /// Overwrite mutable profile fields as the admin UI would
    pub async fn edit_profile(&self, profile: StudentProfile) -> bool {
        let Some(key) = parse_key(&profile.id.0) else {
            return false;
        };
        let mut tables = self.tables.write().await;
        match tables.profiles.get_mut(&key) {
            Some(existing) => {
                *existing = profile;
                true
            }
            None => false,
        }
    }

    fn email_in_use(tables: &Tables, email: &str, except: Option<&AccountId>) -> bool {
        let needle = email.to_ascii_lowercase();
        tables
            .accounts
            .values()
            .any(|a| a.email.to_ascii_lowercase() == needle && Some(&a.id) != except)
    }
}

fn parse_key(id: &str) -> Option<u64> {
    id.parse().ok()
}

#[async_trait]
impl StoreGateway for MemoryGateway {
    async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        self.check_fault("get_account").await?;
        let Some(key) = parse_key(&id.0) else {
            return Ok(None);
        };
        let tables = self.tables.read().await;
        tables
            .accounts
            .get(&key)
            .map(|a| tables.account(key, a))
            .transpose()
    }

    async fn find_accounts_by_email(&self, email: &str) -> StoreResult<Vec<Account>> {
        self.check_fault("find_accounts_by_email").await?;
        let needle = email.to_ascii_lowercase();
        let tables = self.tables.read().await;
        tables
            .accounts
            .iter()
            .filter(|(_, a)| a.email.to_ascii_lowercase() == needle)
            .map(|(key, a)| tables.account(*key, a))
            .collect()
    }

    async fn find_account_by_login(&self, identifier: &str) -> StoreResult<Option<Account>> {
        self.check_fault("find_account_by_login").await?;
        let needle = identifier.to_ascii_lowercase();
        let tables = self.tables.read().await;
        tables
            .accounts
            .iter()
            .find(|(_, a)| a.handle == identifier || a.email.to_ascii_lowercase() == needle)
            .map(|(key, a)| tables.account(*key, a))
            .transpose()
    }

    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        self.check_fault("insert_account").await?;
        let mut tables = self.tables.write().await;
        if self.unique_emails && Self::email_in_use(&tables, &account.email, None) {
            return Err(StoreError::Constraint(format!(
                "duplicate email: {}",
                account.email
            )));
        }

        let key = self.allocate();
        let account = Account {
            id: AccountId(key.to_string()),
            handle: account.handle,
            email: account.email,
            credential_hash: account.credential_hash,
            role: account.role,
        };
        tables.accounts.insert(key, account.clone());
        self.account_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(account)
    }

    async fn update_account(&self, id: &AccountId, update: AccountUpdate) -> StoreResult<bool> {
        self.check_fault("update_account").await?;
        let Some(key) = parse_key(&id.0) else {
            return Ok(false);
        };
        let mut tables = self.tables.write().await;
        if let Some(email) = &update.email {
            if self.unique_emails && Self::email_in_use(&tables, email, Some(id)) {
                return Err(StoreError::Constraint(format!("duplicate email: {email}")));
            }
        }

        let Some(account) = tables.accounts.get_mut(&key) else {
            return Ok(false);
        };
        if let Some(handle) = update.handle {
            account.handle = handle;
        }
        if let Some(email) = update.email {
            account.email = email;
        }
        if let Some(hash) = update.credential_hash {
            account.credential_hash = hash;
        }
        Ok(true)
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.check_fault("list_accounts").await?;
        let tables = self.tables.read().await;
        tables
            .accounts
            .iter()
            .map(|(key, a)| tables.account(*key, a))
            .collect()
    }

    async fn get_profile(&self, id: &ProfileId) -> StoreResult<Option<StudentProfile>> {
        self.check_fault("get_profile").await?;
        let Some(key) = parse_key(&id.0) else {
            return Ok(None);
        };
        let tables = self.tables.read().await;
        tables
            .profiles
            .get(&key)
            .map(|p| tables.profile(key, p))
            .transpose()
    }

    async fn list_profiles(&self) -> StoreResult<Vec<StudentProfile>> {
        self.check_fault("list_profiles").await?;
        let tables = self.tables.read().await;
        tables
            .profiles
            .iter()
            .map(|(key, p)| tables.profile(*key, p))
            .collect()
    }

    async fn list_profile_ids(&self) -> StoreResult<Vec<ProfileId>> {
        self.check_fault("list_profile_ids").await?;
        Ok(self
            .tables
            .read()
            .await
            .profiles
            .values()
            .map(|p| p.id.clone())
            .collect())
    }

    async fn find_profile_by_account(
        &self,
        account_id: &AccountId,
    ) -> StoreResult<Option<StudentProfile>> {
        self.check_fault("find_profile_by_account").await?;
        let tables = self.tables.read().await;
        tables
            .profiles
            .iter()
            .find(|(_, p)| p.linked_account_id.as_ref() == Some(account_id))
            .map(|(key, p)| tables.profile(*key, p))
            .transpose()
    }

    async fn find_profile_login(&self, identifier: &str) -> StoreResult<Option<ProfileLogin>> {
        self.check_fault("find_profile_login").await?;
        let needle = match_key(identifier);
        let tables = self.tables.read().await;
        let Some((key, profile)) = tables.profiles.iter().find(|(_, p)| {
            p.linked_account_id.is_some()
                && (match_key(&p.full_name()) == needle || match_key(&p.email) == needle)
        }) else {
            return Ok(None);
        };

        let profile = tables.profile(*key, profile)?;
        Ok(profile.linked_account_id.clone().map(|account_id| ProfileLogin {
            profile,
            account_id,
        }))
    }

    async fn set_profile_link(
        &self,
        id: &ProfileId,
        account_id: &AccountId,
    ) -> StoreResult<bool> {
        self.check_fault("set_profile_link").await?;
        let Some(key) = parse_key(&id.0) else {
            return Ok(false);
        };
        let mut tables = self.tables.write().await;
        match tables.profiles.get_mut(&key) {
            Some(profile) => {
                profile.linked_account_id = Some(account_id.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
