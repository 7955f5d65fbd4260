//! Per-call timeout decorator for any store gateway
//!
//! The engine has no cancellation of its own; every gateway call is raced
//! against a fixed deadline and an elapsed call surfaces as
//! [`StoreError::Timeout`], which the batch driver treats as retryable.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::db::gateway::{StoreGateway, StoreResult};
use crate::types::{
    Account, AccountId, AccountUpdate, NewAccount, ProfileId, ProfileLogin, StoreError,
    StudentProfile,
};

/// Wraps a gateway so no call outlives `limit`
pub struct BoundedGateway<G> {
    inner: G,
    limit: Duration,
}

impl<G: StoreGateway> BoundedGateway<G> {
    pub fn new(inner: G, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                let ms = self.limit.as_millis() as u64;
                warn!(operation = op, timeout_ms = ms, "Store call timed out");
                Err(StoreError::Timeout(ms))
            }
        }
    }
}

#[async_trait]
impl<G: StoreGateway> StoreGateway for BoundedGateway<G> {
    async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        self.bounded("get_account", self.inner.get_account(id)).await
    }

    async fn find_accounts_by_email(&self, email: &str) -> StoreResult<Vec<Account>> {
        self.bounded("find_accounts_by_email", self.inner.find_accounts_by_email(email))
            .await
    }

    async fn find_account_by_login(&self, identifier: &str) -> StoreResult<Option<Account>> {
        self.bounded("find_account_by_login", self.inner.find_account_by_login(identifier))
            .await
    }

    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        self.bounded("insert_account", self.inner.insert_account(account))
            .await
    }

    async fn update_account(&self, id: &AccountId, update: AccountUpdate) -> StoreResult<bool> {
        self.bounded("update_account", self.inner.update_account(id, update))
            .await
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.bounded("list_accounts", self.inner.list_accounts()).await
    }

    async fn get_profile(&self, id: &ProfileId) -> StoreResult<Option<StudentProfile>> {
        self.bounded("get_profile", self.inner.get_profile(id)).await
    }

    async fn list_profiles(&self) -> StoreResult<Vec<StudentProfile>> {
        self.bounded("list_profiles", self.inner.list_profiles()).await
    }

    async fn list_profile_ids(&self) -> StoreResult<Vec<ProfileId>> {
        self.bounded("list_profile_ids", self.inner.list_profile_ids()).await
    }

    async fn find_profile_by_account(
        &self,
        account_id: &AccountId,
    ) -> StoreResult<Option<StudentProfile>> {
        self.bounded(
            "find_profile_by_account",
            self.inner.find_profile_by_account(account_id),
        )
        .await
    }

    async fn find_profile_login(&self, identifier: &str) -> StoreResult<Option<ProfileLogin>> {
        self.bounded("find_profile_login", self.inner.find_profile_login(identifier))
            .await
    }

    async fn set_profile_link(
        &self,
        id: &ProfileId,
        account_id: &AccountId,
    ) -> StoreResult<bool> {
        self.bounded("set_profile_link", self.inner.set_profile_link(id, account_id))
            .await
    }
}
