//! MongoDB-backed store gateway
//!
//! Case-insensitive matching is evaluated server-side with `$expr` so no
//! normalized shadow fields have to be kept in sync.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use tracing::debug;

use crate::db::gateway::{match_key, StoreGateway, StoreResult};
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{AccountDoc, ProfileDoc, ACCOUNT_COLLECTION, PROFILE_COLLECTION};
use crate::types::{
    Account, AccountId, AccountUpdate, NewAccount, ProfileId, ProfileLogin, StoreError,
    StudentProfile,
};

/// Store gateway over the `accounts` and `student_profiles` collections
#[derive(Clone)]
pub struct MongoGateway {
    accounts: MongoCollection<AccountDoc>,
    profiles: MongoCollection<ProfileDoc>,
}

impl MongoGateway {
    /// Open both collections, applying their indexes
    pub async fn new(client: &MongoClient) -> StoreResult<Self> {
        Ok(Self {
            accounts: client.collection::<AccountDoc>(ACCOUNT_COLLECTION).await?,
            profiles: client.collection::<ProfileDoc>(PROFILE_COLLECTION).await?,
        })
    }
}

/// Ids that are not valid ObjectIds cannot name a stored document
fn object_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

fn email_equals(needle: &str) -> Document {
    doc! { "$expr": { "$eq": [ { "$toLower": "$email" }, needle ] } }
}

fn full_name_equals(needle: &str) -> Document {
    doc! {
        "$expr": {
            "$eq": [
                { "$toLower": { "$trim": { "input": { "$concat": ["$first_name", " ", "$last_name"] } } } },
                needle
            ]
        }
    }
}

fn accounts_from(docs: Vec<AccountDoc>) -> StoreResult<Vec<Account>> {
    docs.into_iter().map(AccountDoc::into_account).collect()
}

fn profiles_from(docs: Vec<ProfileDoc>) -> StoreResult<Vec<StudentProfile>> {
    docs.into_iter().map(ProfileDoc::into_profile).collect()
}

#[async_trait]
impl StoreGateway for MongoGateway {
    async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        let Some(oid) = object_id(&id.0) else {
            return Ok(None);
        };
        self.accounts
            .find_one(doc! { "_id": oid })
            .await?
            .map(AccountDoc::into_account)
            .transpose()
    }

    async fn find_accounts_by_email(&self, email: &str) -> StoreResult<Vec<Account>> {
        let docs = self
            .accounts
            .find_many(email_equals(&email.to_ascii_lowercase()))
            .await?;
        accounts_from(docs)
    }

    async fn find_account_by_login(&self, identifier: &str) -> StoreResult<Option<Account>> {
        let filter = doc! {
            "$or": [
                { "handle": identifier },
                email_equals(&identifier.to_ascii_lowercase()),
            ]
        };
        self.accounts
            .find_one(filter)
            .await?
            .map(AccountDoc::into_account)
            .transpose()
    }

    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        let doc = AccountDoc::new(account);
        let mut stored = doc.clone();
        stored._id = Some(self.accounts.insert_one(doc).await?);
        debug!(account_id = ?stored._id, "Inserted account");
        stored.into_account()
    }

    async fn update_account(&self, id: &AccountId, update: AccountUpdate) -> StoreResult<bool> {
        let Some(oid) = object_id(&id.0) else {
            return Ok(false);
        };

        let mut fields = Document::new();
        if let Some(handle) = update.handle {
            fields.insert("handle", handle);
        }
        if let Some(email) = update.email {
            fields.insert("email", email);
        }
        if let Some(hash) = update.credential_hash {
            fields.insert("credential_hash", hash);
        }
        if fields.is_empty() {
            return Ok(self.accounts.find_one(doc! { "_id": oid }).await?.is_some());
        }

        let result = self.accounts.update_set(doc! { "_id": oid }, fields).await?;
        Ok(result.matched_count > 0)
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        accounts_from(self.accounts.find_many(doc! {}).await?)
    }

    async fn get_profile(&self, id: &ProfileId) -> StoreResult<Option<StudentProfile>> {
        let Some(oid) = object_id(&id.0) else {
            return Ok(None);
        };
        self.profiles
            .find_one(doc! { "_id": oid })
            .await?
            .map(ProfileDoc::into_profile)
            .transpose()
    }

    async fn list_profiles(&self) -> StoreResult<Vec<StudentProfile>> {
        profiles_from(self.profiles.find_many(doc! {}).await?)
    }

    async fn list_profile_ids(&self) -> StoreResult<Vec<ProfileId>> {
        let ids = self.profiles.find_ids(doc! {}).await?;
        Ok(ids.into_iter().map(|oid| ProfileId(oid.to_hex())).collect())
    }

    async fn find_profile_by_account(
        &self,
        account_id: &AccountId,
    ) -> StoreResult<Option<StudentProfile>> {
        let Some(oid) = object_id(&account_id.0) else {
            return Ok(None);
        };
        self.profiles
            .find_one(doc! { "linked_account_id": oid })
            .await?
            .map(ProfileDoc::into_profile)
            .transpose()
    }

    async fn find_profile_login(&self, identifier: &str) -> StoreResult<Option<ProfileLogin>> {
        let needle = match_key(identifier);
        let filter = doc! {
            "linked_account_id": { "$ne": Bson::Null },
            "$or": [ full_name_equals(&needle), email_equals(&needle) ],
        };

        let Some(doc) = self.profiles.find_one(filter).await? else {
            return Ok(None);
        };
        let profile = doc.into_profile()?;
        match profile.linked_account_id.clone() {
            Some(account_id) => Ok(Some(ProfileLogin {
                profile,
                account_id,
            })),
            None => Err(StoreError::Corrupt(
                "linked profile returned without a link".into(),
            )),
        }
    }

    async fn set_profile_link(
        &self,
        id: &ProfileId,
        account_id: &AccountId,
    ) -> StoreResult<bool> {
        let (Some(oid), Some(account_oid)) = (object_id(&id.0), object_id(&account_id.0)) else {
            return Ok(false);
        };
        let result = self
            .profiles
            .update_set(doc! { "_id": oid }, doc! { "linked_account_id": account_oid })
            .await?;
        Ok(result.matched_count > 0)
    }
}
