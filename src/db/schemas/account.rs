//! Account document schema
//!
//! Email is indexed but deliberately not unique: collisions created outside
//! the engine are tolerated and resolved by aliasing.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::{Account, AccountId, NewAccount, Role, StoreError};

/// Collection name for accounts
pub const ACCOUNT_COLLECTION: &str = "accounts";

/// Account document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccountDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub handle: String,

    pub email: String,

    /// Argon2 password hash
    pub credential_hash: String,

    pub role: Role,
}

impl Default for AccountDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            handle: String::new(),
            email: String::new(),
            credential_hash: String::new(),
            role: Role::Student,
        }
    }
}

impl AccountDoc {
    pub fn new(account: NewAccount) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            handle: account.handle,
            email: account.email,
            credential_hash: account.credential_hash,
            role: account.role,
        }
    }

    pub fn into_account(self) -> Result<Account, StoreError> {
        let id = self
            ._id
            .ok_or_else(|| StoreError::Corrupt("account document without _id".into()))?;
        Ok(Account {
            id: AccountId(id.to_hex()),
            handle: self.handle,
            email: self.email,
            credential_hash: self.credential_hash,
            role: self.role,
        })
    }
}

impl IntoIndexes for AccountDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .name("email_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "handle": 1 },
                Some(
                    IndexOptions::builder()
                        .name("handle_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AccountDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_account_requires_id() {
        let doc = AccountDoc::default();
        assert!(doc.into_account().is_err());

        let oid = ObjectId::new();
        let doc = AccountDoc {
            _id: Some(oid),
            handle: "Jane Doe".into(),
            email: "jane@x.com".into(),
            ..AccountDoc::default()
        };
        let account = doc.into_account().unwrap();
        assert_eq!(account.id.0, oid.to_hex());
        assert_eq!(account.role, Role::Student);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let doc = AccountDoc {
            role: Role::Warden,
            ..AccountDoc::default()
        };
        let bson_doc = bson::to_document(&doc).unwrap();
        assert_eq!(bson_doc.get_str("role").unwrap(), "warden");
        assert!(bson_doc.get("_id").is_none());
    }
}
