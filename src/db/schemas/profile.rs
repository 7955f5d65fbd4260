//! Student profile document schema
//!
//! Profiles are created by the administrative side; the engine only ever
//! writes `linked_account_id`.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::{AccountId, ProfileId, StoreError, StudentProfile};

/// Collection name for student profiles
pub const PROFILE_COLLECTION: &str = "student_profiles";

/// Student profile document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProfileDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Human-assigned student code
    #[serde(default)]
    pub external_id: String,

    pub first_name: String,

    pub last_name: String,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_account_id: Option<ObjectId>,

    #[serde(default)]
    pub status: String,
}

impl ProfileDoc {
    pub fn into_profile(self) -> Result<StudentProfile, StoreError> {
        let id = self
            ._id
            .ok_or_else(|| StoreError::Corrupt("profile document without _id".into()))?;
        Ok(StudentProfile {
            id: ProfileId(id.to_hex()),
            external_id: self.external_id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            linked_account_id: self.linked_account_id.map(|oid| AccountId(oid.to_hex())),
            status: self.status,
        })
    }
}

impl IntoIndexes for ProfileDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "linked_account_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("linked_account_index".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .name("email_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ProfileDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_profile_maps_link() {
        let oid = ObjectId::new();
        let account_oid = ObjectId::new();
        let doc = ProfileDoc {
            _id: Some(oid),
            external_id: "STU01".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jane@x.com".into(),
            linked_account_id: Some(account_oid),
            ..ProfileDoc::default()
        };

        let profile = doc.into_profile().unwrap();
        assert_eq!(profile.id.0, oid.to_hex());
        assert_eq!(profile.linked_account_id, Some(AccountId(account_oid.to_hex())));
    }

    #[test]
    fn test_missing_external_id_defaults_to_empty() {
        let raw = doc! {
            "_id": ObjectId::new(),
            "first_name": "John",
            "last_name": "Roe",
            "email": "john@x.com",
        };
        let doc: ProfileDoc = bson::from_document(raw).unwrap();
        let profile = doc.into_profile().unwrap();
        assert_eq!(profile.external_id, "");
        assert!(profile.linked_account_id.is_none());
    }
}
