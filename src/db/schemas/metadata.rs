//! Bookkeeping fields shared by account and profile documents

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Stored under `metadata` on every document. Rows removed through the admin
/// UI are only flagged, so lookups filter on `is_deleted`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    pub fn new() -> Self {
        let mut metadata = Self::default();
        metadata.stamp_created();
        metadata
    }

    /// Mark as a live, freshly written document
    pub fn stamp_created(&mut self) {
        let now = DateTime::now();
        self.is_deleted = false;
        self.deleted_at = None;
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }
}
