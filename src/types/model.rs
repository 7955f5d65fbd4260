//! Identity entities shared by every component
//!
//! Storage backends map their own document shapes onto these types; the
//! engine never sees store-specific rows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

/// Stable identifier of a student profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Warden,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Warden => "warden",
            Self::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "warden" => Ok(Self::Warden),
            "student" => Ok(Self::Student),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Login account with its credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    /// Display name, also accepted as a login identifier
    pub handle: String,
    pub email: String,
    /// PHC-formatted hash string
    pub credential_hash: String,
    pub role: Role,
}

/// Fields for an account the engine is about to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub handle: String,
    pub email: String,
    pub credential_hash: String,
    pub role: Role,
}

/// Partial account write; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub handle: Option<String>,
    pub email: Option<String>,
    pub credential_hash: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.handle.is_none() && self.email.is_none() && self.credential_hash.is_none()
    }
}

/// Academic record, optionally linked to one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: ProfileId,
    /// Human-assigned code such as "STU001"; may be empty
    #[serde(default)]
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub linked_account_id: Option<AccountId>,
    #[serde(default)]
    pub status: String,
}

impl StudentProfile {
    /// `first + " " + last`, trimmed
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Trimmed external id, `None` when blank
    pub fn login_secret(&self) -> Option<&str> {
        let trimmed = self.external_id.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Full name suitable for display: both parts present
    pub fn display_name(&self) -> Option<String> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            None
        } else {
            Some(self.full_name())
        }
    }
}

/// Profile matched by name or email during login, paired with its linked
/// account id. Only built at the secondary lookup of the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLogin {
    pub profile: StudentProfile,
    pub account_id: AccountId,
}
