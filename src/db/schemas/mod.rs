//! Database schemas
//!
//! Defines MongoDB document structures for accounts and student profiles.

mod account;
mod metadata;
mod profile;

pub use account::{AccountDoc, ACCOUNT_COLLECTION};
pub use metadata::Metadata;
pub use profile::{ProfileDoc, PROFILE_COLLECTION};
