//! hostel-identity - account reconciliation for hostel administration
//!
//! Keeps every student profile linked to exactly one login account and
//! decides who may log in with what.
//!
//! ## Components
//!
//! - **Identity**: resolve, alias, synchronize and batch-resync profiles
//! - **Auth**: identifier matching with the external-id fallback, Argon2
//!   hashing, JWT issuance
//! - **Db**: store gateway seam with MongoDB and in-memory backends
//! - **Logging**: subscriber setup and the conflict audit trail

pub mod auth;
pub mod config;
pub mod db;
pub mod identity;
pub mod logging;
pub mod types;

pub use config::Args;
pub use identity::IdentityEngine;
pub use types::{IdentityError, Result};
