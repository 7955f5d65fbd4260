//! Identity reconciliation
//!
//! Links student profiles to login accounts:
//! - Resolver: find or create the account for a profile
//! - Conflict resolver: alias accounts for colliding emails
//! - Synchronizer: push profile state onto the linked account
//! - Batch driver and engine facade

pub mod alias;
pub mod batch;
pub mod conflict;
pub mod engine;
pub mod resolver;
pub mod sync;

pub use alias::{alias_candidates, alias_email, is_alias_of};
pub use batch::{BatchDriver, ProfileFailure, Reconciled, ResyncReport, RetryPolicy};
pub use conflict::{ConflictReason, ConflictRecord, ConflictResolver};
pub use engine::{
    AccountSummary, IdentityEngine, LoginCheckFailure, LoginCheckReport, LoginIdentifier,
};
pub use resolver::{IdentityResolver, Resolution, ResolutionAction};
pub use sync::{CredentialSynchronizer, SyncOutcome};
