//! Shared types: identity entities and the error taxonomy

pub mod error;
pub mod model;

pub use error::{IdentityError, Result, StoreError};
pub use model::{
    Account, AccountId, AccountUpdate, NewAccount, ProfileId, ProfileLogin, Role, StudentProfile,
};
