//! Authentication
//!
//! Provides:
//! - Credential hashing with Argon2
//! - Login identifier matching with the external-id fallback
//! - Bearer token issuance (JWT)

pub mod jwt;
pub mod login;
pub mod matcher;
pub mod password;

pub use jwt::{Claims, IssuedToken, JwtIssuer, TokenInput, TokenIssuer, DEFAULT_TOKEN_TTL_SECONDS};
pub use login::{LoginResponse, LoginService};
pub use matcher::{AuthOutcome, Authenticated, AuthenticationMatcher};
pub use password::{Argon2Hasher, CredentialHasher};
