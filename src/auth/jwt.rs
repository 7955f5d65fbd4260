//! Bearer token issuance
//!
//! The engine only supplies `{account_id, role}`; token format and expiry
//! belong to the issuer. The bundled issuer signs HS256 JWTs.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{AccountId, IdentityError, Role};

/// Default validity window (24 hours)
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Claim payload handed to the issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInput {
    pub account_id: AccountId,
    pub role: Role,
}

/// Opaque bearer token plus its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Unix timestamp
    pub expires_at: u64,
}

/// Payload stored in the JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Issues bearer tokens for authenticated accounts
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, input: TokenInput) -> Result<IssuedToken, IdentityError>;
}

/// HS256 JWT issuer
#[derive(Clone)]
pub struct JwtIssuer {
    secret: String,
    expiry_seconds: u64,
}

impl JwtIssuer {
    /// Create a new issuer
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, IdentityError> {
        if secret.is_empty() {
            return Err(IdentityError::Config("JWT_SECRET is required".into()));
        }

        if secret.len() < 32 {
            return Err(IdentityError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Verify and decode a token issued by this issuer
    pub fn verify(&self, token: &str) -> Result<Claims, IdentityError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let msg = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidToken => "Invalid token",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Token validation failed",
            };
            IdentityError::Token(msg.into())
        })?;
        Ok(data.claims)
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue(&self, input: TokenInput) -> Result<IssuedToken, IdentityError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| IdentityError::Token(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: input.account_id.0,
            role: input.role,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| IdentityError::Token(format!("Failed to generate token: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }
}
