//! Error types for the identity engine
//!
//! Storage backends report [`StoreError`]; everything above the gateway
//! speaks [`IdentityError`].

/// Failure reported by a store gateway
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0}ms")]
    Timeout(u64),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Timeouts and lost connections may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Main error type for identity operations
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Deliberately carries no detail about which check failed
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Whether the batch driver may retry the profile that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Short machine-readable code, used in batch failure tallies
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            Self::Hashing(_) => "HASHING_ERROR",
            Self::Token(_) => "TOKEN_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                Self::StoreUnavailable(err.to_string())
            }
            StoreError::Constraint(msg) => Self::ConstraintViolation(msg),
            StoreError::Corrupt(msg) => Self::Internal(msg),
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match *err.kind {
            ErrorKind::Write(WriteFailure::WriteError(ref e)) if e.code == 11000 => {
                Self::Constraint(e.message.clone())
            }
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                Self::Corrupt(err.to_string())
            }
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Token(err.to_string())
    }
}

impl From<std::io::Error> for IdentityError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;
