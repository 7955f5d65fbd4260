//! Configuration for hostel-identity
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::DEFAULT_TOKEN_TTL_SECONDS;
use crate::identity::RetryPolicy;

/// Upper bound for the per-retry backoff (10 minutes)
pub const MAX_RETRY_BACKOFF_MS: u64 = 10 * 60 * 1000;

/// hostel-identity - student profile and login account reconciliation
#[derive(Parser, Debug, Clone)]
#[command(name = "hostel-identity")]
#[command(about = "Reconcile student profiles with login accounts")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "hostel")]
    pub mongodb_db: String,

    /// Per-call store timeout in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Retries per profile for transient store failures during a resync
    #[arg(long, env = "RESYNC_MAX_RETRIES", default_value = "2")]
    pub resync_max_retries: u32,

    /// Base backoff between retries in milliseconds (multiplied by attempt)
    #[arg(long, env = "RESYNC_RETRY_BACKOFF_MS", default_value = "200")]
    pub resync_retry_backoff_ms: u64,

    /// JWT secret for token signing (needed by `login`)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value_t = DEFAULT_TOKEN_TTL_SECONDS)]
    pub jwt_expiry_seconds: u64,

    /// Argon2 memory cost in KiB (library default when unset)
    #[arg(long, env = "ARGON2_MEMORY_KIB")]
    pub argon2_memory_kib: Option<u32>,

    /// Argon2 iteration count (library default when unset)
    #[arg(long, env = "ARGON2_ITERATIONS")]
    pub argon2_iterations: Option<u32>,

    /// Append conflict records to this JSONL file
    #[arg(long, env = "CONFLICT_LOG")]
    pub conflict_log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reconcile every student profile with its account
    Resync,
    /// Find or create the account for one profile
    Resolve { profile_id: String },
    /// Push one profile's name, email and credential onto its account
    Sync { profile_id: String },
    /// Authenticate and print a bearer token
    Login {
        identifier: String,
        /// Secret to check (prefer the env var over the flag)
        #[arg(long, env = "LOGIN_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Log every profile in by full name and email with its external id
    VerifyLogins,
    /// List accounts without credential hashes
    ListAccounts,
}

impl Args {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.resync_max_retries,
            backoff: Duration::from_millis(self.resync_retry_backoff_ms),
        }
    }

    /// Custom Argon2 cost, `None` for the library default
    pub fn argon2_params(&self) -> Option<(u32, u32)> {
        match (self.argon2_memory_kib, self.argon2_iterations) {
            (None, None) => None,
            (memory, iterations) => Some((
                memory.unwrap_or(argon2::Params::DEFAULT_M_COST),
                iterations.unwrap_or(argon2::Params::DEFAULT_T_COST),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.store_timeout_ms == 0 {
            return Err("STORE_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.resync_retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(format!(
                "RESYNC_RETRY_BACKOFF_MS must be at most {}",
                MAX_RETRY_BACKOFF_MS
            ));
        }

        if self.jwt_expiry_seconds == 0 {
            return Err("JWT_EXPIRY_SECONDS must be greater than zero".to_string());
        }

        if matches!(self.command, Command::Login { .. }) {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required for login".to_string()),
                Some(s) if s.len() < 32 => {
                    return Err("JWT_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if let Some(memory) = self.argon2_memory_kib {
            if memory < argon2::Params::MIN_M_COST {
                return Err(format!(
                    "ARGON2_MEMORY_KIB must be at least {}",
                    argon2::Params::MIN_M_COST
                ));
            }
        }

        if self.argon2_iterations == Some(0) {
            return Err("ARGON2_ITERATIONS must be greater than zero".to_string());
        }

        Ok(())
    }
}
