//! hostel-identity - student profile and login account reconciliation

use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use zeroize::Zeroizing;

use hostel_identity::{
    auth::{Argon2Hasher, CredentialHasher, JwtIssuer, LoginService},
    config::{Args, Command},
    db::{BoundedGateway, MongoClient, MongoGateway, SharedGateway},
    identity::IdentityEngine,
    logging::{self, ConflictSink, JsonlConflictSink, TeeConflictSink, TracingConflictSink},
    types::ProfileId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("MongoDB: {} (db {})", args.mongodb_uri, args.mongodb_db);
    info!("Store timeout: {}ms", args.store_timeout_ms);

    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db, args.store_timeout()).await
    {
        Ok(client) => client,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };
    let store: SharedGateway = Arc::new(BoundedGateway::new(
        MongoGateway::new(&mongo).await?,
        args.store_timeout(),
    ));

    let hasher: Arc<dyn CredentialHasher> = match args.argon2_params() {
        Some((memory_kib, iterations)) => Arc::new(Argon2Hasher::with_params(memory_kib, iterations)?),
        None => Arc::new(Argon2Hasher::default()),
    };

    let mut sinks: Vec<Arc<dyn ConflictSink>> = vec![Arc::new(TracingConflictSink)];
    if let Some(path) = &args.conflict_log {
        sinks.push(Arc::new(JsonlConflictSink::open(path.clone())?));
    }

    let engine = IdentityEngine::new(store, hasher)
        .with_conflict_sink(Arc::new(TeeConflictSink(sinks)))
        .with_retry_policy(args.retry_policy());

    match args.command {
        Command::Resync => {
            let report = engine.run_full_resync().await?;
            print_json(&report)?;
            if !report.failures.is_empty() {
                std::process::exit(2);
            }
        }
        Command::Resolve { profile_id } => {
            print_json(&engine.resolve(&ProfileId::from(profile_id.as_str())).await?)?;
        }
        Command::Sync { profile_id } => {
            let outcome = engine
                .synchronize_credentials(&ProfileId::from(profile_id.as_str()))
                .await?;
            print_json(&outcome)?;
        }
        Command::Login { identifier, secret } => {
            let secret = Zeroizing::new(secret);
            let issuer = Arc::new(JwtIssuer::new(
                args.jwt_secret.unwrap_or_default(),
                args.jwt_expiry_seconds,
            )?);
            let service = LoginService::new(engine.matcher(), issuer);

            match service.login(&identifier, &secret).await {
                Ok(response) => print_json(&response)?,
                Err(e) => {
                    error!("Login failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::VerifyLogins => {
            let report = engine.verify_logins().await?;
            print_json(&report)?;
            if !report.failures.is_empty() {
                std::process::exit(2);
            }
        }
        Command::ListAccounts => {
            print_json(&engine.list_accounts().await?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
