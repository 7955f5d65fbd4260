//! Logging infrastructure
//!
//! Subscriber setup for the binary and the conflict audit trail.

pub mod audit;

pub use audit::{
    CollectingConflictSink, ConflictSink, JsonlConflictSink, TeeConflictSink, TracingConflictSink,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("hostel_identity={},info", level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
