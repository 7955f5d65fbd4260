//! Conflict audit trail
//!
//! Every alias the engine creates is reported to a [`ConflictSink`]. The
//! default sink emits a structured `tracing` event; the JSONL sink appends
//! one record per line for later inspection.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::identity::ConflictRecord;

/// Collector for conflict records
pub trait ConflictSink: Send + Sync {
    fn record(&self, record: &ConflictRecord);
}

/// Emits each record as a `warn!` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConflictSink;

impl ConflictSink for TracingConflictSink {
    fn record(&self, record: &ConflictRecord) {
        warn!(
            profile_id = %record.profile_id,
            reason = record.reason.as_str(),
            existing_account_id = %record.existing_account_id,
            new_account_id = %record.new_account_id,
            alias_email = %record.alias_email,
            adopted = record.adopted,
            "Email collision resolved with alias account"
        );
    }
}

/// Appends records as JSON lines
pub struct JsonlConflictSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlConflictSink {
    pub fn open(path: PathBuf) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Conflict log: {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ConflictSink for JsonlConflictSink {
    fn record(&self, record: &ConflictRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize conflict record: {}", e);
                return;
            }
        };

        let Ok(mut writer) = self.writer.lock() else {
            error!("Conflict log writer poisoned");
            return;
        };
        if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
            error!("Failed to write conflict record: {}", e);
        }
    }
}

/// Fans a record out to several sinks
pub struct TeeConflictSink(pub Vec<std::sync::Arc<dyn ConflictSink>>);

impl ConflictSink for TeeConflictSink {
    fn record(&self, record: &ConflictRecord) {
        for sink in &self.0 {
            sink.record(record);
        }
    }
}

/// Keeps records in memory; handy for embedding callers and tests
#[derive(Default)]
pub struct CollectingConflictSink {
    records: Mutex<Vec<ConflictRecord>>,
}

impl CollectingConflictSink {
    pub fn records(&self) -> Vec<ConflictRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl ConflictSink for CollectingConflictSink {
    fn record(&self, record: &ConflictRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
