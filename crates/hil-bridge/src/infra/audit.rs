//! Audit trail of board session lifecycle events.
//!
//! Each event is one JSON object per line, appended to the configured file.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Bridge process started
    BridgeStart,
    /// Board connected and configured
    Configured,
    /// Parameter list rejected before any hardware was touched
    ConfigurationRejected,
    /// Board did not answer the connection
    ConnectionFailed,
    /// Board parked and session released
    Terminated,
    /// Bridge process exiting
    BridgeShutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Opens `path` in append mode, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_us,
            event_type,
            details,
        })
    }
}

/// Details for a configured event
#[derive(Debug, Clone, Serialize)]
pub struct ConfiguredDetails {
    pub serial_port: String,
    pub sample_period_ms: u64,
}

/// Details for a terminated event
#[derive(Debug, Clone, Serialize)]
pub struct TerminatedDetails {
    pub ticks: u64,
    pub sync_timeouts: u64,
    pub max_wait_us: u64,
    pub drain_attempts: u64,
    pub discarded_callbacks: u64,
}
