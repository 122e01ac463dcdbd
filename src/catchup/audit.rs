use crate::catchup::util::{now_epoch_secs, truncate_with_ellipsis};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

const MAX_AUDIT_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub session_id: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

/// Append-only JSONL trail of session phase transitions. Write failures are
/// reported to the caller, who is expected to ignore them: auditing must
/// never fail a summarization.
#[derive(Debug, Clone)]
pub struct AuditLog {
    logs_dir: PathBuf,
}

impl AuditLog {
    pub fn new(logs_dir: PathBuf) -> Self {
        Self { logs_dir }
    }

    pub fn record(&self, session_id: u64, phase: &str, status: &str, message: &str) -> Result<()> {
        fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("failed to create {}", self.logs_dir.display()))?;
        let event = AuditEvent {
            at_epoch_secs: now_epoch_secs()?,
            session_id,
            phase: phase.to_string(),
            status: status.to_string(),
            message: truncate_with_ellipsis(message, MAX_AUDIT_MESSAGE_CHARS),
        };

        let line = format!("{}\n", serde_json::to_string(&event)?);
        use std::io::Write;
        let path = self.logs_dir.join("audit.log");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
