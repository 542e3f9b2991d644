//! Audit Ledger
//!
//! Append-only NDJSON ledger of audit events over an injected
//! [`AppendLog`]. One process writes a given ledger at a time; concurrent
//! writers may interleave lines, which verification then reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audit::event::AuditEvent;
use crate::audit::export::ExportReport;
use crate::audit::log::{ledger_lines, AppendLog, FileLog, MemoryLog};
use crate::audit::verify::{verify_content, VerificationReport};
use crate::error::ProvenanceError;
use crate::provenance::ProvenanceParams;

/// Audit ledger managing an append-only log
#[derive(Clone)]
pub struct AuditLedger {
    log: Arc<dyn AppendLog>,
}

impl AuditLedger {
    pub fn new<L: AppendLog + 'static>(log: L) -> Self {
        Self { log: Arc::new(log) }
    }

    /// Ledger backed by a file; the file is created on first append.
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(FileLog::new(path))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryLog::new())
    }

    pub fn location(&self) -> String {
        self.log.location()
    }

    /// Append an event. Events whose hash does not match their contents
    /// are refused.
    pub fn append(&self, event: &AuditEvent) -> Result<(), ProvenanceError> {
        if !event.verify_hash() {
            return Err(ProvenanceError::ValidationError(format!(
                "execution hash does not match command: {}",
                event.command
            )));
        }

        let json = serde_json::to_string(event)?;
        self.log.append_line(&json)?;

        debug!("Appended audit event: {}", event.summary());
        Ok(())
    }

    /// Build, stamp and append an event for `command`.
    pub fn record(
        &self,
        command: &str,
        params: ProvenanceParams,
        strict: bool,
        mode: &str,
        role: &str,
    ) -> Result<AuditEvent, ProvenanceError> {
        let event = AuditEvent::new(
            command.to_string(),
            params,
            strict,
            mode.to_string(),
            role.to_string(),
        );
        self.append(&event)?;
        Ok(event)
    }

    /// Most recently appended event.
    pub fn read_last(&self) -> Result<AuditEvent, ProvenanceError> {
        let line = self
            .log
            .read_last_line()?
            .ok_or_else(|| ProvenanceError::LedgerEmpty(self.location()))?;

        serde_json::from_str(&line).map_err(|e| {
            ProvenanceError::SerializationError(format!(
                "Failed to parse last audit event in {}: {}",
                self.location(),
                e
            ))
        })
    }

    /// All parseable events in append order. Damaged lines are skipped;
    /// use [`AuditLedger::verify`] to account for them.
    pub fn events(&self) -> Result<Vec<AuditEvent>, ProvenanceError> {
        let Some(bytes) = self.log.read_all()? else {
            return Ok(vec![]);
        };

        let mut events = Vec::new();
        for (number, line) in ledger_lines(&bytes) {
            let parsed = line
                .map_err(|e| e.to_string())
                .and_then(|line| serde_json::from_str::<AuditEvent>(line).map_err(|e| e.to_string()));
            match parsed {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping audit line {}: {}", number, e),
            }
        }
        Ok(events)
    }

    pub fn verify(&self) -> Result<VerificationReport, ProvenanceError> {
        let content = self.log.read_all()?;
        Ok(verify_content(content.as_deref()))
    }

    /// Raw ledger bytes as stored. An absent ledger reads as empty.
    pub fn raw_content(&self) -> Result<Vec<u8>, ProvenanceError> {
        Ok(self.log.read_all()?.unwrap_or_default())
    }

    /// Write a reproducibility record for the current ledger to
    /// `destination`. The ledger itself is left untouched.
    pub fn export(&self, destination: &Path) -> Result<ExportReport, ProvenanceError> {
        let content = self.raw_content()?;
        let report = ExportReport::from_content(&content, self.location());
        report.write_to(destination)?;
        Ok(report)
    }
}
