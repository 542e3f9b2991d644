//! Reproducibility record for a ledger snapshot.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::audit::log::ledger_lines;
use crate::error::ProvenanceError;
use crate::provenance::sha256_hex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub exported_at: String,
    pub sha256: String,
    pub line_count: usize,
    pub source_path: String,
}

impl ExportReport {
    /// Summarize raw ledger bytes. Digest covers the bytes exactly as stored.
    pub fn from_content(content: &[u8], source_path: String) -> Self {
        let line_count = ledger_lines(content).count();

        Self {
            exported_at: Utc::now().to_rfc3339(),
            sha256: sha256_hex(content),
            line_count,
            source_path,
        }
    }

    pub fn write_to(&self, destination: &Path) -> Result<(), ProvenanceError> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ProvenanceError::io_context("Failed to create export directory", e)
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(destination, json)
            .map_err(|e| ProvenanceError::io_context("Failed to write audit export", e))?;

        info!(
            "Audit export written to {} ({} lines, sha256 {})",
            destination.display(),
            self.line_count,
            self.sha256
        );
        Ok(())
    }
}
