//! Audit Event
//!
//! One ledger line: a rendered command, the context it was planned or run
//! under, and the execution hash that pins it to its parameters.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::provenance::{compute_execution_hash, ProvenanceParams};

/// Audit ledger entry bound to its command by an execution hash
///
/// Every field defaults when absent so older lines (no role, no hash) still
/// read back; `verify_hash` fails for those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub execution_hash: String,
    #[serde(default)]
    pub provenance_params: ProvenanceParams,
}

impl AuditEvent {
    /// Create a new event stamped with the current time
    pub fn new(
        command: String,
        provenance_params: ProvenanceParams,
        strict: bool,
        mode: String,
        role: String,
    ) -> Self {
        let execution_hash = compute_execution_hash(&command, &provenance_params);

        Self {
            timestamp: Utc::now().to_rfc3339(),
            command,
            strict,
            mode,
            role,
            execution_hash,
            provenance_params,
        }
    }

    /// Recompute the execution hash from the stored command and parameters
    pub fn calculate_hash(&self) -> String {
        compute_execution_hash(&self.command, &self.provenance_params)
    }

    pub fn verify_hash(&self) -> bool {
        !self.execution_hash.is_empty() && self.execution_hash == self.calculate_hash()
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} [{}/{}{}]: {}",
            self.timestamp,
            self.mode,
            self.role,
            if self.strict { ", strict" } else { "" },
            self.command
        )
    }
}
