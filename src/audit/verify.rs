//! Audit Ledger Verification
//!
//! Classifies every non-blank ledger line independently. A damaged line is
//! counted and reported, never fatal, so a single torn write does not hide
//! the state of the rest of the history.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::audit::log::ledger_lines;
use crate::provenance::compute_execution_hash;

/// State of a single ledger line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    Valid,
    InvalidJson,
    MissingHash,
    MismatchedHash,
}

/// A non-valid line, by 1-based physical line number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineIssue {
    pub line: usize,
    pub state: LineState,
}

/// Verification result with per-class counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub ok: bool,
    pub ledger_present: bool,
    pub total_lines: usize,
    pub valid: usize,
    pub invalid_json: usize,
    pub missing_hash: usize,
    pub mismatched_hash: usize,
    pub issues: Vec<LineIssue>,
}

impl VerificationReport {
    fn record(&mut self, line: usize, state: LineState) {
        self.total_lines += 1;
        match state {
            LineState::Valid => {
                self.valid += 1;
                return;
            }
            LineState::InvalidJson => self.invalid_json += 1,
            LineState::MissingHash => self.missing_hash += 1,
            LineState::MismatchedHash => self.mismatched_hash += 1,
        }
        self.issues.push(LineIssue { line, state });
    }

    fn finalize(mut self) -> Self {
        self.ok = self.total_lines > 0
            && self.invalid_json == 0
            && self.missing_hash == 0
            && self.mismatched_hash == 0;
        self
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if !self.ledger_present {
            return "audit ledger not found".to_string();
        }
        if self.total_lines == 0 {
            return "audit ledger is empty".to_string();
        }
        format!(
            "{} line(s): {} valid, {} invalid json, {} missing hash, {} mismatched hash",
            self.total_lines, self.valid, self.invalid_json, self.missing_hash, self.mismatched_hash
        )
    }
}

/// Classify one non-blank ledger line.
pub fn classify_line(line: &str) -> LineState {
    let event = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(event)) => event,
        _ => return LineState::InvalidJson,
    };

    let stored = match event.get("execution_hash") {
        None | Some(Value::Null) => return LineState::MissingHash,
        Some(Value::String(hash)) if hash.is_empty() => return LineState::MissingHash,
        Some(Value::String(hash)) => hash,
        Some(_) => return LineState::MismatchedHash,
    };

    let command = match event.get("command") {
        None => "",
        Some(Value::String(command)) => command.as_str(),
        Some(_) => return LineState::MismatchedHash,
    };

    let empty = Map::new();
    let params = match event.get("provenance_params") {
        None => &empty,
        Some(Value::Object(params)) => params,
        Some(_) => return LineState::MismatchedHash,
    };

    if compute_execution_hash(command, params) == *stored {
        LineState::Valid
    } else {
        LineState::MismatchedHash
    }
}

/// Verify raw ledger content. `None` means the ledger does not exist.
pub fn verify_content(content: Option<&[u8]>) -> VerificationReport {
    let mut report = VerificationReport::default();

    let Some(bytes) = content else {
        warn!("Audit ledger not found, nothing to verify");
        return report.finalize();
    };
    report.ledger_present = true;

    for (number, line) in ledger_lines(bytes) {
        let state = match line {
            Ok(line) => classify_line(line),
            Err(_) => LineState::InvalidJson,
        };
        if state != LineState::Valid {
            warn!("Audit ledger line {} is {:?}", number, state);
        }
        report.record(number, state);
    }

    let report = report.finalize();
    info!("Audit ledger verification: {}", report.summary());
    report
}
