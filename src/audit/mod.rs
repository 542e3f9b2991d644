//! Audit Ledger System
//!
//! Tamper-evident record of every planned or executed command, with
//! per-line integrity verification and reproducible export.

pub mod event;
pub mod export;
pub mod ledger;
pub mod log;
pub mod verify;

pub use event::AuditEvent;
pub use export::ExportReport;
pub use ledger::AuditLedger;
pub use log::{ledger_lines, AppendLog, FileLog, MemoryLog};
pub use verify::{classify_line, verify_content, LineIssue, LineState, VerificationReport};
