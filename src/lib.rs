pub mod audit;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod provenance;

pub use audit::{AuditEvent, AuditLedger, VerificationReport};
pub use database::ProvenanceStore;
pub use error::ProvenanceError;
