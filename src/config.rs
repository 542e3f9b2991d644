use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::ProvenanceError;

pub const DEFAULT_AUDIT_FILE: &str = ".helixsh_audit.jsonl";
pub const DEFAULT_DATABASE_PATH: &str = ".helixsh/provenance.sqlite";
pub const DEFAULT_LOG_FILTER: &str = "helixsh_audit=info";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub audit_file: PathBuf,
    pub database_path: PathBuf,
    pub signing_key_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audit_file: PathBuf::from(DEFAULT_AUDIT_FILE),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            signing_key_path: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ProvenanceError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. `load` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvenanceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let audit_file = required_path(&lookup, "HELIXSH_AUDIT_FILE", DEFAULT_AUDIT_FILE)?;
        let database_path = required_path(&lookup, "HELIXSH_DB", DEFAULT_DATABASE_PATH)?;

        let signing_key_path = lookup("HELIXSH_SIGNING_KEY")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let log_filter = lookup("HELIXSH_LOG")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(AppConfig {
            audit_file,
            database_path,
            signing_key_path,
            log_filter,
        })
    }
}

fn required_path<F>(lookup: &F, key: &str, default: &str) -> Result<PathBuf, ProvenanceError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(PathBuf::from(default)),
        Some(value) if value.trim().is_empty() => Err(ProvenanceError::ConfigError(format!(
            "{} is set but empty",
            key
        ))),
        Some(value) => Ok(PathBuf::from(value)),
    }
}
