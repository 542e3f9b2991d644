use thiserror::Error;

impl From<serde_json::Error> for ProvenanceError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for ProvenanceError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<sqlx::Error> for ProvenanceError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(format!("Database error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Audit ledger is empty: {0}")]
    LedgerEmpty(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Signing key is empty")]
    EmptyKeyError,

    #[error("Execution already exists: {0}")]
    DuplicateExecutionError(String),

    #[error("Execution id not found: {0}")]
    ExecutionNotFoundError(String),

    #[error("Record references unknown execution: {0}")]
    DanglingReferenceError(String),

    #[error("Execution already finished: {0}")]
    AlreadyFinishedError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProvenanceError {
    pub fn io_context(context: &str, err: std::io::Error) -> Self {
        Self::IoError(format!("{}: {}", context, err))
    }
}
