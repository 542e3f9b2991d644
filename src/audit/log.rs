//! Append-only log backends
//!
//! The ledger never touches a path directly; it is handed an [`AppendLog`]
//! so a file on disk and an in-memory buffer are interchangeable.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::Utf8Error;
use std::sync::Mutex;

use crate::error::ProvenanceError;

pub trait AppendLog: Send + Sync {
    /// Append one line. A trailing newline is added.
    fn append_line(&self, line: &str) -> Result<(), ProvenanceError>;

    /// Entire content, or `None` when the log has never been created.
    fn read_all(&self) -> Result<Option<Vec<u8>>, ProvenanceError>;

    /// Human-readable location used in reports.
    fn location(&self) -> String;

    /// Most recent non-blank line.
    fn read_last_line(&self) -> Result<Option<String>, ProvenanceError> {
        let Some(bytes) = self.read_all()? else {
            return Ok(None);
        };
        match ledger_lines(&bytes).last() {
            None => Ok(None),
            Some((_, Ok(line))) => Ok(Some(line.to_string())),
            Some((number, Err(e))) => Err(ProvenanceError::SerializationError(format!(
                "line {} is not valid UTF-8: {}",
                number, e
            ))),
        }
    }
}

/// Non-blank lines of raw log content with 1-based line numbers. Lines are
/// decoded one at a time; a line that is not UTF-8 comes back as `Err`.
pub fn ledger_lines(
    bytes: &[u8],
) -> impl Iterator<Item = (usize, Result<&str, Utf8Error>)> + '_ {
    bytes
        .split(|byte| *byte == b'\n')
        .enumerate()
        .map(|(index, raw)| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            (index + 1, std::str::from_utf8(raw))
        })
        .filter(|(_, line)| !matches!(line, Ok(text) if text.trim().is_empty()))
}

/// Newline-delimited log file on disk
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AppendLog for FileLog {
    fn append_line(&self, line: &str) -> Result<(), ProvenanceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ProvenanceError::io_context("Failed to create log directory", e)
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ProvenanceError::io_context("Failed to open audit log file", e))?;

        writeln!(file, "{}", line)
            .map_err(|e| ProvenanceError::io_context("Failed to write to audit log", e))?;
        file.flush()
            .map_err(|e| ProvenanceError::io_context("Failed to flush audit log", e))?;

        Ok(())
    }

    fn read_all(&self) -> Result<Option<Vec<u8>>, ProvenanceError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProvenanceError::io_context("Failed to read audit log", e)),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process log, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryLog {
    content: Mutex<Option<Vec<u8>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing raw content, damaged lines included.
    pub fn from_text(text: &str) -> Self {
        Self {
            content: Mutex::new(Some(text.as_bytes().to_vec())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Vec<u8>>>, ProvenanceError> {
        self.content
            .lock()
            .map_err(|_| ProvenanceError::IoError("memory log lock poisoned".to_string()))
    }
}

impl AppendLog for MemoryLog {
    fn append_line(&self, line: &str) -> Result<(), ProvenanceError> {
        let mut content = self.lock()?;
        let buffer = content.get_or_insert_with(Vec::new);
        buffer.extend_from_slice(line.as_bytes());
        buffer.push(b'\n');
        Ok(())
    }

    fn read_all(&self) -> Result<Option<Vec<u8>>, ProvenanceError> {
        Ok(self.lock()?.clone())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
