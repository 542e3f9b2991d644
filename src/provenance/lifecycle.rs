//! Execution context helpers: input hashing and execution ids.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::error::ProvenanceError;
use crate::provenance::sha256_hex;

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub working_dir: String,
    pub container_digest: Option<String>,
    pub input_hash: String,
    pub agent: Option<String>,
    pub timestamp: String,
}

impl ExecutionContext {
    /// Create a context with a fresh execution id.
    pub fn create<P: AsRef<Path>>(
        working_dir: &str,
        input_files: &[P],
        agent: Option<String>,
        container_digest: Option<String>,
    ) -> Result<Self, ProvenanceError> {
        let input_hash = if input_files.is_empty() {
            sha256_hex(b"")
        } else {
            hash_inputs(input_files)?
        };

        let context = Self {
            execution_id: Uuid::new_v4().to_string(),
            working_dir: working_dir.to_string(),
            container_digest,
            input_hash,
            agent,
            timestamp: Utc::now().to_rfc3339(),
        };

        debug!(
            "Created execution context {} over {} input(s)",
            context.execution_id,
            input_files.len()
        );
        Ok(context)
    }
}

/// Streaming SHA-256 of a file.
pub fn sha256_file<P: AsRef<Path>>(path: P) -> Result<String, ProvenanceError> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .map_err(|e| ProvenanceError::io_context(&format!("Failed to open {:?}", path), e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| ProvenanceError::io_context(&format!("Failed to read {:?}", path), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Combined hash over a set of input files.
///
/// Files are visited in path order; each contributes its absolute path and
/// its content digest.
pub fn hash_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<String, ProvenanceError> {
    // Plain string order, not component order: `a-b/x` sorts before `a/b`.
    let mut sorted: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
    sorted.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    let mut hasher = Sha256::new();
    for path in sorted {
        let absolute = std::fs::canonicalize(path)
            .map_err(|e| ProvenanceError::io_context(&format!("Failed to resolve {:?}", path), e))?;
        hasher.update(absolute.to_string_lossy().as_bytes());
        hasher.update(sha256_file(path)?.as_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn file_size_bytes<P: AsRef<Path>>(path: P) -> Result<u64, ProvenanceError> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .map_err(|e| ProvenanceError::io_context(&format!("Failed to stat {:?}", path), e))?;
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sha256_file_matches_in_memory_digest() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("input.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), sha256_hex(b"abc"));
        assert_eq!(file_size_bytes(&path).unwrap(), 3);
    }

    #[test]
    fn test_hash_inputs_is_order_independent() {
        let temp_dir = tempdir().unwrap();
        let a = temp_dir.path().join("a.fastq");
        let b = temp_dir.path().join("b.fastq");
        std::fs::write(&a, b"ACGT").unwrap();
        std::fs::write(&b, b"TTGA").unwrap();

        let forward = hash_inputs(&[&a, &b]).unwrap();
        let backward = hash_inputs(&[&b, &a]).unwrap();
        assert_eq!(forward, backward);

        std::fs::write(&b, b"TTGC").unwrap();
        assert_ne!(hash_inputs(&[&a, &b]).unwrap(), forward);
    }

    #[test]
    fn test_hash_inputs_sorts_by_path_text() {
        let temp_dir = tempdir().unwrap();
        let nested = temp_dir.path().join("a/b");
        let dashed = temp_dir.path().join("a-b/x");
        std::fs::create_dir_all(nested.parent().unwrap()).unwrap();
        std::fs::create_dir_all(dashed.parent().unwrap()).unwrap();
        std::fs::write(&nested, b"ACGT").unwrap();
        std::fs::write(&dashed, b"TTGA").unwrap();

        let mut expected = Sha256::new();
        for path in [&dashed, &nested] {
            expected.update(std::fs::canonicalize(path).unwrap().to_string_lossy().as_bytes());
            expected.update(sha256_file(path).unwrap().as_bytes());
        }

        assert_eq!(
            hash_inputs(&[&nested, &dashed]).unwrap(),
            hex::encode(expected.finalize())
        );
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("missing.csv");
        assert!(matches!(
            hash_inputs(&[missing]),
            Err(ProvenanceError::IoError(_))
        ));
    }

    #[test]
    fn test_context_without_inputs_hashes_empty() {
        let no_inputs: [&Path; 0] = [];
        let context = ExecutionContext::create("/work", &no_inputs, Some("claude".into()), None).unwrap();
        assert_eq!(
            context.input_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(context.agent.as_deref(), Some("claude"));
        assert!(Uuid::parse_str(&context.execution_id).is_ok());
    }

    #[test]
    fn test_contexts_get_distinct_ids() {
        let no_inputs: [&Path; 0] = [];
        let first = ExecutionContext::create("/work", &no_inputs, None, None).unwrap();
        let second = ExecutionContext::create("/work", &no_inputs, None, None).unwrap();
        assert_ne!(first.execution_id, second.execution_id);
    }
}
