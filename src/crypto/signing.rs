//! Audit Signing
//!
//! HMAC-SHA256 over exported ledgers and reports. Keys are supplied by the
//! caller and never persisted; an empty key is a configuration error.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::Path;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::ProvenanceError;

type HmacSha256 = Hmac<Sha256>;

/// Read a signing key, trimming surrounding whitespace.
pub fn read_key<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ProvenanceError> {
    let path = path.as_ref();
    let raw = std::fs::read(path)
        .map_err(|e| ProvenanceError::io_context(&format!("Failed to read key {:?}", path), e))?;

    let key = raw.trim_ascii().to_vec();
    if key.is_empty() {
        return Err(ProvenanceError::EmptyKeyError);
    }
    Ok(key)
}

fn mac_for(key: &[u8], data: &[u8]) -> Result<HmacSha256, ProvenanceError> {
    if key.is_empty() {
        return Err(ProvenanceError::EmptyKeyError);
    }
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ProvenanceError::ValidationError(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac)
}

/// Lowercase hex HMAC-SHA256 of `data` under `key`.
pub fn sign_bytes(data: &[u8], key: &[u8]) -> Result<String, ProvenanceError> {
    let mac = mac_for(key, data)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `expected_hex` against the HMAC of `data`.
///
/// Surrounding whitespace in `expected_hex` is ignored. Malformed hex is a
/// failed verification, not an error.
pub fn verify_bytes(data: &[u8], key: &[u8], expected_hex: &str) -> Result<bool, ProvenanceError> {
    let actual = mac_for(key, data)?.finalize().into_bytes();

    let expected = match hex::decode(expected_hex.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Signature is not valid hex: {}", e);
            return Ok(false);
        }
    };

    // Constant-time comparison to avoid timing side-channels.
    Ok(bool::from(actual.as_slice().ct_eq(&expected)))
}

pub fn sign_file<P: AsRef<Path>, K: AsRef<Path>>(
    path: P,
    key_path: K,
) -> Result<String, ProvenanceError> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| ProvenanceError::io_context(&format!("Failed to read {:?}", path), e))?;
    let key = read_key(key_path)?;
    let signature = sign_bytes(&data, &key)?;

    debug!("Signed {:?} ({} bytes)", path, data.len());
    Ok(signature)
}

pub fn verify_file_signature<P: AsRef<Path>, K: AsRef<Path>>(
    path: P,
    key_path: K,
    expected_hex: &str,
) -> Result<bool, ProvenanceError> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| ProvenanceError::io_context(&format!("Failed to read {:?}", path), e))?;
    let key = read_key(key_path)?;
    verify_bytes(&data, &key, expected_hex)
}

/// Write a signature artifact: the hex digest followed by a newline.
pub fn write_signature<P: AsRef<Path>>(path: P, signature_hex: &str) -> Result<(), ProvenanceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProvenanceError::io_context("Failed to create signature directory", e)
            })?;
        }
    }
    std::fs::write(path, format!("{}\n", signature_hex))
        .map_err(|e| ProvenanceError::io_context("Failed to write signature", e))
}

pub fn read_signature<P: AsRef<Path>>(path: P) -> Result<String, ProvenanceError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        ProvenanceError::io_context(&format!("Failed to read signature {:?}", path), e)
    })?;
    Ok(text.trim().to_string())
}
