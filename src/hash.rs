// src/hash.rs

//! Content hashing and the collision naming rule
//!
//! Every file is identified by the SHA-256 digest of its bytes, computed once
//! at discovery. The first six hex characters of that digest double as the
//! disambiguator whenever two files would land on the same name:
//!
//! | Situation | Result |
//! |-----------|--------|
//! | rename after extension mismatch | `photo_1a2b3c.jpg` |
//! | scratch directory for a conversion | `photo_1a2b3c/` |
//! | relocation onto an occupied path | `photo_1a2b3c.tif` |

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Number of hex characters used for collision suffixes and scratch names
pub const PREFIX_LEN: usize = 6;

/// Compute the SHA-256 of a byte slice as lowercase hex
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 of everything a reader yields
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the SHA-256 of a file, streaming its content
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    sha256_reader(&mut file)
}

/// First [`PREFIX_LEN`] characters of a hex digest
#[inline]
pub fn hash_prefix(hash: &str) -> &str {
    let end = hash
        .char_indices()
        .nth(PREFIX_LEN)
        .map(|(i, _)| i)
        .unwrap_or(hash.len());
    &hash[..end]
}

/// Digest mismatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sha256 mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for VerifyError {}

/// Verify bytes against an expected SHA-256 (case-insensitive)
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<(), VerifyError> {
    let actual = sha256_bytes(data);
    if actual == expected.trim().to_lowercase() {
        Ok(())
    } else {
        Err(VerifyError {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// Insert `_<hash prefix>` between a file's stem and its extension
///
/// `dir/clip.mp4` with hash `abcdef12...` becomes `dir/clip_abcdef.mp4`.
/// Files without an extension simply get the suffix appended.
pub fn suffixed_name(path: &Path, hash: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, hash_prefix(hash), ext.to_string_lossy()),
        None => format!("{}_{}", stem, hash_prefix(hash)),
    };
    path.with_file_name(name)
}

/// Apply the collision rule: keep `target` if free, otherwise suffix it
pub fn resolve_collision(target: &Path, hash: &str) -> PathBuf {
    if target.exists() {
        suffixed_name(target, hash)
    } else {
        target.to_path_buf()
    }
}
