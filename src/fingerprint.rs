//! Content fingerprints used as response-cache keys.
//!
//! A fingerprint is the SHA-256 hex digest of every input file, joined in the
//! order the caller supplied them:
//!
//! ```text
//! <sha256(file 1)>-<sha256(file 2)>[-q<sha256(question)>]
//! ```
//!
//! Filenames and content types never enter the hash, so re-uploading the same
//! bytes under a different name hits the cache. Order does matter: `{A, B}`
//! and `{B, A}` are different requests to the backend and get different keys.

use crate::error::VerifyError;
use crate::input::InputFileSet;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

/// Chunk size used when streaming file content through the hasher.
pub const CHUNK_SIZE: usize = 8192;

const SEPARATOR: char = '-';

/// Deterministic identifier for an ordered set of files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a validated file set.
    pub fn of_files(files: &InputFileSet) -> Self {
        let digests: Vec<String> = files.iter().map(|(f, _)| digest_bytes(&f.data)).collect();
        Self(digests.join(&SEPARATOR.to_string()))
    }

    /// Fingerprint arbitrary readers, streaming each in [`CHUNK_SIZE`] chunks.
    ///
    /// # Errors
    /// [`VerifyError::Io`] if any reader fails. No partial fingerprint is
    /// returned.
    pub fn from_readers<R, I>(readers: I) -> Result<Self, VerifyError>
    where
        R: Read,
        I: IntoIterator<Item = R>,
    {
        let digests = readers
            .into_iter()
            .map(digest_reader)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(digests.join(&SEPARATOR.to_string())))
    }

    /// Scope the fingerprint to a per-request question.
    ///
    /// Blank questions leave the fingerprint unchanged.
    pub fn with_question(self, question: Option<&str>) -> Self {
        match question.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => Self(format!("{}{SEPARATOR}q{}", self.0, digest_bytes(q.as_bytes()))),
            None => self,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 hex digest of a reader, consumed in fixed-size chunks.
pub fn digest_reader<R: Read>(mut reader: R) -> Result<String, VerifyError> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 hex digest of an in-memory buffer, fed in [`CHUNK_SIZE`] chunks.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    for chunk in data.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint files on disk without blocking the async runtime.
pub async fn fingerprint_paths(paths: Vec<PathBuf>) -> Result<Fingerprint, VerifyError> {
    tokio::task::spawn_blocking(move || {
        let readers = paths
            .iter()
            .map(std::fs::File::open)
            .collect::<Result<Vec<_>, _>>()?;
        Fingerprint::from_readers(readers)
    })
    .await
    .map_err(|e| VerifyError::Internal(format!("Fingerprint task panicked: {}", e)))?
}
