//! Error types for the tradedoc-verify library.
//!
//! Two error types reflect two distinct failure scopes:
//!
//! * [`VerifyError`] — **Request-level**: the verification request failed and
//!   the caller receives a structured error body. Every component error ends up
//!   here; the orchestrator maps nothing away.
//!
//! * [`ExtractError`] — **Attempt-level**: one backend reply could not be
//!   turned into a JSON object. The orchestrator retries on it, and only turns
//!   it into [`VerifyError::InvalidResponseFormat`] once the retry budget is
//!   spent.
//!
//! `VerifyError` is `Clone` because coalesced callers waiting on the same
//! fingerprint all receive the leader's failure, not just the leader.

use thiserror::Error;

/// All errors surfaced by a verification request.
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Wrong number of files, unsupported file type, unreadable multipart body.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Rasterization errors ──────────────────────────────────────────────
    /// pdfium could not open or render a PDF.
    #[error("Rasterization failed for '{filename}': {detail}")]
    Rasterization { filename: String, detail: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// Transport, authentication or HTTP status failure talking to the
    /// generation backend. Never retried.
    #[error("Generation backend error: {0}")]
    Backend(String),

    /// The backend did not answer within the configured bound. Never retried.
    #[error("Generation backend timed out after {secs}s")]
    BackendTimeout { secs: u64 },

    /// Every attempt produced text that could not be parsed as a JSON object.
    #[error("Invalid JSON format in API response after {attempts} attempt(s)")]
    InvalidResponseFormat { attempts: u32, raw_response: String },

    // ── Local errors ──────────────────────────────────────────────────────
    /// Reading or writing a local file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error (task panic, poisoned state).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerifyError {
    /// Stable machine-readable code, used as the `error` field of HTTP error
    /// bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::InvalidRequest(_) => "invalid_request",
            VerifyError::Rasterization { .. } => "rasterization_error",
            VerifyError::Backend(_) => "backend_error",
            VerifyError::BackendTimeout { .. } => "backend_timeout",
            VerifyError::InvalidResponseFormat { .. } => "invalid_response_format",
            VerifyError::Io(_) => "io_error",
            VerifyError::InvalidConfig(_) => "invalid_config",
            VerifyError::Internal(_) => "internal_error",
        }
    }

    /// The raw backend text attached to a parse failure, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            VerifyError::InvalidResponseFormat { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VerifyError {
    fn from(e: std::io::Error) -> Self {
        VerifyError::Io(e.to_string())
    }
}

/// Failure of the tolerant JSON extractor on a single backend reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// No normalisation stage produced text that parses as a JSON object.
    #[error("Malformed response: {detail}")]
    MalformedResponse { detail: String },
}
