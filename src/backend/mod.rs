//! Generation backends and the timeout-bounded invoker.
//!
//! A backend turns a prompt plus a handful of attachments into free text. It
//! knows nothing about JSON, caching or retries: those live in the
//! orchestrator. Two implementations ship with the crate:
//!
//! * [`llm::LlmBackend`] calls a multimodal model directly through an
//!   `edgequake-llm` provider and wants rendered page images.
//! * [`proxy::HttpProxyBackend`] forwards the original uploads to a
//!   content-generation HTTP service that does its own rendering.
//!
//! ```text
//! orchestrator ──▶ GenerationInvoker ──timeout──▶ dyn GenerationBackend
//!                                                  ├─ LlmBackend   (page images)
//!                                                  └─ HttpProxyBackend (original files)
//! ```

pub mod llm;
pub mod proxy;

use crate::error::VerifyError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// What a backend expects as attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// One PNG per PDF page; image uploads pass through.
    PageImages,
    /// The uploads exactly as received.
    OriginalFiles,
}

/// A binary attachment sent alongside the prompt.
#[derive(Clone)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// One generation call's input.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
}

/// Untrusted text returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGenerationResponse(pub String);

impl RawGenerationResponse {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A multimodal text generator.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Which attachments this backend wants.
    fn payload_kind(&self) -> PayloadKind;

    /// Perform one generation call. Implementations must not retry.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, VerifyError>;
}

/// Calls a backend once, bounded by a timeout.
#[derive(Clone)]
pub struct GenerationInvoker {
    backend: Arc<dyn GenerationBackend>,
    timeout: Duration,
}

impl fmt::Debug for GenerationInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationInvoker")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GenerationInvoker {
    pub fn new(backend: Arc<dyn GenerationBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.backend.payload_kind()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` to the backend.
    ///
    /// # Errors
    /// * [`VerifyError::BackendTimeout`] if no answer arrives within the bound.
    /// * Whatever the backend returns, typically [`VerifyError::Backend`].
    pub async fn invoke(
        &self,
        request: &GenerationRequest,
    ) -> Result<RawGenerationResponse, VerifyError> {
        let start = Instant::now();
        debug!(
            "Invoking '{}' with {} attachment(s), prompt {} chars",
            self.backend.name(),
            request.attachments.len(),
            request.prompt.len()
        );

        let text = match tokio::time::timeout(self.timeout, self.backend.generate(request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!("Backend '{}' failed: {}", self.backend.name(), e);
                return Err(e);
            }
            Err(_) => {
                error!(
                    "Backend '{}' timed out after {:?}",
                    self.backend.name(),
                    self.timeout
                );
                return Err(VerifyError::BackendTimeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        debug!(
            "Backend '{}' answered {} chars in {:?}",
            self.backend.name(),
            text.len(),
            start.elapsed()
        );
        Ok(RawGenerationResponse(text))
    }
}
