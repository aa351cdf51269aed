//! Stub backends and rasterizers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tradedoc_verify::pipeline::render::page_filename;
use tradedoc_verify::{
    Attachment, GenerationBackend, GenerationRequest, InputFile, PayloadKind, Rasterizer,
    ReportOrchestrator, VerifyConfig, VerifyError,
};

/// A well-formed report with a Red rating, as a model would emit it.
pub const REPORT: &str = r#"{
  "letter_of_credit": {
    "extracted_details": {"lc_number": "LC-2024-001"},
    "validation_status": "pass",
    "errors": [],
    "comments": "Terms consistent.",
    "stamp_present": true,
    "signature_present": true
  },
  "final_summary": {
    "overall_risk_rating": "Red (High Risk)",
    "key_discrepancies": ["Invoice amount exceeds LC amount"],
    "notes_and_warnings": "Refer to trade operations."
  }
}"#;

/// The same report wrapped the way models like to wrap it.
pub fn chatty(report: &str) -> String {
    format!("Sure! Here is the verification report:\n```json\n{report}\n```\nLet me know if you need anything else.")
}

/// Backend that replays a script of replies, then repeats a fallback.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, VerifyError>>>,
    fallback: Result<String, VerifyError>,
    delay: Duration,
    kind: PayloadKind,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn always(reply: Result<String, VerifyError>) -> Self {
        Self::scripted(Vec::new(), reply)
    }

    pub fn scripted(
        script: Vec<Result<String, VerifyError>>,
        fallback: Result<String, VerifyError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            kind: PayloadKind::PageImages,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_payload(mut self, kind: PayloadKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn payload_kind(&self) -> PayloadKind {
        self.kind
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Rasterizer that turns every PDF into `pages` fake PNGs.
pub struct StubRasterizer {
    pages: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl StubRasterizer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: 0,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rasterizer for StubRasterizer {
    async fn rasterize(&self, file: &InputFile) -> Result<Vec<Attachment>, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VerifyError::Rasterization {
                filename: file.filename.clone(),
                detail: "corrupt xref table".into(),
            });
        }
        Ok((1..=self.pages)
            .map(|n| {
                Attachment::new(
                    page_filename(&file.filename, n),
                    "image/png",
                    vec![0x89, b'P', b'N', b'G', n as u8],
                )
            })
            .collect())
    }
}

pub fn pdf(name: &str, body: &str) -> InputFile {
    InputFile::new(
        name,
        Some("application/pdf".into()),
        format!("%PDF-1.7\n{body}").into_bytes(),
    )
}

pub fn test_config() -> VerifyConfig {
    VerifyConfig::builder()
        .retry_backoff_ms(10)
        .api_timeout_secs(30)
        .build()
        .unwrap()
}

/// Route library logs through the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn orchestrator(
    config: VerifyConfig,
    backend: &Arc<ScriptedBackend>,
    rasterizer: &Arc<StubRasterizer>,
) -> ReportOrchestrator {
    init_tracing();
    ReportOrchestrator::new(config, backend.clone(), rasterizer.clone())
}
