//! Request orchestration: fingerprint → cache → generate with bounded retry.
//!
//! ## Request lifecycle
//!
//! ```text
//! Start ──▶ Fingerprinted ──▶ CacheHit ─────────────────────────────────▶ Success
//!                         └─▶ CacheMiss ──▶ Invoking ──▶ Extracting ────▶ Success
//!                                  │            │            │
//!                                  │            ▼            ▼
//!                                  └────────▶ Failed ◀── Retrying ──▶ Invoking
//! ```
//!
//! * A cache hit never touches the rasterizer or the backend.
//! * On a miss, the cache's single-flight table decides whether this request
//!   leads or follows. Only the leader rasterizes and calls the backend; its
//!   work runs in a spawned task so a disconnecting client does not waste a
//!   billed generation.
//! * Only an unparseable reply is retried, up to `max_attempts` in total with
//!   exponential backoff between attempts. Backend errors and timeouts fail
//!   the request at once.
//! * Only a successfully extracted report is cached.
//!
//! A [`ReportRun`] is consumed by [`ReportRun::execute`], so a run cannot be
//! executed twice.

use crate::backend::llm::LlmBackend;
use crate::backend::{GenerationBackend, GenerationInvoker, GenerationRequest};
use crate::cache::{CacheOutcome, ResponseCache};
use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::extract::extract_report;
use crate::fingerprint::Fingerprint;
use crate::input::{InputFile, InputFileSet};
use crate::pipeline::prepare_attachments;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::prompts::{compose_prompt, ANALYSIS_PROMPT};
use crate::report::ValidatedReport;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    Fingerprinted,
    CacheHit,
    CacheMiss,
    Invoking,
    Extracting,
    Retrying,
    Success,
    Failed,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Start, Fingerprinted)
                | (Fingerprinted, CacheHit)
                | (Fingerprinted, CacheMiss)
                | (CacheHit, Success)
                | (CacheMiss, Invoking)
                // coalesced followers finish with the leader's outcome
                | (CacheMiss, Success)
                | (CacheMiss, Failed)
                | (Invoking, Extracting)
                | (Invoking, Failed)
                | (Extracting, Success)
                | (Extracting, Retrying)
                | (Extracting, Failed)
                | (Retrying, Invoking)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Success | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks and logs state transitions for one fingerprint.
#[derive(Debug)]
struct Trace {
    tag: String,
    state: RunState,
}

impl Trace {
    fn new(tag: impl Into<String>, state: RunState) -> Self {
        Self {
            tag: tag.into(),
            state,
        }
    }

    fn to(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} → {}",
            self.state,
            next
        );
        debug!("[{}] {} → {}", self.tag, self.state, next);
        self.state = next;
    }
}

/// Result of a successful verification request.
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub report: ValidatedReport,
    pub fingerprint: Fingerprint,
    pub outcome: CacheOutcome,
    /// Generation attempts made by this request. Zero for cache hits and
    /// coalesced followers.
    pub attempts: u32,
}

/// Long-lived service object: one per process, shared by every request.
#[derive(Clone)]
pub struct ReportOrchestrator {
    cache: ResponseCache,
    invoker: GenerationInvoker,
    rasterizer: Arc<dyn Rasterizer>,
    config: Arc<VerifyConfig>,
}

impl fmt::Debug for ReportOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportOrchestrator")
            .field("cache", &self.cache)
            .field("invoker", &self.invoker)
            .field("max_attempts", &self.config.max_attempts)
            .finish_non_exhaustive()
    }
}

impl ReportOrchestrator {
    /// Assemble an orchestrator with a fresh cache sized from `config`.
    pub fn new(
        config: VerifyConfig,
        backend: Arc<dyn GenerationBackend>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        let cache = ResponseCache::from_config(&config);
        Self::with_cache(config, cache, backend, rasterizer)
    }

    /// Assemble an orchestrator around an existing cache.
    pub fn with_cache(
        config: VerifyConfig,
        cache: ResponseCache,
        backend: Arc<dyn GenerationBackend>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        let invoker = GenerationInvoker::new(backend, config.api_timeout());
        Self {
            cache,
            invoker,
            rasterizer,
            config: Arc::new(config),
        }
    }

    /// Orchestrator backed by an LLM provider resolved from `config` and the
    /// environment, rendering PDFs with pdfium.
    pub fn with_llm(config: VerifyConfig) -> Result<Self, VerifyError> {
        let backend = Arc::new(LlmBackend::from_config(&config)?);
        let rasterizer = Arc::new(PdfiumRasterizer::new(&config));
        Ok(Self::new(config, backend, rasterizer))
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.invoker.backend_name()
    }

    /// Validate `files` and prepare a run.
    ///
    /// # Errors
    /// [`VerifyError::InvalidRequest`] for a bad file count or type.
    pub fn prepare(
        &self,
        files: Vec<InputFile>,
        question: Option<String>,
    ) -> Result<ReportRun, VerifyError> {
        let files = InputFileSet::new(files)?;
        Ok(ReportRun {
            orchestrator: self.clone(),
            files,
            question,
            trace: Trace::new("new", RunState::Start),
        })
    }

    /// Validate, then execute a run.
    pub async fn verify(
        &self,
        files: Vec<InputFile>,
        question: Option<String>,
    ) -> Result<ReportOutput, VerifyError> {
        self.prepare(files, question)?.execute().await
    }
}

/// One verification request, consumed by [`ReportRun::execute`].
#[derive(Debug)]
pub struct ReportRun {
    orchestrator: ReportOrchestrator,
    files: InputFileSet,
    question: Option<String>,
    trace: Trace,
}

impl ReportRun {
    pub fn state(&self) -> RunState {
        self.trace.state
    }

    /// Drive the request to a terminal state.
    pub async fn execute(mut self) -> Result<ReportOutput, VerifyError> {
        let start = Instant::now();
        let fingerprint =
            Fingerprint::of_files(&self.files).with_question(self.question.as_deref());
        self.trace.tag = fingerprint.short().to_string();
        self.trace.to(RunState::Fingerprinted);
        info!(
            "Verifying {} file(s), fingerprint {}",
            self.files.len(),
            fingerprint.short()
        );

        let orchestrator = self.orchestrator;
        let analysis = orchestrator
            .config
            .analysis_prompt
            .as_deref()
            .unwrap_or(ANALYSIS_PROMPT);
        let prompt = compose_prompt(analysis, self.question.as_deref());
        let attempts = Arc::new(AtomicU32::new(0));

        let leader = Leader {
            invoker: orchestrator.invoker.clone(),
            rasterizer: Arc::clone(&orchestrator.rasterizer),
            config: Arc::clone(&orchestrator.config),
            files: self.files,
            prompt,
            attempts: Arc::clone(&attempts),
            tag: fingerprint.short().to_string(),
        };

        let result = orchestrator
            .cache
            .get_or_generate(&fingerprint, move || leader.run())
            .await;

        let mut trace = self.trace;
        match result {
            Ok((report, outcome)) => {
                match outcome {
                    CacheOutcome::Hit => trace.to(RunState::CacheHit),
                    CacheOutcome::Generated | CacheOutcome::Coalesced => {
                        trace.to(RunState::CacheMiss)
                    }
                }
                trace.to(RunState::Success);
                let attempts = match outcome {
                    CacheOutcome::Generated => attempts.load(Ordering::SeqCst),
                    _ => 0,
                };
                info!(
                    "Report for {} ready ({}, {} attempt(s), {:?})",
                    fingerprint.short(),
                    outcome.as_str(),
                    attempts,
                    start.elapsed()
                );
                Ok(ReportOutput {
                    report,
                    fingerprint,
                    outcome,
                    attempts,
                })
            }
            Err(e) => {
                trace.to(RunState::CacheMiss);
                trace.to(RunState::Failed);
                error!("Verification of {} failed: {}", fingerprint.short(), e);
                Err(e)
            }
        }
    }
}

/// Everything the leader task needs, owned so it can outlive the caller.
struct Leader {
    invoker: GenerationInvoker,
    rasterizer: Arc<dyn Rasterizer>,
    config: Arc<VerifyConfig>,
    files: InputFileSet,
    prompt: String,
    attempts: Arc<AtomicU32>,
    tag: String,
}

impl Leader {
    async fn run(self) -> Result<ValidatedReport, VerifyError> {
        let mut trace = Trace::new(self.tag.clone(), RunState::CacheMiss);

        let attachments = match prepare_attachments(
            &self.files,
            self.invoker.payload_kind(),
            self.rasterizer.as_ref(),
        )
        .await
        {
            Ok(a) => a,
            Err(e) => {
                trace.to(RunState::Failed);
                return Err(e);
            }
        };
        let request = GenerationRequest {
            prompt: self.prompt,
            attachments,
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_raw = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                trace.to(RunState::Retrying);
                let backoff = self.config.backoff_before(attempt);
                warn!(
                    "[{}] Reply was not valid JSON; retry {}/{} after {:?}",
                    self.tag,
                    attempt - 1,
                    max_attempts - 1,
                    backoff
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }

            self.attempts.store(attempt, Ordering::SeqCst);
            trace.to(RunState::Invoking);
            let raw = match self.invoker.invoke(&request).await {
                Ok(raw) => raw,
                Err(e) => {
                    trace.to(RunState::Failed);
                    return Err(e);
                }
            };

            trace.to(RunState::Extracting);
            match extract_report(raw.as_str()) {
                Ok(report) => {
                    trace.to(RunState::Success);
                    match report.risk_rating() {
                        Some(rating) => info!("[{}] Overall risk rating: {}", self.tag, rating),
                        None => debug!("[{}] Report carries no recognisable risk rating", self.tag),
                    }
                    return Ok(report);
                }
                Err(e) => {
                    warn!("[{}] Attempt {}/{}: {}", self.tag, attempt, max_attempts, e);
                    last_raw = raw.into_inner();
                }
            }
        }

        trace.to(RunState::Failed);
        Err(VerifyError::InvalidResponseFormat {
            attempts: max_attempts,
            raw_response: if self.config.expose_raw_response {
                last_raw
            } else {
                String::new()
            },
        })
    }
}
