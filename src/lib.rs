//! # tradedoc-verify
//!
//! Verify trade-finance documents (letters of credit, invoices, bills of
//! lading, certificates) with a multimodal LLM and return a structured report
//! with a Red / Amber / Green risk rating.
//!
//! ## Why this crate?
//!
//! Each verification is a slow, billed call to a model whose output is only
//! *usually* JSON. The crate wraps that call in the machinery a production
//! service needs:
//!
//! * a content-addressed response cache (TTL + LRU), so re-uploads are free;
//! * single-flight coalescing, so concurrent identical uploads share one call;
//! * a tolerant extractor that digs the JSON object out of prose, code fences
//!   and broken escapes, with a bounded retry when it cannot.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (1–2 files)
//!  │
//!  ├─ 1. Validate     file count, PDF / PNG / JPEG detection
//!  ├─ 2. Fingerprint  SHA-256 per file, joined in order
//!  ├─ 3. Cache        hit → done; in flight → wait; else lead
//!  ├─ 4. Render       PDF pages → PNG via pdfium (leader only)
//!  ├─ 5. Generate     LLM provider or HTTP proxy, timeout-bounded
//!  ├─ 6. Extract      tolerant JSON recovery, retry on failure
//!  └─ 7. Store        cache the validated report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tradedoc_verify::{InputFile, ReportOrchestrator, VerifyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let orchestrator = ReportOrchestrator::with_llm(VerifyConfig::default())?;
//!     let lc = InputFile::new("lc.pdf", None, std::fs::read("lc.pdf")?);
//!     let output = orchestrator.verify(vec![lc], None).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | HTTP server module and the `tradedoc-verify` binary (axum + clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod input;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod report;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    Attachment, GenerationBackend, GenerationInvoker, GenerationRequest, PayloadKind,
    RawGenerationResponse,
};
pub use cache::{CacheOutcome, ResponseCache};
pub use config::{VerifyConfig, VerifyConfigBuilder};
pub use error::{ExtractError, VerifyError};
pub use extract::extract_report;
pub use fingerprint::Fingerprint;
pub use input::{DocumentKind, InputFile, InputFileSet};
pub use orchestrator::{ReportOrchestrator, ReportOutput, ReportRun, RunState};
pub use pipeline::render::Rasterizer;
pub use report::{RiskRating, ValidatedReport};
