//! Configuration for the verification pipeline.
//!
//! Every knob lives in [`VerifyConfig`], built via [`VerifyConfigBuilder`].
//! The same struct feeds the response cache, the rasterizer, the LLM backend
//! and the retry loop, so one value describes a whole deployment.

use crate::error::VerifyError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default cache capacity (entries).
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default cache time-to-live: 5 days.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 432_000;

/// Configuration for a verification deployment.
///
/// # Example
/// ```rust
/// use tradedoc_verify::VerifyConfig;
///
/// let config = VerifyConfig::builder()
///     .cache_capacity(50)
///     .max_attempts(3)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Clone)]
pub struct VerifyConfig {
    /// Maximum number of cached reports. Default: 100.
    pub cache_capacity: usize,

    /// Age after which a cached report is treated as absent. Default: 5 days.
    pub cache_ttl_secs: u64,

    /// Total generation attempts per request when the reply is not valid
    /// JSON. Default: 2.
    ///
    /// Only parse failures consume this budget. Transport failures and
    /// timeouts fail the request on the first occurrence.
    pub max_attempts: u32,

    /// Initial delay between parse retries in milliseconds (doubles per
    /// attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Upper bound on a single backend call in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Rendering DPI for PDF pages. Range: 72–400. Default: 300.
    pub dpi: u32,

    /// Cap on the longest edge of a rendered page in pixels. Default: 3000.
    ///
    /// A 300-DPI render of an A4 page is roughly 2480 × 3508 px; the cap keeps
    /// oversized pages (A3 bills of lading, posters) from exhausting memory.
    pub max_rendered_pixels: u32,

    /// Directory holding the pdfium shared library. If None, the system
    /// library search path is used.
    pub pdfium_library_dir: Option<PathBuf>,

    /// LLM model identifier. If None, the provider default applies.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "vertexai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum output tokens per generation. Default: 8192.
    ///
    /// The full eight-document report with per-field extraction regularly
    /// exceeds 4 000 tokens; truncation produces unparseable JSON.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Custom analysis instruction. If None, uses the built-in default.
    pub analysis_prompt: Option<String>,

    /// Attach the raw backend text to `InvalidResponseFormat` error bodies.
    /// Default: true.
    pub expose_raw_response: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_attempts: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            dpi: 300,
            max_rendered_pixels: 3000,
            pdfium_library_dir: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            system_prompt: None,
            analysis_prompt: None,
            expose_raw_response: true,
        }
    }
}

impl fmt::Debug for VerifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyConfig")
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_dir", &self.pdfium_library_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("expose_raw_response", &self.expose_raw_response)
            .finish()
    }
}

impl VerifyConfig {
    /// Create a new builder for `VerifyConfig`.
    pub fn builder() -> VerifyConfigBuilder {
        VerifyConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Backoff before attempt number `attempt` (1-indexed; attempt 1 has none).
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.retry_backoff_ms == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 2);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Builder for [`VerifyConfig`].
#[derive(Debug)]
pub struct VerifyConfigBuilder {
    config: VerifyConfig,
}

impl VerifyConfigBuilder {
    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.config.cache_capacity = n;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_dir = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn analysis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.analysis_prompt = Some(prompt.into());
        self
    }

    pub fn expose_raw_response(mut self, v: bool) -> Self {
        self.config.expose_raw_response = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<VerifyConfig, VerifyError> {
        let c = &self.config;
        if c.cache_capacity == 0 {
            return Err(VerifyError::InvalidConfig(
                "Cache capacity must be ≥ 1".into(),
            ));
        }
        if c.cache_ttl_secs == 0 {
            return Err(VerifyError::InvalidConfig(
                "Cache TTL must be ≥ 1 second".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(VerifyError::InvalidConfig(
                "At least one generation attempt is required".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(VerifyError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let c = VerifyConfig::default();
        assert_eq!(c.cache_capacity, 100);
        assert_eq!(c.cache_ttl_secs, 432_000);
        assert_eq!(c.max_attempts, 2);
        assert_eq!(c.temperature, 0.0);
        assert!(c.expose_raw_response);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = VerifyConfig::builder().dpi(1200).build().unwrap();
        assert_eq!(c.dpi, 400);
        let c = VerifyConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn build_rejects_zero_attempts() {
        let err = VerifyConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, VerifyError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_zero_capacity() {
        assert!(VerifyConfig::builder().cache_capacity(0).build().is_err());
    }

    #[test]
    fn backoff_doubles_from_second_attempt() {
        let c = VerifyConfig::builder().retry_backoff_ms(100).build().unwrap();
        assert_eq!(c.backoff_before(1), Duration::ZERO);
        assert_eq!(c.backoff_before(2), Duration::from_millis(100));
        assert_eq!(c.backoff_before(3), Duration::from_millis(200));
        assert_eq!(c.backoff_before(4), Duration::from_millis(400));
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", VerifyConfig::default());
        assert!(dbg.contains("cache_capacity"));
        assert!(!dbg.contains("system_prompt"));
    }
}
