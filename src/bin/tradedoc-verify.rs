//! Server binary for tradedoc-verify.
//!
//! A thin shim over the library crate that maps CLI flags to `VerifyConfig`,
//! then either serves the HTTP API or verifies files given on the command
//! line and prints the report.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tradedoc_verify::backend::llm::LlmBackend;
use tradedoc_verify::backend::proxy::HttpProxyBackend;
use tradedoc_verify::backend::GenerationBackend;
use tradedoc_verify::pipeline::render::PdfiumRasterizer;
use tradedoc_verify::server::{self, DEFAULT_BODY_LIMIT};
use tradedoc_verify::{InputFile, ReportOrchestrator, VerifyConfig};

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the API on port 8000 using whichever LLM key is in the environment
  tradedoc-verify serve --port 8000

  # Forward uploads to a content-generation service instead
  tradedoc-verify serve --backend proxy --proxy-url http://gen.internal/generate

  # Verify two documents once and print the report
  tradedoc-verify check lc.pdf invoice.pdf > report.json

  # Upload with curl
  curl -F files=@lc.pdf -F files=@invoice.pdf http://localhost:8000/validate-trade-finance

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Verify trade-finance documents with a multimodal LLM.
#[derive(Parser, Debug)]
#[command(
    name = "tradedoc-verify",
    version,
    about = "Verify trade-finance documents with a multimodal LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Verify one or two files and print the report as JSON.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "TDV_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "TDV_PORT", default_value_t = 8000)]
    port: u16,

    /// Maximum request body size in bytes.
    #[arg(long, env = "TDV_BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
    body_limit: usize,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// One or two PDF / PNG / JPEG files.
    #[arg(required = true, num_args = 1..=2)]
    files: Vec<PathBuf>,

    /// Extra question for the reviewer model.
    #[arg(long)]
    question: Option<String>,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Generation backend.
    #[arg(long, global = true, env = "TDV_BACKEND", value_enum, default_value = "llm")]
    backend: BackendArg,

    /// Content-generation endpoint for `--backend proxy`.
    #[arg(long, global = true, env = "TDV_PROXY_URL")]
    proxy_url: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, gemini-2.0-flash).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, global = true, env = "TDV_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Directory containing the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Maximum cached reports.
    #[arg(long, global = true, env = "TDV_CACHE_CAPACITY", default_value_t = 100)]
    cache_capacity: usize,

    /// Cache time-to-live in seconds.
    #[arg(long, global = true, env = "TDV_CACHE_TTL", default_value_t = 432_000)]
    cache_ttl: u64,

    /// Generation attempts when the reply is not valid JSON.
    #[arg(long, global = true, env = "TDV_MAX_ATTEMPTS", default_value_t = 2)]
    max_attempts: u32,

    /// Backend call timeout in seconds.
    #[arg(long, global = true, env = "TDV_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "TDV_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Leave the raw backend text out of error bodies.
    #[arg(long, global = true, env = "TDV_HIDE_RAW_RESPONSE")]
    hide_raw_response: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TDV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TDV_QUIET")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    Llm,
    Proxy,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.common.verbose {
        "debug"
    } else if cli.common.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.common).await?;
    let orchestrator = build_orchestrator(&cli.common, config)?;

    match cli.command {
        Command::Serve(args) => serve(args, orchestrator).await,
        Command::Check(args) => check(args, orchestrator).await,
    }
}

async fn serve(args: ServeArgs, orchestrator: ReportOrchestrator) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "Listening on http://{} (backend: {}, docs at /api-docs)",
        addr,
        orchestrator.backend_name()
    );

    let app = server::app(orchestrator, args.body_limit);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn check(args: CheckArgs, orchestrator: ReportOrchestrator) -> Result<()> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        files.push(InputFile::new(filename, None, data));
    }

    let output = orchestrator
        .verify(files, args.question)
        .await
        .context("Verification failed")?;

    let json =
        serde_json::to_string_pretty(&output.report).context("Failed to serialise report")?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}").context("Failed to write to stdout")?;

    match output.report.risk_rating() {
        Some(rating) => info!("Overall risk rating: {}", rating),
        None => warn!("Report has no recognisable overall risk rating"),
    }
    Ok(())
}

/// Map CLI flags onto [`VerifyConfig`].
async fn build_config(cli: &CommonArgs) -> Result<VerifyConfig> {
    let mut builder = VerifyConfig::builder()
        .dpi(cli.dpi)
        .cache_capacity(cli.cache_capacity)
        .cache_ttl_secs(cli.cache_ttl)
        .max_attempts(cli.max_attempts)
        .api_timeout_secs(cli.api_timeout)
        .expose_raw_response(!cli.hide_raw_response);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref dir) = cli.pdfium_lib_path {
        builder = builder.pdfium_library_dir(dir);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn build_orchestrator(cli: &CommonArgs, config: VerifyConfig) -> Result<ReportOrchestrator> {
    let rasterizer = PdfiumRasterizer::new(&config);

    let backend: Arc<dyn GenerationBackend> = match cli.backend {
        BackendArg::Llm => {
            if let Err(e) = rasterizer.probe() {
                warn!("{}", e);
            }
            Arc::new(LlmBackend::from_config(&config).context("Failed to set up LLM backend")?)
        }
        BackendArg::Proxy => {
            let Some(ref url) = cli.proxy_url else {
                bail!("--proxy-url is required with --backend proxy");
            };
            Arc::new(
                HttpProxyBackend::new(url, config.api_timeout())
                    .context("Failed to set up proxy backend")?,
            )
        }
    };

    Ok(ReportOrchestrator::new(config, backend, Arc::new(rasterizer)))
}
