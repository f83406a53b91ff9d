//! CLI binary for edgequake-pdf2quiz.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `process` runs one document and prints the JSON result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2quiz::pipeline::input::load_input;
use edgequake_pdf2quiz::server::{serve, DEFAULT_MAX_UPLOAD_BYTES};
use edgequake_pdf2quiz::{
    resolve_backend, write_json, AzureOpenAiConfig, BackendSettings, BackfillPolicy, OutputShape,
    PdfiumExtractor, PipelineConfig, ProcessOutput, Processor, ProgressCallback,
    SegmentProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per segment.
/// Segments may finish out of order when `--concurrency > 1`.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    retries: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` tells us how many segments there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            retries: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} segments  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, segment: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&segment)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl SegmentProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_segments: usize) {
        self.activate_bar(total_segments);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Generating from {total_segments} segments…"))
        ));
    }

    fn on_segment_start(&self, segment: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(segment, Instant::now());
        self.bar.set_message(format!("segment {}", segment + 1));
    }

    fn on_attempt_failed(&self, segment: usize, attempt: u32, reason: &str) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Segment {:>3}  attempt {} failed: {}",
            yellow("↻"),
            segment + 1,
            attempt,
            dim(&truncate(reason, 80)),
        ));
    }

    fn on_segment_complete(&self, segment: usize, total: usize, attempts: u32) {
        let secs = self.elapsed_secs(segment);
        let tries = if attempts == 1 {
            String::new()
        } else {
            format!("{attempts} attempts")
        };
        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            segment + 1,
            total,
            dim(&tries),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_segment_error(&self, segment: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(segment);
        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {}  {}",
            red("✗"),
            segment + 1,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_segments: usize, success_count: usize) {
        let failed = total_segments.saturating_sub(success_count);
        self.bar.finish_and_clear();

        let retries = self.retries.load(Ordering::SeqCst);
        let retry_note = if retries > 0 {
            dim(&format!("  ({retries} retries)"))
        } else {
            String::new()
        };

        if failed == 0 {
            eprintln!(
                "{} {} segments generated{}",
                green("✔"),
                bold(&success_count.to_string()),
                retry_note
            );
        } else {
            eprintln!(
                "{} {}/{} segments generated  ({} failed){}",
                if failed == total_segments {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_segments,
                red(&failed.to_string()),
                retry_note
            );
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on :8000
  pdf2quiz serve

  # Upload a PDF to the running service
  curl -F file=@lecture.pdf http://localhost:8000/api/pdf/process

  # One-off summary + quiz on stdout
  pdf2quiz process lecture.pdf

  # Learning modules, 10-question final quiz, written to a file
  pdf2quiz process --shape course --max-questions 10 lecture.pdf -o course.json

  # One section per page, from a URL
  pdf2quiz process --shape paged https://arxiv.org/pdf/1706.03762

OUTPUT SHAPES:
  summary  {"summary", "questions"}                        (default)
  course   {"modules", "comprehensive_summary", "final_quiz"}
  paged    {"sections", "overview", "final_quiz"}

ENVIRONMENT VARIABLES:
  AZURE_OPENAI_ENDPOINT     Azure OpenAI resource endpoint
  AZURE_OPENAI_API_KEY      Azure OpenAI key
  AZURE_OPENAI_API_VERSION  Azure REST API version
  AZURE_OPENAI_MODEL        Azure deployment name
  OPENAI_API_KEY            OpenAI API key (when Azure is not configured)
  ANTHROPIC_API_KEY         Anthropic API key
  GEMINI_API_KEY            Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER    Provider name (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL           Model ID
  PDFIUM_LIB_PATH           Directory (or file) of libpdfium
  PORT                      Port for `serve`
  PDF2QUIZ_*                Every pipeline flag, e.g. PDF2QUIZ_MAX_QUESTIONS=5
"#;

/// Turn PDF documents into summaries and multiple-choice quizzes with LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2quiz",
    version,
    about = "Turn PDF documents into summaries and multiple-choice quizzes with LLMs",
    long_about = "Extract the text of a PDF, split it into overlapping segments, ask an LLM for \
a summary and quiz per segment, and merge everything into one deduplicated result. Runs as an \
HTTP service or as a one-shot command. Supports Azure OpenAI, OpenAI, Anthropic, Google Gemini \
and Ollama.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2QUIZ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2QUIZ_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Process one PDF (path or URL) and print the JSON result.
    Process(ProcessArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Maximum upload size in bytes.
    #[arg(long, env = "PDF2QUIZ_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "PDF2QUIZ_OUTPUT")]
    output: Option<PathBuf>,

    /// Emit the full report (result + stats + per-segment attempts).
    #[arg(long, env = "PDF2QUIZ_REPORT")]
    report: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2QUIZ_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2QUIZ_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Azure OpenAI endpoint, e.g. https://my-resource.openai.azure.com.
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    azure_endpoint: Option<String>,

    /// Azure OpenAI API key.
    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    azure_api_key: Option<String>,

    /// Azure OpenAI REST API version.
    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = "2024-06-01")]
    azure_api_version: String,

    /// Azure OpenAI deployment name.
    #[arg(long, env = "AZURE_OPENAI_MODEL")]
    azure_deployment: Option<String>,

    /// LLM provider when Azure is not configured: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,
}

impl BackendArgs {
    fn settings(&self) -> BackendSettings {
        let azure = match (&self.azure_endpoint, &self.azure_api_key, &self.azure_deployment) {
            (Some(endpoint), Some(api_key), Some(deployment))
                if !endpoint.is_empty() && !api_key.is_empty() && !deployment.is_empty() =>
            {
                Some(AzureOpenAiConfig {
                    endpoint: endpoint.clone(),
                    api_key: api_key.clone(),
                    api_version: self.azure_api_version.clone(),
                    deployment: deployment.clone(),
                })
            }
            _ => None,
        };
        BackendSettings {
            azure,
            provider_name: self.provider.clone(),
            model: self.model.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Output shape: summary, course or paged.
    #[arg(long, env = "PDF2QUIZ_SHAPE", value_enum, default_value = "summary")]
    shape: ShapeArg,

    /// Maximum segment length in characters.
    #[arg(long, env = "PDF2QUIZ_MAX_CHUNK_CHARS", default_value_t = 3800)]
    max_chunk_chars: usize,

    /// Characters shared by adjacent segments.
    #[arg(long, env = "PDF2QUIZ_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Backend calls per segment before giving up.
    #[arg(long, env = "PDF2QUIZ_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Initial retry delay in milliseconds (doubles per retry).
    #[arg(long, env = "PDF2QUIZ_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Upper bound on the retry delay in milliseconds.
    #[arg(long, env = "PDF2QUIZ_MAX_BACKOFF_MS", default_value_t = 8000)]
    max_backoff_ms: u64,

    /// Number of concurrent backend calls.
    #[arg(short, long, env = "PDF2QUIZ_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Questions in the merged quiz.
    #[arg(long, env = "PDF2QUIZ_MAX_QUESTIONS", default_value_t = 3)]
    max_questions: usize,

    /// Characters in the merged summary.
    #[arg(long, env = "PDF2QUIZ_MAX_SUMMARY_CHARS", default_value_t = 1500)]
    max_summary_chars: usize,

    /// Top up a short quiz with repeated questions.
    #[arg(long, env = "PDF2QUIZ_FILL_DUPLICATES")]
    fill_duplicates: bool,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2QUIZ_TEMPERATURE", default_value_t = 0.5)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDF2QUIZ_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2QUIZ_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Whole-request timeout in seconds.
    #[arg(long, env = "PDF2QUIZ_REQUEST_TIMEOUT", default_value_t = 600)]
    request_timeout: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2QUIZ_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Cached results kept in memory (0 disables the cache).
    #[arg(long, env = "PDF2QUIZ_CACHE_CAPACITY", default_value_t = 20)]
    cache_capacity: usize,

    /// Seconds a cached result stays valid.
    #[arg(long, env = "PDF2QUIZ_CACHE_TTL", default_value_t = 3600)]
    cache_ttl: u64,

    /// Directory (or file) of libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2QUIZ_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ShapeArg {
    Summary,
    Course,
    Paged,
}

impl From<ShapeArg> for OutputShape {
    fn from(v: ShapeArg) -> Self {
        match v {
            ShapeArg::Summary => OutputShape::Summary,
            ShapeArg::Course => OutputShape::Course,
            ShapeArg::Paged => OutputShape::Paged,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs in one-shot mode;
    // the server always logs at INFO so requests are visible.
    let show_progress = match cli.command {
        Command::Process(ref args) => !cli.quiet && !args.no_progress,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Process(args) => run_process(args, show_progress, cli.quiet).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let processor = build_processor(&args.backend, &args.pipeline, None).await?;
    let addr = SocketAddr::new(args.host, args.port);
    serve(addr, Arc::new(processor), args.max_upload_bytes)
        .await
        .context("Server failed")
}

async fn run_process(args: ProcessArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn SegmentProgressCallback>)
    } else {
        None
    };

    let processor = build_processor(&args.backend, &args.pipeline, progress_cb).await?;

    let loaded = load_input(&args.input, args.download_timeout)
        .await
        .context("Failed to load input")?;
    let output = processor
        .process_pdf(loaded.bytes)
        .await
        .context("Processing failed")?;

    if let Some(ref path) = args.output {
        if args.report {
            write_json(path, &output).await?;
        } else {
            write_json(path, &output.result).await?;
        }
    } else {
        let json = if args.report {
            serde_json::to_string_pretty(&output)
        } else {
            serde_json::to_string_pretty(&output.result)
        }
        .context("Failed to serialise output")?;
        println!("{json}");
    }

    if !quiet {
        print_summary(&output, args.output.as_ref());
    }
    Ok(())
}

fn print_summary(output: &ProcessOutput, path: Option<&PathBuf>) {
    let stats = &output.stats;
    eprintln!(
        "{}  {}/{} segments  {} questions  {}ms{}",
        if stats.failed_segments == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.succeeded_segments,
        stats.total_segments,
        output.result.quiz().len(),
        stats.total_duration_ms,
        path.map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default(),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out  —  {} attempts",
        dim(&stats.input_tokens.to_string()),
        dim(&stats.output_tokens.to_string()),
        stats.total_attempts,
    );
}

/// Map CLI args to a ready [`Processor`].
async fn build_processor(
    backend: &BackendArgs,
    pipeline: &PipelineArgs,
    progress: Option<ProgressCallback>,
) -> Result<Processor> {
    let config = build_config(pipeline, progress).await?;
    let backend = resolve_backend(&backend.settings()).context("No usable LLM backend")?;

    let mut extractor = match pipeline.pdfium_lib_path {
        Some(ref dir) => PdfiumExtractor::new().with_library_dir(dir),
        None => PdfiumExtractor::new(),
    };
    if let Some(ref password) = pipeline.password {
        extractor = extractor.with_password(password);
    }

    Processor::new(backend, Arc::new(extractor), config).context("Invalid configuration")
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(
    args: &PipelineArgs,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let backfill = if args.fill_duplicates {
        BackfillPolicy::FillWithDuplicates
    } else {
        BackfillPolicy::AllowShort
    };

    let mut builder = PipelineConfig::builder()
        .shape(args.shape.into())
        .max_chunk_chars(args.max_chunk_chars)
        .chunk_overlap(args.chunk_overlap)
        .max_attempts(args.max_attempts)
        .retry_backoff_ms(args.retry_backoff_ms)
        .max_backoff_ms(args.max_backoff_ms)
        .concurrency(args.concurrency)
        .max_questions(args.max_questions)
        .max_summary_chars(args.max_summary_chars)
        .backfill(backfill)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .api_timeout_secs(args.api_timeout)
        .request_timeout_secs(args.request_timeout)
        .cache_capacity(args.cache_capacity)
        .cache_ttl_secs(args.cache_ttl);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
