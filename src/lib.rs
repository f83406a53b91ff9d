//! # edgequake-pdf2quiz
//!
//! Turn PDF documents into summaries and multiple-choice quizzes with LLMs.
//!
//! ## Why this crate?
//!
//! A chat model asked to "summarize this PDF and write three questions"
//! runs into three problems at once: the document does not fit in one
//! request, the model's JSON is occasionally wrapped in fences or simply
//! invalid, and separate chunks produce overlapping questions. This crate
//! handles all of that behind one call and returns a single, validated,
//! deduplicated result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate upload name / %PDF signature
//!  ├─ 2. Extract   per-page text via pdfium (spawn_blocking)
//!  ├─ 3. Chunk     ≤3800-char segments, 200-char overlap, cut at sentence ends
//!  ├─ 4. Generate  concurrent LLM calls, sanitize + validate, retry ×3
//!  ├─ 5. Merge     join summaries (≤1500 chars), dedup questions (≤3)
//!  └─ 6. Output    FinalResult JSON + per-segment stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2quiz::{resolve_backend, BackendSettings, PdfiumExtractor, PipelineConfig, Processor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from AZURE_OPENAI_* / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let backend = resolve_backend(&BackendSettings::default())?;
//!     let extractor = Arc::new(PdfiumExtractor::from_env());
//!     let processor = Processor::new(backend, extractor, PipelineConfig::default())?;
//!
//!     let bytes = std::fs::read("lecture.pdf")?;
//!     let output = processor.process_upload("lecture.pdf", bytes).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.result)?);
//!     eprintln!("{} segments, {} attempts",
//!         output.stats.total_segments,
//!         output.stats.total_attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | Enables [`server`] (axum + tower-http) |
//! | `cli`    | on      | Enables the `pdf2quiz` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable default features when using only the library:
//! ```toml
//! edgequake-pdf2quiz = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod schema;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    resolve_backend, AzureOpenAiBackend, AzureOpenAiConfig, BackendSettings, Completion,
    GenerationBackend, GenerationOptions, LlmProviderBackend, Prompt,
};
pub use config::{BackfillPolicy, MergeCaps, OutputShape, PipelineConfig, PipelineConfigBuilder};
pub use error::{BackendError, CandidateError, QuizError, SegmentError};
pub use pipeline::chunk::{ChunkPlanner, Origin, Segment, TextBody};
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use process::{write_json, ProcessOutput, ProcessStats, Processor, SegmentReport};
pub use progress::{NoopProgressCallback, ProgressCallback, SegmentProgressCallback};
pub use schema::{
    CourseModule, CourseResult, FinalResult, LearningModule, PageSection, PagedResult,
    QuizQuestion, SourceRef, SummaryResult,
};
