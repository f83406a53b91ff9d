//! Configuration types for PDF-to-quiz processing.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. One struct holds every knob so a
//! single value can be shared by the HTTP server across requests and logged
//! at startup.
//!
//! The generation backend and the text extractor are *not* part of the
//! config: they are injected into [`crate::process::Processor`] so tests can
//! swap in deterministic stubs.

use crate::error::QuizError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Configuration for one [`crate::process::Processor`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2quiz::{OutputShape, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .shape(OutputShape::Course)
///     .max_chunk_chars(6000)
///     .chunk_overlap(300)
///     .max_questions(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Which structured output the backend is steered towards. Default: [`OutputShape::Summary`].
    pub shape: OutputShape,

    /// Maximum segment length in characters. Default: 3800.
    ///
    /// Sized so that segment + prompt template + completion stay well inside
    /// an 8K-token context window.
    pub max_chunk_chars: usize,

    /// Characters shared by adjacent segments. Default: 200. Must be
    /// strictly less than `max_chunk_chars`.
    pub chunk_overlap: usize,

    /// Backend calls per segment before it is given up. Default: 3.
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds. Default: 500.
    ///
    /// Doubles after each failed attempt, capped at `max_backoff_ms`.
    pub retry_backoff_ms: u64,

    /// Upper bound for a single retry delay. Default: 8000.
    pub max_backoff_ms: u64,

    /// Per-backend-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Deadline for a whole request in seconds. Default: 600.
    ///
    /// When it fires every in-flight backend call is dropped and the request
    /// fails; no partial result is returned.
    pub request_timeout_secs: u64,

    /// Segments generated concurrently. Default: 4. `1` processes segments
    /// strictly one after another.
    pub concurrency: usize,

    /// Question cap for the merged quiz. Default: 3.
    pub max_questions: usize,

    /// Character cap for merged narrative text. Default: 1500.
    pub max_summary_chars: usize,

    /// What the merger does when fewer unique questions than `max_questions`
    /// exist. Default: [`BackfillPolicy::AllowShort`].
    pub backfill: BackfillPolicy,

    /// Sampling temperature. Default: 0.5.
    pub temperature: f32,

    /// Completion token limit per backend call. Default: 4096.
    pub max_tokens: usize,

    /// Custom system instruction. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Entries kept in the result cache. Default: 20. `0` disables caching.
    pub cache_capacity: usize,

    /// Seconds a cached result stays valid. Default: 3600.
    pub cache_ttl_secs: u64,

    /// Optional per-segment progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shape: OutputShape::default(),
            max_chunk_chars: 3800,
            chunk_overlap: 200,
            max_attempts: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 8000,
            api_timeout_secs: 60,
            request_timeout_secs: 600,
            concurrency: 4,
            max_questions: 3,
            max_summary_chars: 1500,
            backfill: BackfillPolicy::default(),
            temperature: 0.5,
            max_tokens: 4096,
            system_prompt: None,
            cache_capacity: 20,
            cache_ttl_secs: 3600,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("shape", &self.shape)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("max_questions", &self.max_questions)
            .field("max_summary_chars", &self.max_summary_chars)
            .field("backfill", &self.backfill)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SegmentProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The output caps handed to the merger.
    pub fn merge_caps(&self) -> MergeCaps {
        MergeCaps {
            max_summary_chars: self.max_summary_chars,
            max_questions: self.max_questions,
            backfill: self.backfill,
        }
    }

    /// Delay before attempt `attempt` (1-based). Attempt 1 never waits.
    pub fn backoff_for(&self, attempt: u32) -> u64 {
        if attempt <= 1 {
            return 0;
        }
        let factor = 2u64.saturating_pow(attempt - 2);
        self.retry_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn shape(mut self, shape: OutputShape) -> Self {
        self.config.shape = shape;
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n.max(1);
        self
    }

    pub fn chunk_overlap(mut self, n: usize) -> Self {
        self.config.chunk_overlap = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_questions(mut self, n: usize) -> Self {
        self.config.max_questions = n;
        self
    }

    pub fn max_summary_chars(mut self, n: usize) -> Self {
        self.config.max_summary_chars = n;
        self
    }

    pub fn backfill(mut self, policy: BackfillPolicy) -> Self {
        self.config.backfill = policy;
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

    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.config.cache_capacity = n;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, QuizError> {
        let c = &self.config;
        if c.chunk_overlap >= c.max_chunk_chars {
            return Err(QuizError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than the maximum chunk size ({})",
                c.chunk_overlap, c.max_chunk_chars
            )));
        }
        if c.max_attempts == 0 {
            return Err(QuizError::InvalidConfig(
                "max attempts must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(QuizError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_questions == 0 {
            return Err(QuizError::InvalidConfig(
                "max questions must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The structured artifact the backend is asked to produce.
///
/// One pipeline serves all three: the shape picks the prompt template, how
/// the document is segmented, how completions are validated and how
/// per-segment candidates are merged.
///
/// | Shape | Segments | Result |
/// |-------|----------|--------|
/// | `Summary` | size-bounded chunks of the whole text | `summary` + `questions` |
/// | `Course`  | size-bounded chunks of the whole text | `modules` + `comprehensive_summary` + `final_quiz` |
/// | `Paged`   | one or more chunks per page | `sections` + `overview` + `final_quiz` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputShape {
    /// Flat summary plus a short quiz. (default)
    #[default]
    Summary,
    /// Learning modules with per-module quizzes plus a final quiz.
    Course,
    /// One section per page plus a final quiz.
    Paged,
}

impl OutputShape {
    /// Pages are segmented independently instead of being concatenated.
    pub fn is_per_page(self) -> bool {
        matches!(self, OutputShape::Paged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputShape::Summary => "summary",
            OutputShape::Course => "course",
            OutputShape::Paged => "paged",
        }
    }
}

impl fmt::Display for OutputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputShape {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summary" | "flat" => Ok(OutputShape::Summary),
            "course" | "modules" => Ok(OutputShape::Course),
            "paged" | "pages" => Ok(OutputShape::Paged),
            other => Err(QuizError::InvalidConfig(format!(
                "unknown output shape '{other}' (expected summary, course or paged)"
            ))),
        }
    }
}

/// Merge behaviour when deduplication leaves fewer than `max_questions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillPolicy {
    /// Never repeat a question; the quiz may come out shorter than the cap. (default)
    #[default]
    AllowShort,
    /// Top up with already-seen questions until the cap is met or the raw
    /// pool runs dry. The quiz may then contain duplicates.
    FillWithDuplicates,
}

/// Size limits applied by [`crate::pipeline::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeCaps {
    pub max_summary_chars: usize,
    pub max_questions: usize,
    pub backfill: BackfillPolicy,
}

impl Default for MergeCaps {
    fn default() -> Self {
        PipelineConfig::default().merge_caps()
    }
}
