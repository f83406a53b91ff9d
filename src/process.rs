//! Request processing: bytes in, merged quiz out.
//!
//! [`Processor`] owns everything shared between requests (backend,
//! extractor, config, cache) and runs one request through the stages:
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  filename suffix + %PDF signature
//!  ├─ 2. Extract   per-page text via pdfium (spawn_blocking)
//!  ├─ 3. Segment   whole document, or page by page for the paged shape
//!  ├─ 4. Generate  concurrent backend calls, retried per segment
//!  ├─ 5. Merge     narrative join + question dedup under the caps
//!  └─ 6. Report    FinalResult + per-segment stats
//! ```
//!
//! Stages 3–6 run under the request deadline and behind the result cache,
//! so identical concurrent uploads share one run.

use crate::backend::GenerationBackend;
use crate::cache::{content_key, ResultCache};
use crate::config::PipelineConfig;
use crate::error::{QuizError, SegmentError};
use crate::pipeline::chunk::{ChunkPlanner, Origin, TextBody};
use crate::pipeline::extract::{extract_pages, TextExtractor};
use crate::pipeline::generate::{generate, GenerationAttempt, SegmentRun};
use crate::pipeline::input::{check_magic, validate_filename};
use crate::pipeline::merge::{merge, SegmentCandidate};
use crate::schema::FinalResult;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one segment, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    pub chars: usize,
    pub attempts: Vec<GenerationAttempt>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SegmentError>,
}

/// Aggregate statistics for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Pages the extractor returned.
    pub pages: usize,
    /// Pages that carried text.
    pub text_pages: usize,
    pub characters: usize,
    pub total_segments: usize,
    pub succeeded_segments: usize,
    pub failed_segments: usize,
    pub total_attempts: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub extract_duration_ms: u64,
    pub generation_duration_ms: u64,
    pub total_duration_ms: u64,
    /// The result was served from the cache.
    pub cache_hit: bool,
}

/// The merged result together with how it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub result: FinalResult,
    pub stats: ProcessStats,
    pub segments: Vec<SegmentReport>,
}

/// Shared, long-lived request processor.
pub struct Processor {
    backend: Arc<dyn GenerationBackend>,
    extractor: Arc<dyn TextExtractor>,
    config: PipelineConfig,
    planner: ChunkPlanner,
    cache: ResultCache<ProcessOutput>,
}

impl Processor {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        extractor: Arc<dyn TextExtractor>,
        config: PipelineConfig,
    ) -> Result<Self, QuizError> {
        let planner = ChunkPlanner::from_config(&config)?;
        let cache = ResultCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        );
        info!(
            "Processor ready: backend={}, shape={}, chunk={}/{} chars, attempts={}, concurrency={}",
            backend.name(),
            config.shape,
            config.max_chunk_chars,
            config.chunk_overlap,
            config.max_attempts,
            config.concurrency
        );
        Ok(Self {
            backend,
            extractor,
            config,
            planner,
            cache,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Process an upload. Rejects filenames without a `.pdf` suffix before
    /// touching the bytes.
    pub async fn process_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<ProcessOutput, QuizError> {
        validate_filename(filename)?;
        check_magic(filename, &bytes)?;
        info!("Processing upload '{}' ({} bytes)", filename, bytes.len());
        self.process_pdf(bytes).await
    }

    /// Process raw PDF bytes.
    pub async fn process_pdf(&self, bytes: Vec<u8>) -> Result<ProcessOutput, QuizError> {
        let extract_start = Instant::now();
        let pages = extract_pages(Arc::clone(&self.extractor), bytes).await?;
        let extract_ms = extract_start.elapsed().as_millis() as u64;
        debug!("Extracted {} pages in {}ms", pages.len(), extract_ms);

        let mut output = self.process_pages(pages).await?;
        output.stats.extract_duration_ms = extract_ms;
        output.stats.total_duration_ms += extract_ms;
        Ok(output)
    }

    /// Process already-extracted page text, one string per page.
    pub async fn process_pages(&self, pages: Vec<String>) -> Result<ProcessOutput, QuizError> {
        let page_count = pages.len();
        let text_pages = pages.iter().filter(|p| !p.trim().is_empty()).count();
        let bodies = self.build_bodies(pages)?;
        let key = content_key(self.config.shape, &bodies);
        let deadline = Duration::from_secs(self.config.request_timeout_secs);

        let lookup = self
            .cache
            .get_or_try_insert_with(&key, || self.run(bodies, page_count, text_pages));

        let (mut output, hit) = tokio::time::timeout(deadline, lookup)
            .await
            .map_err(|_| {
                warn!("Request exceeded {}s deadline", self.config.request_timeout_secs);
                QuizError::RequestTimeout {
                    secs: self.config.request_timeout_secs,
                }
            })??;

        if hit {
            info!("Serving cached result");
            output.stats.cache_hit = true;
        }
        Ok(output)
    }

    /// Turn page text into the bodies the planner segments.
    ///
    /// Per-page shapes keep each non-blank page separate; the others
    /// concatenate non-blank pages, each followed by a newline.
    fn build_bodies(&self, pages: Vec<String>) -> Result<Vec<TextBody>, QuizError> {
        if pages.iter().all(|p| p.trim().is_empty()) {
            return Err(QuizError::NoExtractableText { pages: pages.len() });
        }

        if self.config.shape.is_per_page() {
            return Ok(pages
                .into_iter()
                .enumerate()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(idx, text)| TextBody::new(text, Origin::Page(idx + 1)))
                .collect());
        }

        let mut text = String::new();
        for page in pages.iter().filter(|p| !p.trim().is_empty()) {
            text.push_str(page);
            text.push('\n');
        }
        Ok(vec![TextBody::new(text, Origin::WholeDocument)])
    }

    async fn run(
        &self,
        bodies: Vec<TextBody>,
        page_count: usize,
        text_pages: usize,
    ) -> Result<ProcessOutput, QuizError> {
        let start = Instant::now();
        let characters: usize = bodies.iter().map(TextBody::char_len).sum();
        let segments = self.planner.plan_all(&bodies);
        let total = segments.len();
        info!(
            "Generating {} from {} segments ({} chars, {} text pages)",
            self.config.shape,
            total,
            characters,
            text_pages
        );

        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_run_start(total);
        }

        let backend = self.backend.as_ref();
        let config = &self.config;
        // Collected first: a lazily mapped borrowing stream makes the request
        // future non-`Send`.
        let jobs: Vec<_> = segments
            .iter()
            .map(move |segment| async move {
                if let Some(cb) = cb {
                    cb.on_segment_start(segment.index, total);
                }
                let run = generate(segment, backend, config).await;
                if let Some(cb) = cb {
                    match run.result {
                        Ok(_) => cb.on_segment_complete(run.index, total, run.attempt_count()),
                        Err(ref e) => cb.on_segment_error(run.index, total, &e.to_string()),
                    }
                }
                run
            })
            .collect();
        let mut runs: Vec<SegmentRun> = stream::iter(jobs)
            .buffer_unordered(config.concurrency)
            .collect()
            .await;

        // Completion order is arbitrary; everything downstream is in segment order.
        runs.sort_by_key(|r| r.index);
        let generation_ms = start.elapsed().as_millis() as u64;

        let mut candidates = Vec::with_capacity(runs.len());
        let mut reports = Vec::with_capacity(runs.len());
        for run in runs {
            let (candidate, error) = match run.result {
                Ok(candidate) => (Some(candidate), None),
                Err(e) => {
                    warn!("{}", e);
                    (None, Some(e))
                }
            };
            if let Some(candidate) = candidate {
                candidates.push(SegmentCandidate {
                    index: run.index,
                    origin: run.origin,
                    candidate,
                });
            }
            reports.push(SegmentReport {
                index: run.index,
                page: run.origin.page(),
                chars: run.chars,
                attempts: run.attempts,
                input_tokens: run.prompt_tokens as u64,
                output_tokens: run.completion_tokens as u64,
                duration_ms: run.duration_ms,
                error,
            });
        }

        let succeeded = candidates.len();
        if let Some(cb) = cb {
            cb.on_run_complete(total, succeeded);
        }

        if succeeded == 0 {
            let first_error = reports
                .iter()
                .find_map(|r| r.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no segments to process".to_string());
            return Err(QuizError::AllSegmentsFailed {
                total,
                attempts: config.max_attempts,
                first_error,
            });
        }

        let result = merge(config.shape, candidates, &config.merge_caps())?;

        let stats = ProcessStats {
            pages: page_count,
            text_pages,
            characters,
            total_segments: total,
            succeeded_segments: succeeded,
            failed_segments: total - succeeded,
            total_attempts: reports.iter().map(|r| r.attempts.len() as u32).sum(),
            input_tokens: reports.iter().map(|r| r.input_tokens).sum(),
            output_tokens: reports.iter().map(|r| r.output_tokens).sum(),
            extract_duration_ms: 0,
            generation_duration_ms: generation_ms,
            total_duration_ms: start.elapsed().as_millis() as u64,
            cache_hit: false,
        };

        info!(
            "Generation complete: {}/{} segments, {} attempts, {} questions, {}ms",
            stats.succeeded_segments,
            stats.total_segments,
            stats.total_attempts,
            result.quiz().len(),
            stats.total_duration_ms
        );

        Ok(ProcessOutput {
            result,
            stats,
            segments: reports,
        })
    }
}

/// Write `value` as pretty JSON to `path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), QuizError> {
    let path = path.as_ref();
    let write_err = |source| QuizError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| QuizError::Internal(format!("JSON serialisation failed: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &body).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
