//! Per-segment generation: prompt the backend, sanitize, parse, retry.
//!
//! Each segment moves through a small state machine:
//!
//! ```text
//! Pending ──call──▶ RawReceived ──parse ok──▶ Success
//!    ▲                  │
//!    │             parse failed                 call failed
//!    │                  ▼                            │
//!    └──── attempts left? ◀──────────────────────────┘
//!                  │ no
//!                  ▼
//!              Exhausted
//! ```
//!
//! Backend failures (timeout, transport, API status) and unusable completions
//! (not JSON, wrong schema) are treated alike: the attempt is spent and the
//! next one starts after a capped exponential backoff. A segment makes at
//! most `max_attempts` backend calls, never more.
//!
//! ## Retry Strategy
//!
//! With the default 500 ms base, 8 s cap and 3 attempts the waits are
//! 0 → 500 ms → 1 s. Every call is bounded by `api_timeout_secs`; a call
//! that overruns is dropped and reported as [`BackendError::Timeout`].

use crate::backend::{GenerationBackend, GenerationOptions, Prompt};
use crate::config::PipelineConfig;
use crate::error::{BackendError, SegmentError};
use crate::pipeline::chunk::{Origin, Segment};
use crate::pipeline::sanitize::sanitize_and_parse;
use crate::prompts::{render_user_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::schema::Candidate;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// How one backend call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// The backend answered, but the text was not a valid candidate.
    ParseFailure,
    /// The call itself failed or timed out.
    BackendFailure,
}

/// Record of one backend call for a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Raw completion text, when one arrived. Kept for debugging only.
    #[serde(skip)]
    pub raw: Option<String>,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything that happened while generating one segment.
///
/// Always returned, never propagated as an error: a single failed segment
/// must not abort the request. Callers check `result`.
#[derive(Debug, Clone)]
pub struct SegmentRun {
    pub index: usize,
    pub origin: Origin,
    pub chars: usize,
    pub attempts: Vec<GenerationAttempt>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub duration_ms: u64,
    pub result: Result<Candidate, SegmentError>,
}

impl SegmentRun {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Build the prompt for one segment.
pub fn build_prompt(segment: &Segment, config: &PipelineConfig) -> Prompt {
    let system = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    Prompt {
        system: system.to_string(),
        user: render_user_prompt(config.shape, &segment.text),
    }
}

fn build_options(config: &PipelineConfig) -> GenerationOptions {
    GenerationOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Drive one segment to a validated candidate or to exhaustion.
pub async fn generate(
    segment: &Segment,
    backend: &dyn GenerationBackend,
    config: &PipelineConfig,
) -> SegmentRun {
    let start = Instant::now();
    let prompt = build_prompt(segment, config);
    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);
    let max_attempts = config.max_attempts.max(1);

    let mut attempts = Vec::with_capacity(max_attempts as usize);
    let mut prompt_tokens = 0;
    let mut completion_tokens = 0;
    let mut last_err = String::new();

    for attempt in 1..=max_attempts {
        let backoff = config.backoff_for(attempt);
        if backoff > 0 {
            warn!(
                "Segment {}: retry {}/{} after {}ms",
                segment.index,
                attempt - 1,
                max_attempts - 1,
                backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = timeout(call_timeout, backend.complete(&prompt, &options))
            .await
            .unwrap_or(Err(BackendError::Timeout {
                secs: config.api_timeout_secs,
            }));

        let (raw, outcome, err_msg) = match call {
            Ok(completion) => {
                prompt_tokens += completion.prompt_tokens;
                completion_tokens += completion.completion_tokens;
                match sanitize_and_parse(config.shape, &completion.content) {
                    Ok(candidate) => {
                        debug!(
                            "Segment {}: valid {} candidate on attempt {} ({} in / {} out tokens)",
                            segment.index,
                            config.shape,
                            attempt,
                            completion.prompt_tokens,
                            completion.completion_tokens
                        );
                        attempts.push(GenerationAttempt {
                            attempt,
                            raw: Some(completion.content),
                            outcome: AttemptOutcome::Success,
                            error: None,
                        });
                        return SegmentRun {
                            index: segment.index,
                            origin: segment.origin,
                            chars: segment.char_len(),
                            attempts,
                            prompt_tokens,
                            completion_tokens,
                            duration_ms: start.elapsed().as_millis() as u64,
                            result: Ok(candidate),
                        };
                    }
                    Err(e) => {
                        let preview: String = completion.content.chars().take(200).collect();
                        debug!("Segment {}: unusable completion: {:?}", segment.index, preview);
                        (Some(completion.content), AttemptOutcome::ParseFailure, e.to_string())
                    }
                }
            }
            Err(e) => (None, AttemptOutcome::BackendFailure, e.to_string()),
        };

        warn!(
            "Segment {}: attempt {}/{} failed — {}",
            segment.index, attempt, max_attempts, err_msg
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_attempt_failed(segment.index, attempt, &err_msg);
        }
        attempts.push(GenerationAttempt {
            attempt,
            raw,
            outcome,
            error: Some(err_msg.clone()),
        });
        last_err = err_msg;
    }

    SegmentRun {
        index: segment.index,
        origin: segment.origin,
        chars: segment.char_len(),
        attempts,
        prompt_tokens,
        completion_tokens,
        duration_ms: start.elapsed().as_millis() as u64,
        result: Err(SegmentError::Exhausted {
            segment: segment.index,
            attempts: max_attempts,
            last_error: last_err,
        }),
    }
}
