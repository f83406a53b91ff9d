//! Shared fixtures for the integration tests: a scripted backend, a canned
//! extractor and a few JSON builders.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_pdf2quiz::{
    BackendError, Completion, GenerationBackend, GenerationOptions, Prompt, QuizError,
    TextExtractor,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route library logs through the test harness; `RUST_LOG` overrides.
/// Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// A backend whose answers are scripted per segment.
///
/// A route matches when its marker occurs in the user prompt; its queued
/// answers are handed out in order. Prompts with no route, or whose route
/// is drained, get the fallback.
pub struct StubBackend {
    routes: Mutex<Vec<(String, VecDeque<Result<String, BackendError>>)>>,
    fallback: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            fallback: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call answers `body`.
    pub fn always(body: impl Into<String>) -> Self {
        Self::new().fallback(body)
    }

    pub fn route(
        self,
        marker: impl Into<String>,
        answers: Vec<Result<String, BackendError>>,
    ) -> Self {
        self.routes
            .lock()
            .unwrap()
            .push((marker.into(), answers.into()));
        self
    }

    pub fn fallback(mut self, body: impl Into<String>) -> Self {
        self.fallback = Some(body.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        _options: &GenerationOptions,
    ) -> Result<Completion, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = {
            let mut routes = self.routes.lock().unwrap();
            routes
                .iter_mut()
                .find(|(marker, _)| prompt.user.contains(marker.as_str()))
                .and_then(|(_, answers)| answers.pop_front())
        };

        let content = match scripted {
            Some(answer) => answer?,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| BackendError::Transport("no scripted answer".into()))?,
        };

        Ok(Completion {
            content,
            prompt_tokens: 100,
            completion_tokens: 50,
        })
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Returns the same pages for any input.
pub struct StubExtractor {
    pages: Vec<String>,
}

impl StubExtractor {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl TextExtractor for StubExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Vec<String>, QuizError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(QuizError::CorruptPdf {
                detail: "stub extractor needs a %PDF header".into(),
            });
        }
        Ok(self.pages.clone())
    }
}

// ── JSON builders ────────────────────────────────────────────────────────────

pub fn question(text: &str) -> Value {
    json!({
        "question": text,
        "options": ["Alpha", "Beta", "Gamma", "Delta"],
        "correctAnswer": 2
    })
}

pub fn summary_json(summary: &str, questions: &[&str]) -> String {
    json!({
        "summary": summary,
        "questions": questions.iter().map(|q| question(q)).collect::<Vec<_>>(),
    })
    .to_string()
}

pub fn course_json(module: &str, summary: &str, questions: &[&str]) -> String {
    json!({
        "modules": [{
            "module_name": module,
            "key_concepts": [format!("{module} basics")],
            "learning_objectives": [format!("Explain {module}")],
            "content_summary": format!("All about {module}."),
            "section_quiz": [question(&format!("What is {module}?"))]
        }],
        "comprehensive_summary": summary,
        "final_quiz": questions.iter().map(|q| question(q)).collect::<Vec<_>>(),
    })
    .to_string()
}

/// `n` distinct space-separated words (`w000 w001 …`), five chars apiece
/// with no sentence terminators, so the planner always hard-cuts.
pub fn words(n: usize) -> String {
    (0..n)
        .map(|i| format!("w{i:03}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A minimal byte string that passes the `%PDF` signature check.
pub fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.4\n%stub\n".to_vec()
}
