//! Sanitize and parse: turn a raw completion into a validated [`Candidate`].
//!
//! ## Why a sanitizer?
//!
//! Even when told "JSON only", chat models regularly wrap their answer in a
//! ` ```json … ``` ` fence, add leading/trailing whitespace, or prefix a
//! byte-order mark. None of that changes the payload, so it is stripped
//! before parsing instead of burning a retry on it.
//!
//! [`sanitize`] is idempotent: it repeats its cleanup pass until nothing
//! changes, so `sanitize(sanitize(x)) == sanitize(x)` for every input.
//!
//! ## Parse vs. validation
//!
//! [`parse`] distinguishes text that is not JSON at all
//! ([`CandidateError::Parse`]) from JSON that does not fit the requested
//! shape ([`CandidateError::Validation`]). Both count as a failed attempt;
//! the distinction only shows up in logs and attempt records.

use crate::config::OutputShape;
use crate::error::CandidateError;
use crate::schema::{
    Candidate, CourseCandidate, PageCandidate, QuizQuestion, SummaryCandidate,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

// ── Sanitize ─────────────────────────────────────────────────────────────────

static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+\-]*").unwrap());

/// Zero-width characters and BOM that some providers emit around the payload.
const INVISIBLE: &[char] = &['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

/// Strip code fences, language tags, invisible edge characters and
/// surrounding whitespace.
pub fn sanitize(raw: &str) -> String {
    let mut current = strip_edges(raw);
    loop {
        let next = strip_fences_once(current);
        if next == current {
            return current.to_string();
        }
        current = next;
    }
}

fn strip_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || INVISIBLE.contains(&c))
}

fn strip_fences_once(s: &str) -> &str {
    let mut out = s;
    if let Some(m) = RE_OPENING_FENCE.find(out) {
        out = &out[m.end()..];
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest;
    }
    strip_edges(out)
}

// ── Parse ────────────────────────────────────────────────────────────────────

/// Sanitize, then parse into the candidate type for `shape`.
pub fn sanitize_and_parse(shape: OutputShape, raw: &str) -> Result<Candidate, CandidateError> {
    parse(shape, &sanitize(raw))
}

/// Parse already-sanitized text into the candidate type for `shape`.
///
/// Required fields per shape:
///
/// | Shape | Fields | Non-empty quiz |
/// |-------|--------|----------------|
/// | `Summary` | `summary`, `questions` | `questions` |
/// | `Course`  | `modules`, `comprehensive_summary`, `final_quiz` | `final_quiz` |
/// | `Paged`   | `summary`, `questions` | `questions` |
///
/// Every question anywhere in the candidate (module quizzes included) must
/// have four options and an in-range answer index; one bad question rejects
/// the whole candidate.
pub fn parse(shape: OutputShape, clean: &str) -> Result<Candidate, CandidateError> {
    let value: Value =
        serde_json::from_str(clean).map_err(|e| CandidateError::Parse(e.to_string()))?;

    match shape {
        OutputShape::Summary => {
            require_fields(&value, &["summary", "questions"])?;
            let c: SummaryCandidate = decode(value)?;
            validate_quiz("questions", &c.questions)?;
            Ok(Candidate::Summary(c))
        }
        OutputShape::Course => {
            require_fields(&value, &["modules", "comprehensive_summary", "final_quiz"])?;
            let c: CourseCandidate = decode(value)?;
            validate_quiz("final_quiz", &c.final_quiz)?;
            for module in &c.modules {
                if module.module_name.trim().is_empty() {
                    return Err(CandidateError::Validation("module without a name".into()));
                }
                validate_questions(&module.section_quiz).map_err(|e| {
                    CandidateError::Validation(format!("module '{}': {e}", module.module_name))
                })?;
            }
            Ok(Candidate::Course(c))
        }
        OutputShape::Paged => {
            require_fields(&value, &["summary", "questions"])?;
            let c: PageCandidate = decode(value)?;
            validate_quiz("questions", &c.questions)?;
            Ok(Candidate::Page(c))
        }
    }
}

fn require_fields(value: &Value, fields: &[&str]) -> Result<(), CandidateError> {
    let object = value.as_object().ok_or_else(|| {
        CandidateError::Validation("expected a JSON object at the top level".into())
    })?;
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|f| object.get(*f).map_or(true, Value::is_null))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CandidateError::Validation(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, CandidateError> {
    serde_json::from_value(value).map_err(|e| CandidateError::Validation(e.to_string()))
}

fn validate_quiz(field: &str, questions: &[QuizQuestion]) -> Result<(), CandidateError> {
    if questions.is_empty() {
        return Err(CandidateError::Validation(format!("'{field}' is empty")));
    }
    validate_questions(questions).map_err(CandidateError::Validation)
}

fn validate_questions(questions: &[QuizQuestion]) -> Result<(), String> {
    questions.iter().try_for_each(QuizQuestion::validate)
}
