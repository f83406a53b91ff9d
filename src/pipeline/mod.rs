//! Pipeline stages for PDF-to-quiz generation.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets the
//! backend or the extractor be swapped without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ chunk ──▶ generate ──▶ merge
//! (upload)  (pdfium)   (segments) (LLM+retry)  (dedup/caps)
//!                                    │
//!                                 sanitize
//! ```
//!
//! 1. [`input`]    — validate the upload name, load a path or URL, check `%PDF`
//! 2. [`extract`]  — per-page text; runs in `spawn_blocking` because pdfium
//!    is synchronous
//! 3. [`chunk`]    — bounded, overlapping segments cut at sentence ends
//! 4. [`generate`] — drive the backend call with retry/backoff; the only
//!    stage with network I/O
//! 5. [`sanitize`] — strip fences and parse/validate the completion
//! 6. [`merge`]    — combine candidates in segment order under the caps

pub mod chunk;
pub mod extract;
pub mod generate;
pub mod input;
pub mod merge;
pub mod sanitize;
