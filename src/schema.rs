//! Structured data produced by the pipeline.
//!
//! Two layers:
//!
//! * **Candidates** — what one backend completion parses into, one type per
//!   [`OutputShape`]. They exist only between the sanitizer and the merger.
//! * **[`FinalResult`]** — what the caller receives. Serialised untagged, so
//!   the JSON body is exactly the shape's object (`{"summary": …,
//!   "questions": […]}` for the flat shape) with no enum wrapper.
//!
//! JSON field names follow the frontend contract (`correctAnswer`,
//! `module_name`, `final_quiz`, …) and must not be renamed.

use crate::config::OutputShape;
use serde::{Deserialize, Serialize};

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    /// Exactly [`QuizQuestion::OPTION_COUNT`] answer options, in display order.
    pub options: Vec<String>,
    /// Index into `options`, always in `0..4`.
    #[serde(rename = "correctAnswer")]
    pub correct_answer: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Module names a final-quiz question draws on (course shape only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_modules: Vec<String>,
}

impl QuizQuestion {
    pub const OPTION_COUNT: usize = 4;

    /// Check the question invariant: non-empty text, four options, index in range.
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question text is empty".into());
        }
        if self.options.len() != Self::OPTION_COUNT {
            return Err(format!(
                "question '{}' has {} options, expected {}",
                self.question,
                self.options.len(),
                Self::OPTION_COUNT
            ));
        }
        if usize::from(self.correct_answer) >= Self::OPTION_COUNT {
            return Err(format!(
                "question '{}' has correctAnswer {}, expected 0-3",
                self.question, self.correct_answer
            ));
        }
        Ok(())
    }
}

/// A learning module as emitted by the course prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningModule {
    pub module_name: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub content_summary: String,
    #[serde(default)]
    pub section_quiz: Vec<QuizQuestion>,
}

// ── Candidates ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCandidate {
    pub summary: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCandidate {
    pub modules: Vec<LearningModule>,
    pub comprehensive_summary: String,
    pub final_quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCandidate {
    #[serde(default)]
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub questions: Vec<QuizQuestion>,
}

/// The validated structured output of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Summary(SummaryCandidate),
    Course(CourseCandidate),
    Page(PageCandidate),
}

impl Candidate {
    pub fn shape(&self) -> OutputShape {
        match self {
            Candidate::Summary(_) => OutputShape::Summary,
            Candidate::Course(_) => OutputShape::Course,
            Candidate::Page(_) => OutputShape::Paged,
        }
    }

    /// Questions that feed the merged quiz.
    pub fn quiz(&self) -> &[QuizQuestion] {
        match self {
            Candidate::Summary(c) => &c.questions,
            Candidate::Course(c) => &c.final_quiz,
            Candidate::Page(c) => &c.questions,
        }
    }

    /// Narrative text that feeds the merged summary.
    pub fn narrative(&self) -> &str {
        match self {
            Candidate::Summary(c) => &c.summary,
            Candidate::Course(c) => &c.comprehensive_summary,
            Candidate::Page(c) => &c.summary,
        }
    }
}

// ── Final result ─────────────────────────────────────────────────────────

/// Where a module or section came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// 0-based segment index.
    pub segment: usize,
    /// 1-based page number, when the segment came from a single page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseModule {
    #[serde(flatten)]
    pub module: LearningModule,
    pub source: SourceRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseResult {
    pub modules: Vec<CourseModule>,
    pub comprehensive_summary: String,
    pub final_quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSection {
    #[serde(flatten)]
    pub source: SourceRef,
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResult {
    pub sections: Vec<PageSection>,
    pub overview: String,
    pub final_quiz: Vec<QuizQuestion>,
}

/// The merged, capped, deduplicated output of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinalResult {
    Summary(SummaryResult),
    Course(CourseResult),
    Paged(PagedResult),
}

impl FinalResult {
    pub fn shape(&self) -> OutputShape {
        match self {
            FinalResult::Summary(_) => OutputShape::Summary,
            FinalResult::Course(_) => OutputShape::Course,
            FinalResult::Paged(_) => OutputShape::Paged,
        }
    }

    /// The deduplicated, capped quiz.
    pub fn quiz(&self) -> &[QuizQuestion] {
        match self {
            FinalResult::Summary(r) => &r.questions,
            FinalResult::Course(r) => &r.final_quiz,
            FinalResult::Paged(r) => &r.final_quiz,
        }
    }

    /// The merged, capped narrative.
    pub fn narrative(&self) -> &str {
        match self {
            FinalResult::Summary(r) => &r.summary,
            FinalResult::Course(r) => &r.comprehensive_summary,
            FinalResult::Paged(r) => &r.overview,
        }
    }
}
