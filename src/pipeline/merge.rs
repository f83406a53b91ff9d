//! Merge per-segment candidates into one [`FinalResult`].
//!
//! Candidates are combined in segment order regardless of the order in
//! which they completed:
//!
//! * **Narratives** are joined with a single space and truncated to
//!   `max_summary_chars` characters.
//! * **Questions** are deduplicated by exact question text (first
//!   occurrence wins) and capped at `max_questions`. When fewer unique
//!   questions exist, [`BackfillPolicy`] decides whether the quiz comes out
//!   short or is topped up with already-seen questions.
//! * **Modules** (course shape) and **sections** (paged shape) pass through
//!   unchanged, tagged with the segment and page they came from.
//!
//! The caps also apply to a single candidate, so the result never exceeds
//! them no matter how many segments there were.

use crate::config::{BackfillPolicy, MergeCaps, OutputShape};
use crate::error::QuizError;
use crate::pipeline::chunk::Origin;
use crate::schema::{
    Candidate, CourseModule, CourseResult, FinalResult, PageSection, PagedResult, QuizQuestion,
    SourceRef, SummaryResult,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A validated candidate together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCandidate {
    pub index: usize,
    pub origin: Origin,
    pub candidate: Candidate,
}

impl SegmentCandidate {
    fn source(&self) -> SourceRef {
        SourceRef {
            segment: self.index,
            page: self.origin.page(),
        }
    }
}

/// Combine candidates into the final result for `shape`.
///
/// Candidates whose shape does not match are skipped with a warning.
/// Fails only when nothing is left to merge.
pub fn merge(
    shape: OutputShape,
    mut candidates: Vec<SegmentCandidate>,
    caps: &MergeCaps,
) -> Result<FinalResult, QuizError> {
    candidates.sort_by_key(|c| c.index);
    candidates.retain(|c| {
        let keep = c.candidate.shape() == shape;
        if !keep {
            warn!(
                "Segment {}: dropping {} candidate from a {} merge",
                c.index,
                c.candidate.shape(),
                shape
            );
        }
        keep
    });

    if candidates.is_empty() {
        return Err(QuizError::AllSegmentsFailed {
            total: 0,
            attempts: 0,
            first_error: "no segment produced a usable candidate".into(),
        });
    }

    let narrative = join_narratives(
        candidates.iter().map(|c| c.candidate.narrative()),
        caps.max_summary_chars,
    );
    let pool: Vec<QuizQuestion> = candidates
        .iter()
        .flat_map(|c| c.candidate.quiz().iter().cloned())
        .collect();
    let pool_len = pool.len();
    let quiz = select_questions(pool, caps);

    debug!(
        "Merged {} candidates: {} chars of narrative, {}/{} questions kept",
        candidates.len(),
        narrative.chars().count(),
        quiz.len(),
        pool_len
    );

    let result = match shape {
        OutputShape::Summary => FinalResult::Summary(SummaryResult {
            summary: narrative,
            questions: quiz,
        }),
        OutputShape::Course => {
            let mut modules = Vec::new();
            for c in candidates {
                let source = c.source();
                if let Candidate::Course(course) = c.candidate {
                    modules.extend(
                        course
                            .modules
                            .into_iter()
                            .map(|module| CourseModule { module, source }),
                    );
                }
            }
            FinalResult::Course(CourseResult {
                modules,
                comprehensive_summary: narrative,
                final_quiz: quiz,
            })
        }
        OutputShape::Paged => {
            let mut sections = Vec::new();
            for c in candidates {
                let source = c.source();
                if let Candidate::Page(page) = c.candidate {
                    sections.push(PageSection {
                        source,
                        title: page.title,
                        summary: page.summary,
                        key_points: page.key_points,
                        questions: page.questions,
                    });
                }
            }
            FinalResult::Paged(PagedResult {
                sections,
                overview: narrative,
                final_quiz: quiz,
            })
        }
    };

    Ok(result)
}

/// Join non-blank narratives with a single space, then cap at `max_chars` characters.
///
/// Narratives are kept verbatim; a lone narrative under the cap comes back
/// byte-for-byte.
pub fn join_narratives<'a>(parts: impl IntoIterator<Item = &'a str>, max_chars: usize) -> String {
    let joined = parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate_chars(&joined, max_chars)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

/// Deduplicate by question text in input order and cap at `max_questions`.
pub fn select_questions(pool: Vec<QuizQuestion>, caps: &MergeCaps) -> Vec<QuizQuestion> {
    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(caps.max_questions);
    let mut leftovers = Vec::new();

    for question in pool {
        if selected.len() < caps.max_questions && seen.insert(question.question.clone()) {
            selected.push(question);
        } else {
            leftovers.push(question);
        }
    }

    if caps.backfill == BackfillPolicy::FillWithDuplicates {
        let missing = caps.max_questions.saturating_sub(selected.len());
        selected.extend(leftovers.into_iter().take(missing));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CourseCandidate, LearningModule, PageCandidate, SummaryCandidate};

    fn q(text: &str) -> QuizQuestion {
        QuizQuestion {
            question: text.into(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: 0,
            explanation: None,
            related_modules: vec![],
        }
    }

    fn summary(index: usize, text: &str, questions: &[&str]) -> SegmentCandidate {
        SegmentCandidate {
            index,
            origin: Origin::WholeDocument,
            candidate: Candidate::Summary(SummaryCandidate {
                summary: text.into(),
                questions: questions.iter().map(|t| q(t)).collect(),
            }),
        }
    }

    fn caps(max_questions: usize, max_summary_chars: usize) -> MergeCaps {
        MergeCaps {
            max_summary_chars,
            max_questions,
            backfill: BackfillPolicy::AllowShort,
        }
    }

    fn texts(questions: &[QuizQuestion]) -> Vec<&str> {
        questions.iter().map(|q| q.question.as_str()).collect()
    }

    #[test]
    fn single_candidate_within_caps_passes_through() {
        let r = merge(
            OutputShape::Summary,
            vec![summary(0, "Cells.", &["Q1", "Q2", "Q3"])],
            &caps(3, 1500),
        )
        .unwrap();
        assert_eq!(r.narrative(), "Cells.");
        assert_eq!(texts(r.quiz()), vec!["Q1", "Q2", "Q3"]);
    }

    #[test]
    fn caps_apply_to_single_candidate() {
        let r = merge(
            OutputShape::Summary,
            vec![summary(0, "abcdefghij", &["Q1", "Q2", "Q3", "Q4", "Q5"])],
            &caps(3, 4),
        )
        .unwrap();
        assert_eq!(r.narrative(), "abcd");
        assert_eq!(r.quiz().len(), 3);
    }

    #[test]
    fn merges_in_segment_order_regardless_of_input_order() {
        let r = merge(
            OutputShape::Summary,
            vec![
                summary(2, "Third.", &["C"]),
                summary(0, "First.", &["A"]),
                summary(1, "Second.", &["B"]),
            ],
            &caps(3, 1500),
        )
        .unwrap();
        assert_eq!(r.narrative(), "First. Second. Third.");
        assert_eq!(texts(r.quiz()), vec!["A", "B", "C"]);
    }

    #[test]
    fn duplicates_removed_first_occurrence_wins() {
        let r = merge(
            OutputShape::Summary,
            vec![
                summary(0, "a", &["What is DNA?", "What is RNA?"]),
                summary(1, "b", &["What is DNA?", "What is ATP?"]),
            ],
            &caps(3, 1500),
        )
        .unwrap();
        assert_eq!(
            texts(r.quiz()),
            vec!["What is DNA?", "What is RNA?", "What is ATP?"]
        );
    }

    #[test]
    fn allow_short_never_repeats() {
        let r = merge(
            OutputShape::Summary,
            vec![summary(0, "a", &["Same?"]), summary(1, "b", &["Same?"])],
            &caps(3, 1500),
        )
        .unwrap();
        assert_eq!(texts(r.quiz()), vec!["Same?"]);
    }

    #[test]
    fn fill_with_duplicates_tops_up_from_raw_pool() {
        let policy = MergeCaps {
            backfill: BackfillPolicy::FillWithDuplicates,
            ..caps(3, 1500)
        };
        let r = merge(
            OutputShape::Summary,
            vec![summary(0, "a", &["X?", "Y?"]), summary(1, "b", &["X?", "Y?"])],
            &policy,
        )
        .unwrap();
        assert_eq!(texts(r.quiz()), vec!["X?", "Y?", "X?"]);
    }

    #[test]
    fn blank_narratives_are_skipped() {
        assert_eq!(join_narratives(["one", "", "   ", "two"], 100), "one two");
    }

    #[test]
    fn lone_narrative_is_passed_through_verbatim() {
        let text = "  Cells divide.\n\nThen they grow. ";
        assert_eq!(join_narratives([text], 100), text);

        let merged = merge(
            OutputShape::Summary,
            vec![summary(0, text, &["Why?"])],
            &caps(3, 1500),
        )
        .unwrap();
        assert_eq!(merged.narrative(), text);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(join_narratives(["éééé"], 2), "éé");
        assert_eq!(join_narratives(["short"], 100), "short");
    }

    #[test]
    fn no_candidates_is_aggregate_failure() {
        let err = merge(OutputShape::Summary, vec![], &caps(3, 1500)).unwrap_err();
        assert!(matches!(err, QuizError::AllSegmentsFailed { .. }));
    }

    #[test]
    fn course_modules_keep_their_source() {
        let module = |name: &str| LearningModule {
            module_name: name.into(),
            key_concepts: vec![],
            learning_objectives: vec![],
            content_summary: String::new(),
            section_quiz: vec![q(&format!("{name} quiz"))],
        };
        let course = |index: usize, name: &str, final_q: &str| SegmentCandidate {
            index,
            origin: Origin::WholeDocument,
            candidate: Candidate::Course(CourseCandidate {
                modules: vec![module(name)],
                comprehensive_summary: format!("{name} overview."),
                final_quiz: vec![q(final_q)],
            }),
        };

        let r = merge(
            OutputShape::Course,
            vec![course(1, "Genetics", "G?"), course(0, "Cells", "C?")],
            &caps(3, 1500),
        )
        .unwrap();
        let FinalResult::Course(course) = r else {
            panic!("expected course result");
        };
        let names: Vec<&str> = course
            .modules
            .iter()
            .map(|m| m.module.module_name.as_str())
            .collect();
        assert_eq!(names, vec!["Cells", "Genetics"]);
        assert_eq!(course.modules[1].source.segment, 1);
        assert_eq!(course.comprehensive_summary, "Cells overview. Genetics overview.");
        assert_eq!(texts(&course.final_quiz), vec!["C?", "G?"]);
        // Module quizzes stay with their module.
        assert_eq!(course.modules[0].module.section_quiz.len(), 1);
    }

    #[test]
    fn paged_sections_carry_page_numbers() {
        let page = |index: usize, page: usize, question: &str| SegmentCandidate {
            index,
            origin: Origin::Page(page),
            candidate: Candidate::Page(PageCandidate {
                title: format!("Page {page}"),
                summary: format!("Summary {page}."),
                key_points: vec![],
                questions: vec![q(question)],
            }),
        };
        let r = merge(
            OutputShape::Paged,
            vec![page(0, 1, "P1?"), page(1, 3, "P3?")],
            &caps(1, 1500),
        )
        .unwrap();
        let FinalResult::Paged(paged) = r else {
            panic!("expected paged result");
        };
        assert_eq!(paged.sections.len(), 2);
        assert_eq!(paged.sections[1].source.page, Some(3));
        assert_eq!(paged.overview, "Summary 1. Summary 3.");
        assert_eq!(texts(&paged.final_quiz), vec!["P1?"]);
        // Section questions are not capped.
        assert_eq!(paged.sections[1].questions.len(), 1);
    }

    #[test]
    fn mismatched_shape_is_skipped() {
        let r = merge(
            OutputShape::Paged,
            vec![summary(0, "flat", &["Q?"])],
            &caps(3, 1500),
        );
        assert!(r.is_err());
    }
}
