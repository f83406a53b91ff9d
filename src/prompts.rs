//! Prompts for summary and quiz generation.
//!
//! Every template spells out the exact JSON schema in prose so the backend
//! is steered towards output [`crate::pipeline::sanitize`] can validate.
//! Templates carry a single `{text}` placeholder; JSON braces are literal,
//! so substitution is a plain string replace rather than `format!`.
//!
//! Callers can override the system instruction via
//! [`crate::config::PipelineConfig::system_prompt`]; the user templates are
//! tied to the schema and cannot be overridden.

use crate::config::OutputShape;

/// Placeholder substituted with the segment text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Default system instruction shared by every shape.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that creates concise summaries and quiz questions from PDF content. Always respond with valid JSON.";

/// Flat summary + three questions.
pub const SUMMARY_TEMPLATE: &str = r#"Analyze this text and provide ONLY a summary and quiz questions in the following JSON format:
{
    "summary": "<concise 3-paragraph summary of key points>",
    "questions": [
        {
            "question": "<clear, specific question about the content>",
            "options": ["<option1>", "<option2>", "<option3>", "<option4>"],
            "correctAnswer": <index of correct answer (0-3)>
        },
        {
            "question": "<second question>",
            "options": ["<option1>", "<option2>", "<option3>", "<option4>"],
            "correctAnswer": <index of correct answer (0-3)>
        },
        {
            "question": "<third question>",
            "options": ["<option1>", "<option2>", "<option3>", "<option4>"],
            "correctAnswer": <index of correct answer (0-3)>
        }
    ]
}

Text to analyze: {text}

IMPORTANT: Your response must be valid JSON only. No markdown, no explanations, no additional text."#;

/// Learning modules + comprehensive summary + final quiz.
pub const COURSE_TEMPLATE: &str = r#"Organize this text into learning modules and provide ONLY the following JSON format:
{
    "modules": [
        {
            "module_name": "<short descriptive module title>",
            "key_concepts": ["<concept>", "<concept>"],
            "learning_objectives": ["<what the learner will be able to do>"],
            "content_summary": "<2-paragraph summary of the module content>",
            "section_quiz": [
                {
                    "question": "<question about this module>",
                    "options": ["<option1>", "<option2>", "<option3>", "<option4>"],
                    "correctAnswer": <index of correct answer (0-3)>,
                    "explanation": "<why the correct answer is correct>"
                }
            ]
        }
    ],
    "comprehensive_summary": "<concise summary of the whole text>",
    "final_quiz": [
        {
            "question": "<question spanning one or more modules>",
            "options": ["<option1>", "<option2>", "<option3>", "<option4>"],
            "correctAnswer": <index of correct answer (0-3)>,
            "explanation": "<why the correct answer is correct>",
            "related_modules": ["<module_name>"]
        }
    ]
}

Every question must have exactly 4 options.

Text to analyze: {text}

IMPORTANT: Your response must be valid JSON only. No markdown, no explanations, no additional text."#;

/// One section per page.
pub const PAGE_TEMPLATE: &str = r#"The following text is one page of a document. Summarize it and write quiz questions in the following JSON format:
{
    "title": "<short title for this page>",
    "summary": "<concise 1-paragraph summary of the page>",
    "key_points": ["<key point>", "<key point>"],
    "questions": [
        {
            "question": "<clear, specific question about the page>",
            "options": ["<option1>", "<option2>", "<option3>", "<option4>"],
            "correctAnswer": <index of correct answer (0-3)>,
            "explanation": "<why the correct answer is correct>"
        }
    ]
}

Page text: {text}

IMPORTANT: Your response must be valid JSON only. No markdown, no explanations, no additional text."#;

/// The user-prompt template for `shape`.
pub fn template_for(shape: OutputShape) -> &'static str {
    match shape {
        OutputShape::Summary => SUMMARY_TEMPLATE,
        OutputShape::Course => COURSE_TEMPLATE,
        OutputShape::Paged => PAGE_TEMPLATE,
    }
}

/// Substitute the segment text into the template for `shape`.
pub fn render_user_prompt(shape: OutputShape, text: &str) -> String {
    template_for(shape).replacen(TEXT_PLACEHOLDER, text, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_has_one_placeholder() {
        for shape in [OutputShape::Summary, OutputShape::Course, OutputShape::Paged] {
            assert_eq!(
                template_for(shape).matches(TEXT_PLACEHOLDER).count(),
                1,
                "{shape}"
            );
        }
    }

    #[test]
    fn render_substitutes_text() {
        let prompt = render_user_prompt(OutputShape::Summary, "Photosynthesis converts light.");
        assert!(prompt.contains("Text to analyze: Photosynthesis converts light."));
        assert!(!prompt.contains(TEXT_PLACEHOLDER));
        assert!(prompt.contains("\"correctAnswer\""));
    }

    #[test]
    fn placeholder_inside_segment_text_is_left_alone() {
        let prompt = render_user_prompt(OutputShape::Paged, "literal {text} in a page");
        assert!(prompt.contains("Page text: literal {text} in a page"));
    }

    #[test]
    fn course_template_names_frontend_fields() {
        for field in ["module_name", "section_quiz", "comprehensive_summary", "final_quiz", "related_modules"] {
            assert!(COURSE_TEMPLATE.contains(field), "missing {field}");
        }
    }
}
