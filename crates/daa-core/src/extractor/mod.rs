//! Task plan extraction
//!
//! Turns free task text into a [`TaskPlan`]. The assisted path asks the
//! language model for a JSON plan; the heuristic path is deterministic and
//! always succeeds. Whichever path produced the plan, post-validation
//! enforces the plan invariants before it leaves this module.

pub mod assisted;
pub mod heuristics;
pub mod visualization;

use crate::collaborators::LanguageModel;
use crate::prompts;
use crate::types::{AnswerKind, ExpectedFormat, Question, TaskKind, TaskPlan};
use std::sync::Arc;

/// Builds task plans from raw text
#[derive(Clone)]
pub struct PlanExtractor {
    language_model: Option<Arc<dyn LanguageModel>>,
}

impl PlanExtractor {
    /// Extractor that only uses the heuristics
    #[inline]
    #[must_use]
    pub fn heuristic() -> Self {
        Self {
            language_model: None,
        }
    }

    /// Extractor that consults the language model first
    #[inline]
    #[must_use]
    pub fn assisted(language_model: Arc<dyn LanguageModel>) -> Self {
        Self {
            language_model: Some(language_model),
        }
    }

    /// Extract a plan. Never fails.
    pub async fn extract(&self, task_text: &str) -> TaskPlan {
        let enumerated = heuristics::split_numbered(task_text).len();

        if let Some(model) = &self.language_model {
            match model.complete(&prompts::plan_extraction(task_text)).await {
                Ok(output) => match assisted::parse_plan(&output, task_text, enumerated) {
                    Ok(plan) => {
                        tracing::debug!("Using assisted plan with {} questions", plan.questions.len());
                        return post_validate(plan);
                    }
                    Err(e) => tracing::warn!("Discarding assisted plan: {}", e),
                },
                Err(e) => tracing::warn!("Assisted extraction unavailable: {}", e),
            }
        }

        extract_heuristic(task_text)
    }
}

impl Default for PlanExtractor {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl std::fmt::Debug for PlanExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExtractor")
            .field("assisted", &self.language_model.is_some())
            .finish()
    }
}

/// Deterministic extraction; identical input always yields an identical plan
#[must_use]
pub fn extract_heuristic(task_text: &str) -> TaskPlan {
    let (kind, data_source) = heuristics::detect_source(task_text);

    let mut texts = heuristics::split_numbered(task_text);
    if texts.is_empty() {
        texts.push(task_text.trim().to_string());
    }

    let questions = texts.into_iter().map(|text| classify_question(&text)).collect();

    post_validate(TaskPlan {
        kind,
        data_source,
        processing_steps: Vec::new(),
        questions,
        output_shape: heuristics::detect_output_shape(task_text),
        raw_text: task_text.to_string(),
    })
}

fn classify_question(text: &str) -> Question {
    if heuristics::mentions_visualization(text) {
        return Question::visualization(text, visualization::parse(text));
    }
    Question::new(
        text,
        heuristics::classify_answer_kind(text),
        heuristics::classify_expected_format(text),
    )
}

/// Enforce the plan invariants
fn post_validate(mut plan: TaskPlan) -> TaskPlan {
    plan.questions.retain(|q| !q.text.trim().is_empty());
    if plan.questions.is_empty() {
        plan.questions.push(Question::new(
            plan.raw_text.trim(),
            AnswerKind::Text,
            ExpectedFormat::String,
        ));
    }

    if plan.kind == TaskKind::Unclassified && plan.data_source.is_some() {
        plan.data_source = None;
    }

    for question in &mut plan.questions {
        if question.answer_kind == AnswerKind::Visualization || question.visualization_spec.is_some() {
            question.answer_kind = AnswerKind::Visualization;
            question.expected_format = ExpectedFormat::Base64Image;
            if question.visualization_spec.is_none() {
                question.visualization_spec = Some(visualization::parse(&question.text));
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockLanguageModel;
    use crate::error::LanguageModelError;
    use crate::types::{DataSource, OutputShape};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const EVALUATION_TASK: &str = "Scrape the list of highest grossing films from Wikipedia. It is at the URL:
https://en.wikipedia.org/wiki/List_of_highest-grossing_films

Answer the following questions and respond with a JSON array of strings containing the answer.

1. How many $2 bn movies were released before 2020?
2. Which is the earliest film that grossed over $1.5 bn?
3. What's the correlation between the Rank and Peak?
4. Draw a scatterplot of Rank and Peak along with a dotted red regression line through it.
   Return as a base-64 encoded data URI, `\"data:image/png;base64,iVBORw0KG...\"` under 100,000 bytes.
";

    #[test]
    fn evaluation_task_plan() {
        let plan = extract_heuristic(EVALUATION_TASK);
        assert_eq!(plan.kind, TaskKind::WebScrape);
        assert_eq!(
            plan.data_source,
            Some(DataSource::Web(
                "https://en.wikipedia.org/wiki/List_of_highest-grossing_films".into()
            ))
        );
        assert_eq!(plan.output_shape, OutputShape::OrderedArray);
        let kinds: Vec<AnswerKind> = plan.questions.iter().map(|q| q.answer_kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnswerKind::Count,
                AnswerKind::Date,
                AnswerKind::Correlation,
                AnswerKind::Visualization
            ]
        );
        let spec = plan.questions[3].visualization_spec.as_ref().unwrap();
        assert_eq!(spec.regression_color.as_deref(), Some("red"));
        assert_eq!(spec.max_bytes, 100_000);
    }

    #[test]
    fn scenario_single_count_question() {
        let plan = extract_heuristic("How many items in [1,2,3,4,5]?");
        assert_eq!(plan.kind, TaskKind::Unclassified);
        assert_eq!(plan.data_source, None);
        assert_eq!(plan.questions.len(), 1);
        assert_eq!(plan.questions[0].answer_kind, AnswerKind::Count);
        assert_eq!(plan.questions[0].text, "How many items in [1,2,3,4,5]?");
    }

    #[test]
    fn empty_text_still_has_a_question() {
        let plan = extract_heuristic("   ");
        assert_eq!(plan.questions.len(), 1);
        assert_eq!(plan.questions[0].answer_kind, AnswerKind::Text);
    }

    #[test]
    fn post_validate_synthesises_visualization_spec() {
        let plan = post_validate(TaskPlan {
            kind: TaskKind::Unclassified,
            data_source: Some(DataSource::Query("SELECT 1;".into())),
            processing_steps: vec![],
            questions: vec![Question::new(
                "scatter of a and b",
                AnswerKind::Visualization,
                ExpectedFormat::String,
            )],
            output_shape: OutputShape::OrderedArray,
            raw_text: "raw".into(),
        });
        assert_eq!(plan.data_source, None);
        let q = &plan.questions[0];
        assert_eq!(q.expected_format, ExpectedFormat::Base64Image);
        assert!(q.visualization_spec.is_some());
    }

    #[test]
    fn image_words_alone_do_not_make_a_chart() {
        let plan = extract_heuristic("How many images are on the page?");
        let q = &plan.questions[0];
        assert_eq!(q.answer_kind, AnswerKind::Count);
        assert_eq!(q.expected_format, ExpectedFormat::Base64Image);
        assert!(q.visualization_spec.is_none());

        let plan = extract_heuristic("Which film has a PNG poster?");
        let q = &plan.questions[0];
        assert_eq!(q.answer_kind, AnswerKind::Text);
        assert!(q.visualization_spec.is_none());
    }

    #[test]
    fn prose_select_does_not_hide_the_url() {
        let plan = extract_heuristic(
            "Scrape https://en.wikipedia.org/wiki/List_of_highest-grossing_films\n\
             Select the answer from the table; reply with a JSON array.",
        );
        assert_eq!(plan.kind, TaskKind::WebScrape);
        assert_eq!(
            plan.data_source,
            Some(DataSource::Web(
                "https://en.wikipedia.org/wiki/List_of_highest-grossing_films".into()
            ))
        );
    }

    #[tokio::test]
    async fn assisted_plan_is_used_when_valid() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().times(1).returning(|_| {
            Ok(r#"{"kind":"unclassified","questions":[{"text":"What is it?","answer_kind":"text"}],"output_shape":"free-text"}"#.to_string())
        });
        let plan = PlanExtractor::assisted(Arc::new(model)).extract("What is it?").await;
        assert_eq!(plan.output_shape, OutputShape::FreeText);
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_heuristics() {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .returning(|_| Err(LanguageModelError::Transport("down".into())));
        let plan = PlanExtractor::assisted(Arc::new(model)).extract(EVALUATION_TASK).await;
        assert_eq!(plan, extract_heuristic(EVALUATION_TASK));
    }

    #[tokio::test]
    async fn authentication_failure_does_not_escape_extraction() {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .returning(|_| Err(LanguageModelError::Authentication("401".into())));
        let plan = PlanExtractor::assisted(Arc::new(model)).extract("Who won?").await;
        assert_eq!(plan.questions[0].text, "Who won?");
    }

    #[tokio::test]
    async fn mismatched_assisted_plan_is_discarded() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| {
            Ok(r#"{"kind":"web-scrape","data_source":{"type":"web","value":"https://x.io"},"questions":[{"text":"only one","answer_kind":"text"}]}"#.to_string())
        });
        let plan = PlanExtractor::assisted(Arc::new(model)).extract(EVALUATION_TASK).await;
        assert_eq!(plan.questions.len(), 4);
    }

    fn keyword_free_text() -> impl Strategy<Value = String> {
        let words = prop::sample::select(vec![
            "alpha", "river", "stone", "blue", "quiet", "market", "green", "orbit", "paper", "lamp",
        ]);
        (prop::collection::vec(words, 1..12), "[ \t\n]{0,3}", "[ \t\n]{0,3}")
            .prop_map(|(ws, lead, trail)| format!("{lead}{}{trail}", ws.join(" ")))
    }

    proptest! {
        #[test]
        fn prop_plain_text_is_one_text_question(text in keyword_free_text()) {
            let plan = extract_heuristic(&text);
            prop_assert_eq!(plan.questions.len(), 1);
            prop_assert_eq!(&plan.questions[0].text, text.trim());
            prop_assert_eq!(plan.questions[0].answer_kind, AnswerKind::Text);
            prop_assert_eq!(plan.kind, TaskKind::Unclassified);
        }

        #[test]
        fn prop_json_object_means_keyed_object(prefix in "[a-z ]{0,30}", suffix in "[a-z ]{0,30}") {
            let text = format!("{prefix} respond with a JSON object {suffix}");
            prop_assert_eq!(extract_heuristic(&text).output_shape, OutputShape::KeyedObject);
        }

        #[test]
        fn prop_default_shape_is_ordered_array(text in keyword_free_text()) {
            prop_assert_eq!(extract_heuristic(&text).output_shape, OutputShape::OrderedArray);
        }

        #[test]
        fn prop_heuristic_extraction_is_deterministic(text in "\\PC{0,200}") {
            prop_assert_eq!(extract_heuristic(&text), extract_heuristic(&text));
        }
    }
}
