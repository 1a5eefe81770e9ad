//! Answer synthesis from executed rows and retrieved context.
//!
//! The multi-pass pipeline is a fixed sequence of four stages, each one
//! generation call that sees the outputs of the stages before it. Any
//! failure or timeout of the pipeline falls back to a single direct pass.
//! The final text is checked against the jargon denylist and rephrased at
//! most once.

use std::sync::Arc;
use std::time::Duration;

use graphrag_core::{GraphRagError, Row, SubgraphContext, Turn};
use graphrag_llm::LlmProvider;
use graphrag_session::format_history;
use serde_json::Value;

use crate::config::AnswerConfig;
use crate::jargon::JargonValidator;
use crate::prompts;

/// Deterministic answer when nothing matched, even after broadening.
pub const NO_DATA_ANSWER: &str = "No matching data was found for that question.";

/// Key fragments that mark a row as an aggregate (counts, sums, averages).
const AGGREGATE_KEYS: &[&str] = &[
    "count", "number", "total", "sum", "avg", "average", "min", "max", "frequency",
];

/// Everything the synthesizer reads.
pub struct AnswerInput<'a> {
    pub question: &'a str,
    pub rows: &'a [Row],
    pub context: &'a SubgraphContext,
    pub history: &'a [Turn],
}

/// A synthesized answer and how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAnswer {
    pub text: String,
    /// Stages run, in order (e.g. `plan`, `analyze`, ..., `direct`, `rephrase`).
    pub plan_summary: Vec<String>,
    /// The multi-pass pipeline produced the answer.
    pub multi_pass: bool,
    /// Denylisted terms remained after the rephrase retry.
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Plan,
    Analyze,
    Critique,
    Improve,
}

const PIPELINE: [Stage; 4] = [Stage::Plan, Stage::Analyze, Stage::Critique, Stage::Improve];

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Analyze => "analyze",
            Self::Critique => "critique",
            Self::Improve => "improve",
        }
    }

    fn system(self) -> &'static str {
        match self {
            Self::Plan => prompts::ANSWER_PLANNER,
            Self::Analyze => prompts::ANSWER_ANALYST,
            Self::Critique => prompts::ANSWER_CRITIC,
            Self::Improve => prompts::ANSWER_IMPROVER,
        }
    }
}

/// Outputs accumulated by the pipeline stages.
#[derive(Default)]
struct Drafts {
    plan: String,
    draft: String,
    critique: String,
    answer: String,
}

/// Facts and context rendered once per answer.
struct Material {
    question: String,
    facts: String,
    context: String,
    history: String,
}

impl Material {
    fn base_prompt(&self) -> String {
        let mut prompt = format!(
            "Question: {}\n\nFacts:\n{}\n\nBackground:\n{}\n",
            self.question, self.facts, self.context
        );
        if !self.history.is_empty() {
            prompt.push_str(&format!("\nEarlier conversation:\n{}\n", self.history));
        }
        prompt
    }

    fn stage_prompt(&self, stage: Stage, drafts: &Drafts) -> String {
        let mut prompt = self.base_prompt();
        match stage {
            Stage::Plan => {}
            Stage::Analyze => prompt.push_str(&format!("\nPlan:\n{}\n", drafts.plan)),
            Stage::Critique => prompt.push_str(&format!("\nDraft answer:\n{}\n", drafts.draft)),
            Stage::Improve => prompt.push_str(&format!(
                "\nDraft answer:\n{}\n\nCritique:\n{}\n",
                drafts.draft, drafts.critique
            )),
        }
        if matches!(stage, Stage::Analyze | Stage::Improve) {
            prompt.push('\n');
            prompt.push_str(prompts::PLAIN_LANGUAGE_RULES);
        }
        prompt
    }
}

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmProvider>,
    multi_pass: bool,
    pipeline_timeout: Duration,
    max_rows_in_prompt: usize,
    validator: JargonValidator,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &AnswerConfig) -> Result<Self, GraphRagError> {
        Ok(Self {
            llm,
            multi_pass: config.multi_pass,
            pipeline_timeout: Duration::from_secs(config.pipeline_timeout_secs),
            max_rows_in_prompt: config.max_rows_in_prompt,
            validator: JargonValidator::new(&config.denylist)?,
        })
    }

    /// Produce a validated answer. Fails only when the direct pass fails too.
    pub async fn synthesize(&self, input: &AnswerInput<'_>) -> Result<SynthesizedAnswer, GraphRagError> {
        let material = Material {
            question: input.question.to_string(),
            facts: shape_rows(input.rows, self.max_rows_in_prompt),
            context: input.context.to_prompt_text(),
            history: format_history(input.history),
        };

        let mut plan_summary = Vec::new();
        let mut from_pipeline = None;
        if self.multi_pass {
            let pipeline = self.run_pipeline(&material, &mut plan_summary);
            match tokio::time::timeout(self.pipeline_timeout, pipeline).await {
                Ok(Ok(answer)) if !answer.trim().is_empty() => from_pipeline = Some(answer),
                Ok(Ok(_)) => tracing::warn!("Answer pipeline produced nothing, answering directly"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Answer pipeline failed, answering directly"),
                Err(_) => tracing::warn!(
                    timeout_secs = self.pipeline_timeout.as_secs(),
                    "Answer pipeline timed out, answering directly"
                ),
            }
        }

        let multi_pass = from_pipeline.is_some();
        let text = match from_pipeline {
            Some(text) => text,
            None => {
                plan_summary.push("direct".to_string());
                self.direct(&material).await?
            }
        };

        let (text, flagged) = self.enforce_plain_language(&material, text, &mut plan_summary).await;
        Ok(SynthesizedAnswer {
            text,
            plan_summary,
            multi_pass,
            flagged,
        })
    }

    async fn run_pipeline(
        &self,
        material: &Material,
        plan_summary: &mut Vec<String>,
    ) -> Result<String, GraphRagError> {
        let mut drafts = Drafts::default();
        for stage in PIPELINE {
            let output = self
                .llm
                .generate(stage.system(), &material.stage_prompt(stage, &drafts))
                .await
                .map_err(|e| GraphRagError::Generation(e.to_string()))?;
            let output = output.trim().to_string();
            match stage {
                Stage::Plan => drafts.plan = output,
                Stage::Analyze => drafts.draft = output,
                Stage::Critique => drafts.critique = output,
                Stage::Improve => drafts.answer = output,
            }
            plan_summary.push(stage.name().to_string());
        }
        if drafts.answer.is_empty() {
            return Ok(drafts.draft);
        }
        Ok(drafts.answer)
    }

    async fn direct(&self, material: &Material) -> Result<String, GraphRagError> {
        let prompt = format!("{}\n{}", material.base_prompt(), prompts::PLAIN_LANGUAGE_RULES);
        let text = self
            .llm
            .generate(prompts::ANSWER_DIRECT, &prompt)
            .await
            .map_err(|e| GraphRagError::Generation(e.to_string()))?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GraphRagError::Generation("empty answer".into()));
        }
        Ok(text)
    }

    /// Rephrase once if the answer leaks technical terms; flag if that fails.
    async fn enforce_plain_language(
        &self,
        material: &Material,
        text: String,
        plan_summary: &mut Vec<String>,
    ) -> (String, bool) {
        let violations = self.validator.violations(&text);
        if violations.is_empty() {
            return (text, false);
        }

        tracing::warn!(terms = ?violations, "Answer contains technical terms, rephrasing");
        plan_summary.push("rephrase".to_string());
        let prompt = format!(
            "Question: {}\n\nAnswer to rewrite:\n{}\n\nWords to avoid: {}\n\n{}",
            material.question,
            text,
            violations.join(", "),
            prompts::PLAIN_LANGUAGE_RULES
        );

        let rephrased = match self.llm.generate(prompts::ANSWER_REPHRASE, &prompt).await {
            Ok(r) if !r.trim().is_empty() => r.trim().to_string(),
            Ok(_) => return (text, true),
            Err(e) => {
                tracing::warn!(error = %e, "Rephrase failed, keeping original answer");
                return (text, true);
            }
        };

        let remaining = self.validator.violations(&rephrased);
        if remaining.is_empty() {
            return (rephrased, false);
        }
        tracing::warn!(terms = ?remaining, "Answer still contains technical terms after rephrase");
        if remaining.len() <= violations.len() {
            (rephrased, true)
        } else {
            (text, true)
        }
    }
}

/// Render rows for an answering prompt.
///
/// Aggregate rows pass through verbatim. Record rows are given with their
/// total count and at most `max_rows` entries; a row holding a single
/// object column is unwrapped to that object.
pub fn shape_rows(rows: &[Row], max_rows: usize) -> String {
    if rows.is_empty() {
        return "No matching records were found.".to_string();
    }

    if rows.first().is_some_and(is_aggregate) {
        return serde_json::to_string_pretty(rows).unwrap_or_default();
    }

    let shown: Vec<Value> = rows.iter().take(max_rows).map(unwrap_single).collect();
    let listing = serde_json::to_string_pretty(&shown).unwrap_or_default();
    if shown.len() < rows.len() {
        format!(
            "Found {} total records. The first {} are:\n{}",
            rows.len(),
            shown.len(),
            listing
        )
    } else {
        format!("Found {} total records:\n{}", rows.len(), listing)
    }
}

fn is_aggregate(row: &Row) -> bool {
    row.keys().any(|key| {
        let key = key.to_lowercase();
        AGGREGATE_KEYS.iter().any(|frag| key.contains(frag))
    })
}

fn unwrap_single(row: &Row) -> Value {
    if row.len() == 1 {
        if let Some(Value::Object(inner)) = row.values().next() {
            return Value::Object(inner.clone());
        }
    }
    Value::Object(row.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn aggregates_pass_verbatim() {
        let rows = vec![row(json!({"numberOfPatients": 106}))];
        let text = shape_rows(&rows, 50);
        assert!(text.contains("\"numberOfPatients\": 106"));
        assert!(!text.contains("total records"));
    }

    #[test]
    fn single_object_columns_are_unwrapped() {
        let rows = vec![row(json!({"p": {"firstName": "Ana", "lastName": "Lopez"}}))];
        let text = shape_rows(&rows, 50);
        assert!(text.starts_with("Found 1 total records:"));
        assert!(text.contains("\"firstName\": \"Ana\""));
        assert!(!text.contains("\"p\""));
    }

    #[test]
    fn long_listings_are_capped_with_total() {
        let rows: Vec<Row> = (0..120).map(|i| row(json!({"name": format!("P{i}")}))).collect();
        let text = shape_rows(&rows, 50);
        assert!(text.starts_with("Found 120 total records. The first 50 are:"));
        assert!(text.contains("P49"));
        assert!(!text.contains("P50\""));
    }

    #[test]
    fn empty_rows_say_so() {
        assert_eq!(shape_rows(&[], 50), "No matching records were found.");
    }

    #[test]
    fn later_stages_see_earlier_outputs() {
        let material = Material {
            question: "q".into(),
            facts: "f".into(),
            context: "c".into(),
            history: String::new(),
        };
        let drafts = Drafts {
            plan: "step one".into(),
            draft: "first draft".into(),
            critique: "too vague".into(),
            answer: String::new(),
        };
        assert!(!material.stage_prompt(Stage::Plan, &drafts).contains("step one"));
        assert!(material.stage_prompt(Stage::Analyze, &drafts).contains("step one"));
        let improve = material.stage_prompt(Stage::Improve, &drafts);
        assert!(improve.contains("first draft") && improve.contains("too vague"));
        assert!(!improve.contains("Earlier conversation"));
    }
}
