//! Document grading and the improvement-loop state machine
//!
//! The grader scores a draft on five weighted rubric dimensions. The loop
//! itself is a bounded state machine driven by the engine: DRAFTED → GRADED →
//! (PASS | IMPROVING) → GRADED → ... → FINAL, capped by configuration, with
//! the best-scoring draft winning when the cap is reached.

use crate::config::{Config, GradeWeights};
use crate::error::Result;
use crate::llm::client::{extract_json, CompletionRequest, LanguageModel};
use crate::llm::extractor::RequirementRecord;
use crate::llm::prompts::{PromptTemplates, SYSTEM_PROMPT};
use log::warn;
use serde::{Deserialize, Serialize};

/// Improvement-loop states. Kept explicit so the loop can never degenerate
/// into an open-ended retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftState {
    Drafted,
    Graded,
    Improving,
    Final,
}

/// Normalized per-dimension scores in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub ats: f32,
    pub impact: f32,
    pub alignment: f32,
    pub seniority: f32,
    pub anti_hallucination: f32,
}

impl DimensionScores {
    pub fn composite(&self, weights: &GradeWeights) -> f32 {
        let total = weights.ats
            + weights.impact
            + weights.alignment
            + weights.seniority
            + weights.anti_hallucination;
        if total == 0.0 {
            return 0.0;
        }

        (self.ats * weights.ats
            + self.impact * weights.impact
            + self.alignment * weights.alignment
            + self.seniority * weights.seniority
            + self.anti_hallucination * weights.anti_hallucination)
            / total
    }

    /// Name of the weakest dimension, for targeting revisions.
    pub fn weakest(&self) -> &'static str {
        let pairs = [
            ("ats", self.ats),
            ("impact", self.impact),
            ("alignment", self.alignment),
            ("seniority", self.seniority),
            ("anti_hallucination", self.anti_hallucination),
        ];
        pairs
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| *name)
            .unwrap_or("ats")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementDirective {
    pub dimension: String,
    /// Employer name of the targeted section, or "HEADER"
    pub section: String,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub scores: DimensionScores,
    pub composite: f32,
    pub passed: bool,
    pub directives: Vec<ImprovementDirective>,
    /// Which grading pass produced this result (0 = initial draft)
    pub iteration: usize,
    /// True when the deterministic fallback produced the scores
    pub heuristic: bool,
}

/// Deterministic inputs for the fallback grade when the model output stays
/// malformed after a retry. Keeps the improvement loop terminating.
#[derive(Debug, Clone, Copy)]
pub struct FallbackSignals {
    pub keyword_coverage: f32,
    pub qa_confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawGrade {
    scores: RawScores,
    #[serde(default)]
    improvement_directives: Vec<ImprovementDirective>,
}

#[derive(Debug, Deserialize)]
struct RawScores {
    ats: f32,
    impact: f32,
    alignment: f32,
    seniority: f32,
    anti_hallucination: f32,
}

pub struct DocumentGrader<'a> {
    model: &'a dyn LanguageModel,
    templates: PromptTemplates,
    config: &'a Config,
}

impl<'a> DocumentGrader<'a> {
    pub fn new(model: &'a dyn LanguageModel, config: &'a Config) -> Self {
        Self {
            model,
            templates: PromptTemplates::default(),
            config,
        }
    }

    /// Grade one draft. Malformed model output is retried once, then a
    /// deterministic heuristic grade takes over so the loop always advances.
    ///
    /// A low-confidence requirement record (extraction fallback) grades
    /// against a slightly relaxed passing bar.
    pub async fn grade(
        &self,
        document: &str,
        requirement: &RequirementRecord,
        signals: FallbackSignals,
        iteration: usize,
    ) -> Result<GradeResult> {
        for attempt in 0..2 {
            match self.grade_once(document, requirement).await {
                Ok((scores, directives)) => {
                    return Ok(self.finish(scores, directives, requirement, iteration, false));
                }
                Err(e) => {
                    warn!("Grading attempt {} failed: {}", attempt + 1, e);
                }
            }
        }

        warn!("Grading fell back to heuristic scoring");
        let scores = DimensionScores {
            ats: signals.keyword_coverage,
            impact: signals.qa_confidence,
            alignment: signals.keyword_coverage,
            seniority: 0.5,
            anti_hallucination: signals.qa_confidence,
        };
        Ok(self.finish(scores, Vec::new(), requirement, iteration, true))
    }

    async fn grade_once(
        &self,
        document: &str,
        requirement: &RequirementRecord,
    ) -> Result<(DimensionScores, Vec<ImprovementDirective>)> {
        let prompt = self
            .templates
            .render_document_grade(document, &requirement.summary());

        let response = self
            .model
            .complete(&CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt,
            })
            .await?;

        let raw: RawGrade = extract_json(&response)?;
        let scores = DimensionScores {
            ats: normalize(raw.scores.ats),
            impact: normalize(raw.scores.impact),
            alignment: normalize(raw.scores.alignment),
            seniority: normalize(raw.scores.seniority),
            anti_hallucination: normalize(raw.scores.anti_hallucination),
        };
        Ok((scores, raw.improvement_directives))
    }

    fn finish(
        &self,
        scores: DimensionScores,
        directives: Vec<ImprovementDirective>,
        requirement: &RequirementRecord,
        iteration: usize,
        heuristic: bool,
    ) -> GradeResult {
        let composite = scores.composite(&self.config.grading.weights);
        let threshold = self.passing_threshold(requirement);

        GradeResult {
            scores,
            composite,
            passed: composite >= threshold,
            directives,
            iteration,
            heuristic,
        }
    }

    fn passing_threshold(&self, requirement: &RequirementRecord) -> f32 {
        if requirement.low_confidence {
            self.config.grading.passing_score - 0.05
        } else {
            self.config.grading.passing_score
        }
    }
}

/// Model scores arrive on a 0-100 scale; clamp defensively and normalize.
fn normalize(score: f32) -> f32 {
    (score / 100.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ScriptedModel;
    use crate::llm::extractor::{CompetencyMix, RoleCategory, SeniorityTier};

    fn requirement(low_confidence: bool) -> RequirementRecord {
        RequirementRecord {
            role_title: "Backend Engineer".to_string(),
            company: "Initech".to_string(),
            role_category: RoleCategory::Engineering,
            seniority: SeniorityTier::Senior,
            competency_mix: CompetencyMix::uniform(),
            keywords: Vec::new(),
            pain_points: Vec::new(),
            success_metrics: Vec::new(),
            required_skills: Vec::new(),
            nice_to_have_skills: Vec::new(),
            low_confidence,
        }
    }

    fn signals() -> FallbackSignals {
        FallbackSignals {
            keyword_coverage: 0.6,
            qa_confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn test_passing_grade() {
        let config = Config::default();
        let model = ScriptedModel::new().with_fallback(
            r#"{"scores": {"ats": 90, "impact": 88, "alignment": 92, "seniority": 85, "anti_hallucination": 95}, "improvement_directives": []}"#,
        );
        let grader = DocumentGrader::new(&model, &config);

        let grade = grader
            .grade("## CV", &requirement(false), signals(), 0)
            .await
            .unwrap();

        assert!(grade.passed);
        assert!(!grade.heuristic);
        assert!(grade.composite > 0.85);
    }

    #[tokio::test]
    async fn test_failing_grade_carries_directives() {
        let config = Config::default();
        let model = ScriptedModel::new().with_fallback(
            r#"{"scores": {"ats": 40, "impact": 60, "alignment": 55, "seniority": 70, "anti_hallucination": 90},
                "improvement_directives": [{"dimension": "ats", "section": "Acme Corp", "instruction": "Work the kubernetes keyword into the platform bullets"}]}"#,
        );
        let grader = DocumentGrader::new(&model, &config);

        let grade = grader
            .grade("## CV", &requirement(false), signals(), 1)
            .await
            .unwrap();

        assert!(!grade.passed);
        assert_eq!(grade.directives.len(), 1);
        assert_eq!(grade.directives[0].section, "Acme Corp");
        assert_eq!(grade.iteration, 1);
    }

    #[tokio::test]
    async fn test_malformed_output_degrades_to_heuristic() {
        let config = Config::default();
        let model = ScriptedModel::new().with_fallback("the document looks fine to me");
        let grader = DocumentGrader::new(&model, &config);

        let grade = grader
            .grade("## CV", &requirement(false), signals(), 0)
            .await
            .unwrap();

        assert!(grade.heuristic);
        assert_eq!(model.call_count(), 2);
        assert!(grade.composite > 0.0);
    }

    #[test]
    fn test_composite_weighting() {
        let config = Config::default();
        let scores = DimensionScores {
            ats: 1.0,
            impact: 0.0,
            alignment: 0.0,
            seniority: 0.0,
            anti_hallucination: 0.0,
        };
        let composite = scores.composite(&config.grading.weights);
        assert!((composite - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_weakest_dimension() {
        let scores = DimensionScores {
            ats: 0.9,
            impact: 0.2,
            alignment: 0.8,
            seniority: 0.7,
            anti_hallucination: 0.95,
        };
        assert_eq!(scores.weakest(), "impact");
    }

    #[tokio::test]
    async fn test_low_confidence_requirement_relaxes_bar() {
        let config = Config::default();
        // Composite lands between the relaxed and the normal threshold
        let model = ScriptedModel::new().with_fallback(
            r#"{"scores": {"ats": 80, "impact": 80, "alignment": 80, "seniority": 80, "anti_hallucination": 80}, "improvement_directives": []}"#,
        );
        let grader = DocumentGrader::new(&model, &config);

        let strict = grader
            .grade("## CV", &requirement(false), signals(), 0)
            .await
            .unwrap();
        let relaxed = grader
            .grade("## CV", &requirement(true), signals(), 0)
            .await
            .unwrap();

        assert!(!strict.passed);
        assert!(relaxed.passed);
    }
}
