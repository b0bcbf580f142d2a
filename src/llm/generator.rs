//! Per-role bullet generation
//!
//! One model call per role rewrites the role's verbatim achievements into
//! keyword-aware bullets. Every bullet must trace back to a source
//! achievement; bullets that fail validation are dropped and a single
//! corrective retry fills remaining slots before a shorter list is accepted.

use crate::config::Config;
use crate::error::{CvTailorError, Result};
use crate::input::splitter::RoleRecord;
use crate::llm::client::{extract_json, CompletionRequest, LanguageModel};
use crate::llm::extractor::RequirementRecord;
use crate::llm::prompts::{PromptTemplates, SYSTEM_PROMPT};
use crate::processing::lexicon;
use crate::processing::mapper::AchievementMapping;
use crate::processing::text_processor::TextProcessor;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which structural family a bullet follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulletTemplate {
    /// Action, named technology, quantified result, business impact, context
    TechnologyForward,
    /// Action, quantified result, business impact, context
    ResultForward,
}

impl std::fmt::Display for BulletTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulletTemplate::TechnologyForward => write!(f, "technology-forward"),
            BulletTemplate::ResultForward => write!(f, "result-forward"),
        }
    }
}

/// Structural decomposition of a bullet. Model output varies; every field is
/// optional and consumers must handle absence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulletStructure {
    pub action: Option<String>,
    pub technology: Option<String>,
    pub result: Option<String>,
    pub impact: Option<String>,
    pub situation: Option<String>,
}

/// One rewritten achievement statement, grounded in its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBullet {
    pub text: String,
    /// The verbatim source achievement this bullet was derived from
    pub source_text: String,
    pub source_metric: Option<String>,
    pub keyword: Option<String>,
    pub pain_point: Option<String>,
    pub structure: BulletStructure,
    pub template: BulletTemplate,
    pub role_id: String,
}

impl GeneratedBullet {
    pub fn word_count(&self) -> usize {
        TextProcessor::word_count(&self.text)
    }
}

#[derive(Debug, Deserialize)]
struct RawBullet {
    text: String,
    source_index: usize,
    #[serde(default)]
    source_metric: Option<String>,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    pain_point: Option<String>,
    #[serde(default)]
    structure: Option<BulletStructure>,
}

/// Decide the structural template for a source achievement: achievements with
/// enough technical-term density are technology-forward, people/process
/// achievements are result-forward.
pub fn classify_template(achievement: &str, tech_threshold: f32) -> BulletTemplate {
    let text = TextProcessor::new();
    let tokens = text.tokenize(achievement);
    if tokens.is_empty() {
        return BulletTemplate::ResultForward;
    }

    let terms = lexicon::tech_terms();
    let lowered = achievement.to_lowercase();
    // Multi-word terms are matched against the whole string, not tokens
    let mut hits = tokens.iter().filter(|t| terms.contains(*t)).count();
    hits += terms
        .iter()
        .filter(|t| t.contains(' ') && lowered.contains(t.as_str()))
        .count();

    if hits as f32 / tokens.len() as f32 >= tech_threshold {
        BulletTemplate::TechnologyForward
    } else {
        BulletTemplate::ResultForward
    }
}

/// Raw achievements passed through untouched when generation for a role is
/// abandoned (timeout or exhausted retries). Degraded but non-empty.
pub fn degraded_bullets(role: &RoleRecord, target_count: usize, config: &Config) -> Vec<GeneratedBullet> {
    role.achievements
        .iter()
        .take(target_count)
        .map(|achievement| GeneratedBullet {
            text: achievement.clone(),
            source_text: achievement.clone(),
            source_metric: None,
            keyword: None,
            pain_point: None,
            structure: BulletStructure::default(),
            template: classify_template(achievement, config.generation.tech_template_threshold),
            role_id: role.id.clone(),
        })
        .collect()
}

pub struct RoleBulletGenerator<'a> {
    model: &'a dyn LanguageModel,
    templates: PromptTemplates,
    config: &'a Config,
    number_regex: Regex,
}

impl<'a> RoleBulletGenerator<'a> {
    pub fn new(model: &'a dyn LanguageModel, config: &'a Config) -> Self {
        Self {
            model,
            templates: PromptTemplates::default(),
            config,
            number_regex: Regex::new(r"\d[\d,.]*").expect("Invalid number regex"),
        }
    }

    /// Generate up to `target_count` grounded bullets for one role.
    ///
    /// An empty role yields an empty list without a model call. Validation
    /// failures trigger one corrective retry carrying the rejection reasons;
    /// whatever survives both passes is returned, possibly short.
    pub async fn generate(
        &self,
        role: &RoleRecord,
        requirement: &RequirementRecord,
        mapping: &AchievementMapping,
        target_count: usize,
    ) -> Result<Vec<GeneratedBullet>> {
        self.generate_with_feedback(role, requirement, mapping, target_count, None)
            .await
    }

    /// Generation seeded with corrective feedback, used when a QA batch
    /// failure or an improvement directive sends a role back for rework.
    pub async fn generate_with_feedback(
        &self,
        role: &RoleRecord,
        requirement: &RequirementRecord,
        mapping: &AchievementMapping,
        target_count: usize,
        feedback: Option<&str>,
    ) -> Result<Vec<GeneratedBullet>> {
        if role.achievements.is_empty() || target_count == 0 {
            debug!("Role {} has no achievements to rewrite", role.id);
            return Ok(Vec::new());
        }

        let target = target_count.min(role.achievements.len());

        let (mut accepted, rejections) = self
            .attempt(role, requirement, mapping, target, feedback)
            .await?;

        if accepted.len() < target && !rejections.is_empty() {
            let feedback = rejections.join("\n");
            warn!(
                "Role {}: {} bullet(s) rejected, retrying with corrective feedback",
                role.id,
                rejections.len()
            );

            match self
                .attempt(role, requirement, mapping, target, Some(&feedback))
                .await
            {
                Ok((retried, _)) => {
                    for bullet in retried {
                        if accepted.len() == target {
                            break;
                        }
                        if !accepted.iter().any(|b: &GeneratedBullet| b.text == bullet.text) {
                            accepted.push(bullet);
                        }
                    }
                }
                Err(e) => warn!("Role {}: corrective retry failed: {}", role.id, e),
            }
        }

        accepted.truncate(target);
        Ok(accepted)
    }

    async fn attempt(
        &self,
        role: &RoleRecord,
        requirement: &RequirementRecord,
        mapping: &AchievementMapping,
        target: usize,
        feedback: Option<&str>,
    ) -> Result<(Vec<GeneratedBullet>, Vec<String>)> {
        let prompt = self.templates.render_role_bullets(
            &format!("{} — {} ({})", role.employer, role.title, role.date_range),
            &self.numbered_achievements(role),
            &self.template_assignments(role),
            &requirement.summary(),
            &mapping.hints_for_role(&role.id),
            target,
            self.config.generation.min_bullet_words,
            self.config.generation.max_bullet_words,
            feedback,
        );

        let response = self
            .model
            .complete(&CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt,
            })
            .await?;

        let raw: Vec<RawBullet> = extract_json(&response)?;

        let mut accepted = Vec::new();
        let mut rejections = Vec::new();

        for (idx, bullet) in raw.into_iter().enumerate() {
            match self.validate(role, bullet) {
                Ok(validated) => accepted.push(validated),
                Err(reason) => {
                    rejections.push(format!("bullet {}: {}", idx, reason));
                }
            }
        }

        accepted.truncate(target);
        Ok((accepted, rejections))
    }

    /// Boundary validation: traceable source, exact numeric fidelity, word
    /// bounds. A bullet failing any check never reaches QA.
    fn validate(&self, role: &RoleRecord, raw: RawBullet) -> std::result::Result<GeneratedBullet, String> {
        let source_text = role
            .achievements
            .get(raw.source_index)
            .ok_or_else(|| format!("source_index {} out of range", raw.source_index))?
            .clone();

        let words = TextProcessor::word_count(&raw.text);
        let min = self.config.generation.min_bullet_words;
        let max = self.config.generation.max_bullet_words;
        if words < min || words > max {
            return Err(format!(
                "word count {} outside {}-{} for text starting '{}'",
                words,
                min,
                max,
                truncate(&raw.text, 40)
            ));
        }

        for figure in self.number_regex.find_iter(&raw.text) {
            let token = figure.as_str().trim_end_matches(['.', ',']);
            if !source_text.contains(token) {
                return Err(format!(
                    "figure '{}' does not appear in source achievement '{}'",
                    token,
                    truncate(&source_text, 60)
                ));
            }
        }

        Ok(GeneratedBullet {
            template: classify_template(&source_text, self.config.generation.tech_template_threshold),
            text: raw.text,
            source_text,
            source_metric: raw.source_metric.filter(|m| !m.trim().is_empty()),
            keyword: raw.keyword.filter(|k| !k.trim().is_empty()),
            pain_point: raw.pain_point.filter(|p| !p.trim().is_empty()),
            structure: raw.structure.unwrap_or_default(),
            role_id: role.id.clone(),
        })
    }

    fn numbered_achievements(&self, role: &RoleRecord) -> String {
        role.achievements
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{}. {}", i, a))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn template_assignments(&self, role: &RoleRecord) -> String {
        role.achievements
            .iter()
            .enumerate()
            .map(|(i, a)| {
                format!(
                    "{} -> {}",
                    i,
                    classify_template(a, self.config.generation.tech_template_threshold)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
