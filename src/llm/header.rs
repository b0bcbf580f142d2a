//! Header block synthesis: identity, tagline, highlights and grouped skills
//!
//! The tagline is model-written but policed deterministically: any first- or
//! second-person pronoun rejects the output, one corrective regeneration is
//! attempted, then a pronoun-free fallback is built from the career history.
//! Skills are grouped without the model and only from evidenced material.

use crate::error::Result;
use crate::input::splitter::{CandidateIdentity, RoleRecord};
use crate::llm::client::{extract_json, CompletionRequest, LanguageModel};
use crate::llm::extractor::RequirementRecord;
use crate::llm::prompts::{PromptTemplates, SYSTEM_PROMPT};
use crate::processing::lexicon::{self, SkillBucket};
use crate::processing::stitcher::DocumentBody;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Typed company-research signal supplied by the research collaborator.
/// Optional input: generation never blocks on its absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySignal {
    pub kind: SignalKind,
    pub description: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Funding,
    Launch,
    Acquisition,
    Expansion,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillGroup {
    pub name: String,
    pub skills: Vec<String>,
}

/// Identity and summary sections above the role sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderBlock {
    pub name: String,
    pub contact: Vec<String>,
    pub title_line: String,
    /// Third-person narrative, guaranteed free of first/second-person pronouns
    pub tagline: String,
    pub highlights: Vec<String>,
    pub skill_groups: Vec<SkillGroup>,
    pub languages: Vec<String>,
    pub certifications: Vec<String>,
    pub education: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    tagline: String,
    #[serde(default)]
    highlights: Vec<String>,
}

pub struct HeaderSynthesizer<'a> {
    model: &'a dyn LanguageModel,
    templates: PromptTemplates,
    pronoun_regex: Regex,
}

impl<'a> HeaderSynthesizer<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self {
            model,
            templates: PromptTemplates::default(),
            pronoun_regex: Regex::new(r"(?i)\b(i|me|my|mine|we|us|our|ours|you|your|yours)\b")
                .expect("Invalid pronoun regex"),
        }
    }

    pub async fn synthesize(
        &self,
        identity: &CandidateIdentity,
        roles: &[RoleRecord],
        requirement: &RequirementRecord,
        body: &DocumentBody,
        signals: &[CompanySignal],
    ) -> Result<HeaderBlock> {
        let (tagline, highlights) = self
            .tagline_and_highlights(roles, requirement, body, signals)
            .await;

        Ok(HeaderBlock {
            name: identity
                .name
                .clone()
                .unwrap_or_else(|| "Candidate".to_string()),
            contact: identity.contact.clone(),
            title_line: requirement.role_title.clone(),
            tagline,
            highlights,
            skill_groups: self.grouped_skills(roles, requirement),
            languages: identity.languages.clone(),
            certifications: identity.certifications.clone(),
            education: identity.education.clone(),
        })
    }

    /// Model call with the hard pronoun check; violations get one corrective
    /// regeneration before the deterministic fallback takes over.
    async fn tagline_and_highlights(
        &self,
        roles: &[RoleRecord],
        requirement: &RequirementRecord,
        body: &DocumentBody,
        signals: &[CompanySignal],
    ) -> (String, Vec<String>) {
        let mut feedback: Option<String> = None;

        for attempt in 0..2 {
            match self
                .synthesize_once(roles, requirement, body, signals, feedback.as_deref())
                .await
            {
                Ok(raw) => {
                    if let Some(pronoun) = self.first_pronoun(&raw.tagline) {
                        warn!(
                            "Tagline attempt {} used forbidden pronoun '{}'",
                            attempt + 1,
                            pronoun
                        );
                        feedback = Some(format!(
                            "The tagline contained the forbidden pronoun '{}'. Rewrite strictly in third person.",
                            pronoun
                        ));
                        continue;
                    }
                    return (raw.tagline, self.settle_highlights(raw.highlights, body));
                }
                Err(e) => {
                    warn!("Header synthesis attempt {} failed: {}", attempt + 1, e);
                    feedback = Some("Respond with the exact JSON schema requested.".to_string());
                }
            }
        }

        (
            self.fallback_tagline(roles, requirement),
            self.settle_highlights(Vec::new(), body),
        )
    }

    async fn synthesize_once(
        &self,
        roles: &[RoleRecord],
        requirement: &RequirementRecord,
        body: &DocumentBody,
        signals: &[CompanySignal],
        feedback: Option<&str>,
    ) -> Result<RawHeader> {
        let career_summary = roles
            .iter()
            .map(|r| format!("{} — {} ({})", r.employer, r.title, r.date_range))
            .collect::<Vec<_>>()
            .join("\n");

        let strongest = body
            .sections
            .iter()
            .flat_map(|s| s.bullets.iter())
            .take(8)
            .map(|b| format!("- {}", b.text))
            .collect::<Vec<_>>()
            .join("\n");

        let signals_text = if signals.is_empty() {
            "none".to_string()
        } else {
            signals
                .iter()
                .map(|s| format!("{:?}: {} ({})", s.kind, s.description, s.source))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = self.templates.render_header_synthesis(
            &requirement.summary(),
            &career_summary,
            &strongest,
            &signals_text,
            feedback,
        );

        let response = self
            .model
            .complete(&CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt,
            })
            .await?;

        extract_json(&response)
    }

    fn first_pronoun(&self, text: &str) -> Option<String> {
        self.pronoun_regex
            .find(text)
            .map(|m| m.as_str().to_string())
    }

    /// Keep 4-5 model highlights; short or missing lists are padded from the
    /// strongest assembled bullets so the section is never empty.
    fn settle_highlights(&self, mut highlights: Vec<String>, body: &DocumentBody) -> Vec<String> {
        highlights.retain(|h| !h.trim().is_empty() && self.first_pronoun(h).is_none());
        highlights.truncate(5);

        if highlights.len() < 4 {
            for section in &body.sections {
                for bullet in &section.bullets {
                    if highlights.len() >= 4 {
                        break;
                    }
                    if !highlights.iter().any(|h| h == &bullet.text) {
                        highlights.push(bullet.text.clone());
                    }
                }
            }
        }

        highlights
    }

    /// Pronoun-free by construction.
    fn fallback_tagline(&self, roles: &[RoleRecord], requirement: &RequirementRecord) -> String {
        let employers = roles
            .iter()
            .take(3)
            .map(|r| r.employer.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let focus = requirement
            .keywords
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");

        let title = requirement.role_title.to_lowercase();
        let lead = if title.starts_with(&requirement.seniority.to_string()) {
            capitalize(&title)
        } else {
            format!("{} {}", capitalize(&requirement.seniority.to_string()), title)
        };

        format!(
            "{} with a track record across {}, focused on {}.",
            lead, employers, focus
        )
    }

    /// Grouped skills block. Declared role skills are evidenced by
    /// definition; requirement keywords join only when independently
    /// evidenced in some role's text or declared skills.
    fn grouped_skills(&self, roles: &[RoleRecord], requirement: &RequirementRecord) -> Vec<SkillGroup> {
        let evidence: String = roles
            .iter()
            .map(|r| {
                format!(
                    "{} {} {}",
                    r.achievements_text(),
                    r.hard_skills.join(" "),
                    r.soft_skills.join(" ")
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut candidates: Vec<String> = Vec::new();
        for role in roles {
            candidates.extend(role.hard_skills.iter().cloned());
            candidates.extend(role.soft_skills.iter().cloned());
        }
        for keyword in requirement
            .keywords
            .iter()
            .chain(requirement.required_skills.iter())
        {
            if evidence.contains(&keyword.to_lowercase()) {
                candidates.push(keyword.clone());
            }
        }

        let mut seen = std::collections::HashSet::new();
        let mut groups: Vec<(SkillBucket, Vec<String>)> = lexicon::skill_categories()
            .iter()
            .map(|(_, bucket)| (*bucket, Vec::new()))
            .collect();

        for skill in candidates {
            if !seen.insert(skill.to_lowercase()) {
                continue;
            }
            let bucket = lexicon::bucket_for(&skill);
            if let Some((_, skills)) = groups.iter_mut().find(|(b, _)| *b == bucket) {
                skills.push(skill);
            }
        }

        lexicon::skill_categories()
            .iter()
            .zip(groups)
            .filter(|(_, (_, skills))| !skills.is_empty())
            .map(|((name, _), (_, skills))| SkillGroup {
                name: name.to_string(),
                skills,
            })
            .collect()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ScriptedModel;
    use crate::llm::extractor::{CompetencyMix, RoleCategory, SeniorityTier};
    use crate::llm::generator::{BulletStructure, BulletTemplate, GeneratedBullet};
    use crate::processing::stitcher::RoleSection;

    fn requirement() -> RequirementRecord {
        RequirementRecord {
            role_title: "Staff Backend Engineer".to_string(),
            company: "Initech".to_string(),
            role_category: RoleCategory::Engineering,
            seniority: SeniorityTier::Staff,
            competency_mix: CompetencyMix::uniform(),
            keywords: vec!["kubernetes".to_string(), "caching".to_string(), "terraform".to_string()],
            pain_points: Vec::new(),
            success_metrics: Vec::new(),
            required_skills: vec!["grafana".to_string()],
            nice_to_have_skills: Vec::new(),
            low_confidence: false,
        }
    }

    fn roles() -> Vec<RoleRecord> {
        vec![RoleRecord {
            id: "role-1".to_string(),
            employer: "Acme Corp".to_string(),
            title: "Senior Backend Engineer".to_string(),
            location: "Berlin".to_string(),
            date_range: "2021 - Present".to_string(),
            industry: None,
            achievements: vec!["Reduced latency by 40% using caching on Kubernetes".to_string()],
            hard_skills: vec!["Rust".to_string(), "PostgreSQL".to_string()],
            soft_skills: vec!["mentoring".to_string()],
            most_recent: true,
            source_order: 0,
            start_year: Some(2021),
            end_year: None,
            is_current: true,
        }]
    }

    fn body() -> DocumentBody {
        DocumentBody {
            sections: vec![RoleSection {
                role_id: "role-1".to_string(),
                employer: "Acme Corp".to_string(),
                title: "Senior Backend Engineer".to_string(),
                location: "Berlin".to_string(),
                date_range: "2021 - Present".to_string(),
                bullets: vec![GeneratedBullet {
                    text: "Cut latency 40% with caching".to_string(),
                    source_text: "Reduced latency by 40% using caching on Kubernetes".to_string(),
                    source_metric: Some("40%".to_string()),
                    keyword: Some("caching".to_string()),
                    pain_point: None,
                    structure: BulletStructure::default(),
                    template: BulletTemplate::TechnologyForward,
                    role_id: "role-1".to_string(),
                }],
            }],
            word_count: 5,
        }
    }

    fn identity() -> CandidateIdentity {
        CandidateIdentity {
            name: Some("Jane Candidate".to_string()),
            contact: vec!["jane@example.com".to_string()],
            education: vec!["MSc Computer Science".to_string()],
            certifications: Vec::new(),
            languages: vec!["English".to_string()],
        }
    }

    #[tokio::test]
    async fn test_clean_tagline_accepted() {
        let model = ScriptedModel::new().with_fallback(
            r#"{"tagline": "Seasoned backend engineer scaling distributed systems.", "highlights": ["Cut latency 40% with caching", "Scaled ingestion", "Led migrations", "Hardened infra"]}"#,
        );
        let synthesizer = HeaderSynthesizer::new(&model);

        let header = synthesizer
            .synthesize(&identity(), &roles(), &requirement(), &body(), &[])
            .await
            .unwrap();

        assert_eq!(header.name, "Jane Candidate");
        assert!(header.tagline.contains("Seasoned backend engineer"));
        assert_eq!(header.highlights.len(), 4);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_pronoun_violation_triggers_retry_then_fallback() {
        let model = ScriptedModel::new().with_fallback(
            r#"{"tagline": "I scale distributed systems with my team.", "highlights": []}"#,
        );
        let synthesizer = HeaderSynthesizer::new(&model);

        let header = synthesizer
            .synthesize(&identity(), &roles(), &requirement(), &body(), &[])
            .await
            .unwrap();

        // Two model attempts, both rejected, deterministic fallback used
        assert_eq!(model.call_count(), 2);
        let pronouns = Regex::new(r"(?i)\b(i|me|my|we|our|you|your)\b").unwrap();
        assert!(pronouns.find(&header.tagline).is_none());
        assert!(header.tagline.contains("Acme Corp"));
    }

    #[tokio::test]
    async fn test_unevidenced_requirement_skill_excluded() {
        let model = ScriptedModel::new().with_fallback(
            r#"{"tagline": "Backend engineer focused on reliability.", "highlights": ["a", "b", "c", "d"]}"#,
        );
        let synthesizer = HeaderSynthesizer::new(&model);

        let header = synthesizer
            .synthesize(&identity(), &roles(), &requirement(), &body(), &[])
            .await
            .unwrap();

        let all_skills: Vec<String> = header
            .skill_groups
            .iter()
            .flat_map(|g| g.skills.iter().map(|s| s.to_lowercase()))
            .collect();

        // Declared and evidenced skills are present
        assert!(all_skills.contains(&"rust".to_string()));
        assert!(all_skills.contains(&"kubernetes".to_string()));
        // "terraform" and "grafana" appear nowhere in the role records
        assert!(!all_skills.contains(&"terraform".to_string()));
        assert!(!all_skills.contains(&"grafana".to_string()));
    }
}
