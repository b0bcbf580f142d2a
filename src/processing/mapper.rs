//! Achievement-to-pain-point mapping
//!
//! A pure lexical pre-pass: no model call, deterministic for fixed inputs.
//! The mapping is injected into the generation prompt so the model does not
//! have to infer relevance on its own, which keeps repeated runs consistent.

use crate::config::Config;
use crate::input::splitter::RoleRecord;
use crate::llm::extractor::RequirementRecord;
use crate::processing::text_processor::TextProcessor;
use serde::{Deserialize, Serialize};

/// Best pain-point assignment for one achievement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementAssignment {
    pub role_id: String,
    pub achievement_index: usize,
    pub pain_point_index: usize,
    pub pain_point: String,
    pub score: f32,
}

/// Deterministic similarity mapping between achievements and pain points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementMapping {
    pub assignments: Vec<AchievementAssignment>,
}

impl AchievementMapping {
    /// Assignment for a specific achievement, if one cleared the threshold.
    pub fn for_achievement(&self, role_id: &str, index: usize) -> Option<&AchievementAssignment> {
        self.assignments
            .iter()
            .find(|a| a.role_id == role_id && a.achievement_index == index)
    }

    /// Prompt-ready hint lines for one role's achievements.
    pub fn hints_for_role(&self, role_id: &str) -> String {
        let lines: Vec<String> = self
            .assignments
            .iter()
            .filter(|a| a.role_id == role_id)
            .map(|a| format!("{} -> {}", a.achievement_index, a.pain_point))
            .collect();

        if lines.is_empty() {
            "none".to_string()
        } else {
            lines.join("\n")
        }
    }
}

pub struct AchievementMapper {
    text: TextProcessor,
    relevance_threshold: f32,
}

impl AchievementMapper {
    pub fn new(config: &Config) -> Self {
        Self {
            text: TextProcessor::new(),
            relevance_threshold: config.mapping.relevance_threshold,
        }
    }

    /// Map every achievement across all roles to its best-scoring pain point.
    ///
    /// Achievements scoring below the relevance threshold stay unmapped.
    /// Ties are broken by the pain point appearing earlier in the
    /// requirement record's list.
    pub fn map(&self, roles: &[RoleRecord], requirement: &RequirementRecord) -> AchievementMapping {
        let mut assignments = Vec::new();

        if requirement.pain_points.is_empty() {
            return AchievementMapping { assignments };
        }

        for role in roles {
            for (achievement_index, achievement) in role.achievements.iter().enumerate() {
                let mut best: Option<(usize, f32)> = None;

                for (pain_index, pain_point) in requirement.pain_points.iter().enumerate() {
                    let score = self.text.overlap_coefficient(achievement, pain_point);

                    let better = match best {
                        None => score >= self.relevance_threshold,
                        // Strictly-greater keeps the earlier pain point on ties
                        Some((_, best_score)) => score > best_score,
                    };
                    if better && score >= self.relevance_threshold {
                        best = Some((pain_index, score));
                    }
                }

                if let Some((pain_index, score)) = best {
                    assignments.push(AchievementAssignment {
                        role_id: role.id.clone(),
                        achievement_index,
                        pain_point_index: pain_index,
                        pain_point: requirement.pain_points[pain_index].clone(),
                        score,
                    });
                }
            }
        }

        assignments.sort_by(|a, b| {
            a.role_id
                .cmp(&b.role_id)
                .then_with(|| a.achievement_index.cmp(&b.achievement_index))
        });

        AchievementMapping { assignments }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::extractor::{CompetencyMix, RoleCategory, SeniorityTier};

    fn requirement(pain_points: Vec<&str>) -> RequirementRecord {
        RequirementRecord {
            role_title: "Backend Engineer".to_string(),
            company: "Initech".to_string(),
            role_category: RoleCategory::Engineering,
            seniority: SeniorityTier::Senior,
            competency_mix: CompetencyMix::uniform(),
            keywords: vec!["caching".to_string(), "latency".to_string()],
            pain_points: pain_points.into_iter().map(String::from).collect(),
            success_metrics: Vec::new(),
            required_skills: Vec::new(),
            nice_to_have_skills: Vec::new(),
            low_confidence: false,
        }
    }

    fn role(achievements: Vec<&str>) -> RoleRecord {
        RoleRecord {
            id: "role-1".to_string(),
            employer: "Acme".to_string(),
            title: "Engineer".to_string(),
            location: "Berlin".to_string(),
            date_range: "2020 - Present".to_string(),
            industry: None,
            achievements: achievements.into_iter().map(String::from).collect(),
            hard_skills: Vec::new(),
            soft_skills: Vec::new(),
            most_recent: true,
            source_order: 0,
            start_year: Some(2020),
            end_year: None,
            is_current: true,
        }
    }

    #[test]
    fn test_mapping_picks_best_pain_point() {
        let config = Config::default();
        let mapper = AchievementMapper::new(&config);
        let requirement = requirement(vec![
            "slow hiring pipeline",
            "system performance issues under load",
        ]);
        let roles = vec![role(vec![
            "Fixed chronic performance issues in the order system under heavy load",
        ])];

        let mapping = mapper.map(&roles, &requirement);

        assert_eq!(mapping.assignments.len(), 1);
        assert_eq!(mapping.assignments[0].pain_point_index, 1);
    }

    #[test]
    fn test_unrelated_achievement_stays_unmapped() {
        let config = Config::default();
        let mapper = AchievementMapper::new(&config);
        let requirement = requirement(vec!["regulatory compliance gaps"]);
        let roles = vec![role(vec!["Organized the quarterly team offsite agenda"])];

        let mapping = mapper.map(&roles, &requirement);

        assert!(mapping.assignments.is_empty());
        assert!(mapping.for_achievement("role-1", 0).is_none());
    }

    #[test]
    fn test_tie_breaks_to_earlier_pain_point() {
        let config = Config::default();
        let mapper = AchievementMapper::new(&config);
        // Both pain points overlap the achievement identically
        let requirement = requirement(vec!["database migration", "migration database"]);
        let roles = vec![role(vec!["Completed the database migration ahead of schedule"])];

        let mapping = mapper.map(&roles, &requirement);

        assert_eq!(mapping.assignments.len(), 1);
        assert_eq!(mapping.assignments[0].pain_point_index, 0);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let config = Config::default();
        let mapper = AchievementMapper::new(&config);
        let requirement = requirement(vec!["system performance issues", "slow deployments"]);
        let roles = vec![role(vec![
            "Reduced latency by 40% using caching",
            "Cut deployment time from hours to minutes with a new pipeline",
        ])];

        let first = mapper.map(&roles, &requirement);
        let second = mapper.map(&roles, &requirement);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hints_rendering() {
        let config = Config::default();
        let mapper = AchievementMapper::new(&config);
        let requirement = requirement(vec!["system performance issues"]);
        let roles = vec![role(vec![
            "Resolved system performance issues across three services",
        ])];

        let mapping = mapper.map(&roles, &requirement);
        let hints = mapping.hints_for_role("role-1");

        assert!(hints.contains("0 -> system performance issues"));
        assert_eq!(mapping.hints_for_role("role-2"), "none");
    }
}
