//! Cross-role stitching of per-role bullet batches into one document body
//!
//! Deterministic: section order follows role chronology regardless of which
//! generation task finished first, near-duplicates collapse to the strongest
//! instance, and the word budget is enforced by dropping whole low-relevance
//! bullets, never by truncating one.

use crate::config::Config;
use crate::input::splitter::RoleRecord;
use crate::llm::generator::GeneratedBullet;
use crate::llm::header::HeaderBlock;
use crate::processing::text_processor::TextProcessor;
use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

/// One role's section in the assembled body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSection {
    pub role_id: String,
    pub employer: String,
    pub title: String,
    pub location: String,
    pub date_range: String,
    pub bullets: Vec<GeneratedBullet>,
}

/// Ordered role sections under the total word budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBody {
    pub sections: Vec<RoleSection>,
    pub word_count: usize,
}

/// The full assembled document: header block plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledDocument {
    pub header: HeaderBlock,
    pub body: DocumentBody,
}

impl AssembledDocument {
    pub fn total_word_count(&self) -> usize {
        self.body.word_count
    }

    /// All bullets in document order, for grading and highlight selection.
    pub fn all_bullets(&self) -> Vec<&GeneratedBullet> {
        self.body
            .sections
            .iter()
            .flat_map(|s| s.bullets.iter())
            .collect()
    }
}

struct ScoredBullet {
    bullet: GeneratedBullet,
    role_index: usize,
    bullet_index: usize,
    relevance: f32,
}

pub struct Stitcher {
    word_budget: usize,
    duplicate_threshold: f32,
    text: TextProcessor,
}

impl Stitcher {
    pub fn new(config: &Config) -> Self {
        Self {
            word_budget: config.stitching.word_budget,
            duplicate_threshold: config.stitching.duplicate_similarity_threshold,
            text: TextProcessor::new(),
        }
    }

    /// Merge per-role batches into a document body. `batches` must be in the
    /// same order as `roles` (reverse-chronological); roles with no surviving
    /// bullets are omitted from the body.
    pub fn stitch(
        &self,
        roles: &[RoleRecord],
        batches: &[Vec<GeneratedBullet>],
        target_keywords: &[String],
    ) -> DocumentBody {
        let keyword_matcher = Self::keyword_matcher(target_keywords);

        let mut scored: Vec<ScoredBullet> = Vec::new();
        for (role_index, batch) in batches.iter().enumerate() {
            for (bullet_index, bullet) in batch.iter().enumerate() {
                scored.push(ScoredBullet {
                    relevance: self.relevance(bullet, &keyword_matcher, target_keywords),
                    bullet: bullet.clone(),
                    role_index,
                    bullet_index,
                });
            }
        }

        let deduped = self.collapse_duplicates(scored);
        let trimmed = self.enforce_budget(deduped);

        let mut sections = Vec::new();
        for (role_index, role) in roles.iter().enumerate() {
            let bullets: Vec<GeneratedBullet> = trimmed
                .iter()
                .filter(|s| s.role_index == role_index)
                .map(|s| s.bullet.clone())
                .collect();

            if bullets.is_empty() {
                continue;
            }

            sections.push(RoleSection {
                role_id: role.id.clone(),
                employer: role.employer.clone(),
                title: role.title.clone(),
                location: role.location.clone(),
                date_range: role.date_range.clone(),
                bullets,
            });
        }

        let word_count = sections
            .iter()
            .flat_map(|s| s.bullets.iter())
            .map(|b| b.word_count())
            .sum();

        DocumentBody {
            sections,
            word_count,
        }
    }

    fn keyword_matcher(keywords: &[String]) -> Option<AhoCorasick> {
        if keywords.is_empty() {
            return None;
        }
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(keywords)
            .ok()
    }

    /// Relevance is the fraction of distinct target keywords the bullet hits,
    /// with a small bonus when it addresses a mapped pain point.
    fn relevance(
        &self,
        bullet: &GeneratedBullet,
        matcher: &Option<AhoCorasick>,
        keywords: &[String],
    ) -> f32 {
        let keyword_score = match matcher {
            Some(ac) => {
                let mut hit: Vec<bool> = vec![false; keywords.len()];
                for m in ac.find_iter(&bullet.text) {
                    hit[m.pattern().as_usize()] = true;
                }
                hit.iter().filter(|h| **h).count() as f32 / keywords.len() as f32
            }
            None => 0.0,
        };

        let pain_bonus = if bullet.pain_point.is_some() { 0.1 } else { 0.0 };
        keyword_score + pain_bonus
    }

    /// Collapse near-identical bullets across roles, keeping the
    /// highest-relevance instance; ties keep the earlier bullet in
    /// role/bullet order.
    fn collapse_duplicates(&self, scored: Vec<ScoredBullet>) -> Vec<ScoredBullet> {
        let mut kept: Vec<ScoredBullet> = Vec::new();

        for candidate in scored {
            let duplicate_of = kept.iter().position(|existing| {
                self.similarity(&existing.bullet.text, &candidate.bullet.text)
                    >= self.duplicate_threshold
            });

            match duplicate_of {
                None => kept.push(candidate),
                Some(idx) => {
                    // Strictly greater: the earlier instance wins ties
                    if candidate.relevance > kept[idx].relevance {
                        kept[idx] = candidate;
                    }
                }
            }
        }

        kept.sort_by(|a, b| {
            a.role_index
                .cmp(&b.role_index)
                .then_with(|| a.bullet_index.cmp(&b.bullet_index))
        });
        kept
    }

    fn similarity(&self, a: &str, b: &str) -> f32 {
        let edit = jaro_winkler(&a.to_lowercase(), &b.to_lowercase()) as f32;
        let lexical = self.text.text_similarity(a, b);
        edit.max(lexical)
    }

    /// Drop lowest-relevance bullets until the body fits the word budget.
    /// Ties drop the later bullet in role/bullet order first.
    fn enforce_budget(&self, mut bullets: Vec<ScoredBullet>) -> Vec<ScoredBullet> {
        let mut total: usize = bullets.iter().map(|s| s.bullet.word_count()).sum();

        while total > self.word_budget && !bullets.is_empty() {
            let drop_idx = bullets
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| {
                    a.relevance
                        .partial_cmp(&b.relevance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| {
                            // Same relevance: prefer dropping the later bullet
                            (b.role_index, b.bullet_index, *ib)
                                .cmp(&(a.role_index, a.bullet_index, *ia))
                        })
                })
                .map(|(i, _)| i)
                .expect("bullets non-empty inside loop");

            let removed = bullets.remove(drop_idx);
            log::debug!(
                "Budget trim dropped bullet (relevance {:.2}): {}",
                removed.relevance,
                removed.bullet.text
            );
            total -= removed.bullet.word_count();
        }

        bullets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::generator::{BulletStructure, BulletTemplate};

    fn role(id: &str, employer: &str, order: usize) -> RoleRecord {
        RoleRecord {
            id: id.to_string(),
            employer: employer.to_string(),
            title: "Engineer".to_string(),
            location: "Berlin".to_string(),
            date_range: "2020 - 2022".to_string(),
            industry: None,
            achievements: Vec::new(),
            hard_skills: Vec::new(),
            soft_skills: Vec::new(),
            most_recent: order == 0,
            source_order: order,
            start_year: Some(2020),
            end_year: Some(2022),
            is_current: false,
        }
    }

    fn bullet(role_id: &str, text: &str, pain_point: Option<&str>) -> GeneratedBullet {
        GeneratedBullet {
            text: text.to_string(),
            source_text: text.to_string(),
            source_metric: None,
            keyword: None,
            pain_point: pain_point.map(String::from),
            structure: BulletStructure::default(),
            template: BulletTemplate::ResultForward,
            role_id: role_id.to_string(),
        }
    }

    #[test]
    fn test_sections_follow_role_order() {
        let config = Config::default();
        let stitcher = Stitcher::new(&config);
        let roles = vec![role("role-1", "Acme", 0), role("role-2", "Globex", 1)];
        let batches = vec![
            vec![bullet("role-1", "Delivered the flagship platform rewrite on schedule", None)],
            vec![bullet("role-2", "Stabilized the legacy billing system for enterprise accounts", None)],
        ];

        let body = stitcher.stitch(&roles, &batches, &[]);

        assert_eq!(body.sections.len(), 2);
        assert_eq!(body.sections[0].employer, "Acme");
        assert_eq!(body.sections[1].employer, "Globex");
    }

    #[test]
    fn test_empty_role_batch_omitted() {
        let config = Config::default();
        let stitcher = Stitcher::new(&config);
        let roles = vec![role("role-1", "Acme", 0), role("role-2", "Globex", 1)];
        let batches = vec![
            Vec::new(),
            vec![bullet("role-2", "Owned incident response rotation across four services", None)],
        ];

        let body = stitcher.stitch(&roles, &batches, &[]);

        assert_eq!(body.sections.len(), 1);
        assert_eq!(body.sections[0].employer, "Globex");
    }

    #[test]
    fn test_near_duplicates_collapse_to_strongest() {
        let config = Config::default();
        let stitcher = Stitcher::new(&config);
        let roles = vec![role("role-1", "Acme", 0), role("role-2", "Globex", 1)];
        let keywords = vec!["caching".to_string()];
        let batches = vec![
            vec![bullet("role-1", "Reduced api latency forty percent via caching layer rollout", None)],
            vec![bullet("role-2", "Reduced api latency forty percent via caching layer rollouts", None)],
        ];

        let body = stitcher.stitch(&roles, &batches, &keywords);

        let total: usize = body.sections.iter().map(|s| s.bullets.len()).sum();
        assert_eq!(total, 1);
        // Equal relevance: earlier role/bullet order wins
        assert_eq!(body.sections[0].role_id, "role-1");
    }

    #[test]
    fn test_budget_trims_lowest_relevance_whole_bullets() {
        let mut config = Config::default();
        config.stitching.word_budget = 10;
        let stitcher = Stitcher::new(&config);
        let roles = vec![role("role-1", "Acme", 0)];
        let keywords = vec!["kubernetes".to_string()];
        let relevant = "Migrated every workload onto kubernetes ahead of the deadline";
        let filler = "Organized the engineering offsite and the quarterly hack week";
        let batches = vec![vec![
            bullet("role-1", relevant, None),
            bullet("role-1", filler, None),
        ]];

        let body = stitcher.stitch(&roles, &batches, &keywords);

        assert!(body.word_count <= 10);
        assert_eq!(body.sections[0].bullets.len(), 1);
        // The keyword-bearing bullet survives intact, never truncated
        assert_eq!(body.sections[0].bullets[0].text, relevant);
    }

    #[test]
    fn test_stitching_is_deterministic() {
        let config = Config::default();
        let stitcher = Stitcher::new(&config);
        let roles = vec![role("role-1", "Acme", 0), role("role-2", "Globex", 1)];
        let batches = vec![
            vec![bullet("role-1", "Scaled ingestion pipeline to handle peak traffic bursts", Some("scaling"))],
            vec![bullet("role-2", "Rebuilt deployment tooling cutting release friction dramatically", None)],
        ];

        let first = stitcher.stitch(&roles, &batches, &["pipeline".to_string()]);
        let second = stitcher.stitch(&roles, &batches, &["pipeline".to_string()]);
        assert_eq!(first, second);
    }
}
