//! Splits the master professional-history document into role records
//!
//! The master document follows a consistent heading grammar:
//! `Employer — Title — Location — Period` headings, bullet achievement lines,
//! and a trailing `Skills:` line per role. Achievement text is preserved
//! verbatim; downstream grounding checks match substrings against it.

use crate::error::{CvTailorError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One employer/period section of the candidate's source document.
/// Read-only ground truth for all downstream grounding checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: String,
    pub employer: String,
    pub title: String,
    pub location: String,
    pub date_range: String,
    pub industry: Option<String>,
    /// Verbatim achievement lines, never rewritten in place
    pub achievements: Vec<String>,
    pub hard_skills: Vec<String>,
    pub soft_skills: Vec<String>,
    pub most_recent: bool,
    /// Position in the source document, used as the deterministic tie-break
    pub source_order: usize,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub is_current: bool,
}

impl RoleRecord {
    /// All achievement text joined for whole-role lexical checks.
    pub fn achievements_text(&self) -> String {
        self.achievements.join("\n")
    }
}

/// Identity and document-level sections surrounding the role sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateIdentity {
    pub name: Option<String>,
    pub contact: Vec<String>,
    pub education: Vec<String>,
    pub certifications: Vec<String>,
    pub languages: Vec<String>,
}

/// Split master document: identity block plus roles in reverse-chronological
/// order (most recent first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterDocument {
    pub identity: CandidateIdentity,
    pub roles: Vec<RoleRecord>,
    /// Content hash of the source text, for caching split results
    pub content_hash: String,
}

pub struct DocumentSplitter {
    heading_regex: Regex,
    bullet_regex: Regex,
    year_regex: Regex,
}

impl Default for DocumentSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSplitter {
    pub fn new() -> Self {
        // Employer — Title — Location — Period, with em-dash, en-dash or " - "
        let heading_regex = Regex::new(
            r"^#*\s*(?P<employer>[^—–|]+?)\s*(?:—|–|\s-\s)\s*(?P<title>[^—–|]+?)\s*(?:—|–|\s-\s)\s*(?P<location>[^—–|]+?)\s*(?:—|–|\s-\s)\s*(?P<period>[^—–|]+?)\s*$",
        )
        .expect("Invalid heading regex");

        let bullet_regex = Regex::new(r"^\s*[-•*]\s+(?P<text>.+?)\s*$").expect("Invalid bullet regex");

        let year_regex = Regex::new(r"\b(19|20)\d{2}\b").expect("Invalid year regex");

        Self {
            heading_regex,
            bullet_regex,
            year_regex,
        }
    }

    /// Split a master document into role records.
    ///
    /// A document with no recognizable role boundaries degrades to a single
    /// role holding heuristically split achievement lines. Role sections with
    /// zero achievements are still emitted.
    pub fn split(&self, content: &str) -> Result<MasterDocument> {
        if content.trim().is_empty() {
            return Err(CvTailorError::MasterDocument(
                "Master document is empty".to_string(),
            ));
        }

        let content_hash = Self::content_hash(content);
        let mut identity = CandidateIdentity::default();
        let mut roles: Vec<RoleRecord> = Vec::new();
        let mut current: Option<RoleRecord> = None;
        let mut seen_heading = false;

        for line in content.lines() {
            let trimmed = line.trim();
            // Bullet lines may contain " - " clauses; never read them as headings
            let heading = if self.bullet_regex.is_match(trimmed) {
                None
            } else {
                self.heading_regex.captures(trimmed)
            };

            if let Some(caps) = heading {
                if let Some(done) = current.take() {
                    roles.push(done);
                }
                seen_heading = true;

                let period = caps["period"].trim().to_string();
                let (start_year, end_year, is_current) = self.parse_period(&period);

                current = Some(RoleRecord {
                    id: format!("role-{}", roles.len() + 1),
                    employer: caps["employer"].trim().to_string(),
                    title: caps["title"].trim().to_string(),
                    location: caps["location"].trim().to_string(),
                    date_range: period,
                    industry: None,
                    achievements: Vec::new(),
                    hard_skills: Vec::new(),
                    soft_skills: Vec::new(),
                    most_recent: false,
                    source_order: roles.len(),
                    start_year,
                    end_year,
                    is_current,
                });
                continue;
            }

            match current.as_mut() {
                Some(role) => self.consume_role_line(role, trimmed),
                None => self.consume_preamble_line(&mut identity, trimmed),
            }
        }

        if let Some(done) = current.take() {
            roles.push(done);
        }

        if !seen_heading {
            log::warn!("No role boundaries found; treating whole document as one role");
            roles.push(self.whole_document_role(content));
        }

        Self::order_and_tag(&mut roles);

        Ok(MasterDocument {
            identity,
            roles,
            content_hash,
        })
    }

    fn consume_role_line(&self, role: &mut RoleRecord, line: &str) {
        if line.is_empty() {
            return;
        }

        if let Some(caps) = self.bullet_regex.captures(line) {
            role.achievements.push(caps["text"].to_string());
        } else if let Some(rest) = strip_label(line, "soft skills:") {
            role.soft_skills = split_csv(rest);
        } else if let Some(rest) = strip_label(line, "skills:") {
            role.hard_skills = split_csv(rest);
        } else if let Some(rest) = strip_label(line, "industry:") {
            role.industry = Some(rest.trim().to_string());
        }
        // Anything else inside a role section is narrative filler and ignored
    }

    fn consume_preamble_line(&self, identity: &mut CandidateIdentity, line: &str) {
        if line.is_empty() {
            return;
        }

        if let Some(rest) = strip_label(line, "education:") {
            identity.education = split_csv(rest);
        } else if let Some(rest) = strip_label(line, "certifications:") {
            identity.certifications = split_csv(rest);
        } else if let Some(rest) = strip_label(line, "languages:") {
            identity.languages = split_csv(rest);
        } else if identity.name.is_none() && !line.contains('@') && line.len() < 80 {
            identity.name = Some(line.trim_start_matches('#').trim().to_string());
        } else {
            identity.contact.push(line.to_string());
        }
    }

    /// Fallback for a document with no recognizable headings: every line that
    /// reads like a statement becomes an achievement of one synthetic role.
    fn whole_document_role(&self, content: &str) -> RoleRecord {
        let achievements: Vec<String> = content
            .lines()
            .map(|l| {
                self.bullet_regex
                    .captures(l.trim())
                    .map(|c| c["text"].to_string())
                    .unwrap_or_else(|| l.trim().to_string())
            })
            .filter(|l| l.split_whitespace().count() >= 4)
            .collect();

        RoleRecord {
            id: "role-1".to_string(),
            employer: "Unknown".to_string(),
            title: "Professional Experience".to_string(),
            location: String::new(),
            date_range: String::new(),
            industry: None,
            achievements,
            hard_skills: Vec::new(),
            soft_skills: Vec::new(),
            most_recent: true,
            source_order: 0,
            start_year: None,
            end_year: None,
            is_current: true,
        }
    }

    fn parse_period(&self, period: &str) -> (Option<i32>, Option<i32>, bool) {
        let lowered = period.to_lowercase();
        let is_current = lowered.contains("present") || lowered.contains("current");

        let years: Vec<i32> = self
            .year_regex
            .find_iter(period)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();

        let start_year = years.first().copied();
        let end_year = if is_current { None } else { years.last().copied() };

        (start_year, end_year, is_current)
    }

    /// Sort roles reverse-chronologically and tag exactly one as most recent.
    /// An explicit current marker wins; otherwise the highest start year;
    /// ties broken by source order.
    fn order_and_tag(roles: &mut [RoleRecord]) {
        roles.sort_by(|a, b| {
            b.is_current
                .cmp(&a.is_current)
                .then_with(|| b.start_year.unwrap_or(i32::MIN).cmp(&a.start_year.unwrap_or(i32::MIN)))
                .then_with(|| a.source_order.cmp(&b.source_order))
        });

        for (idx, role) in roles.iter_mut().enumerate() {
            role.most_recent = idx == 0;
        }
    }

    fn content_hash(content: &str) -> String {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let lowered = line.to_lowercase();
    if lowered.starts_with(label) {
        Some(&line[label.len()..])
    } else {
        None
    }
}

fn split_csv(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Jane Candidate
jane@example.com | Berlin
Education: MSc Computer Science, TU Berlin
Languages: English, German

Acme Corp — Senior Backend Engineer — Berlin — 2021 - Present
- Reduced latency by 40% using caching
- Led a team of 5 engineers through a platform migration
Skills: Rust, Kubernetes, PostgreSQL
Soft skills: mentoring, stakeholder management

Globex — Backend Engineer — Munich — 2018 - 2021
- Built a payments reconciliation service handling 2M transactions per day
Skills: Python, Kafka
";

    #[test]
    fn test_split_two_roles() {
        let splitter = DocumentSplitter::new();
        let doc = splitter.split(SAMPLE).unwrap();

        assert_eq!(doc.roles.len(), 2);
        assert_eq!(doc.roles[0].employer, "Acme Corp");
        assert_eq!(doc.roles[0].title, "Senior Backend Engineer");
        assert_eq!(doc.roles[1].employer, "Globex");
        assert_eq!(doc.identity.name.as_deref(), Some("Jane Candidate"));
        assert_eq!(
            doc.identity.education,
            vec!["MSc Computer Science", "TU Berlin"]
        );
        assert_eq!(doc.identity.languages, vec!["English", "German"]);
    }

    #[test]
    fn test_achievements_preserved_verbatim() {
        let splitter = DocumentSplitter::new();
        let doc = splitter.split(SAMPLE).unwrap();

        assert_eq!(
            doc.roles[0].achievements[0],
            "Reduced latency by 40% using caching"
        );
        assert_eq!(doc.roles[0].hard_skills, vec!["Rust", "Kubernetes", "PostgreSQL"]);
        assert_eq!(
            doc.roles[0].soft_skills,
            vec!["mentoring", "stakeholder management"]
        );
    }

    #[test]
    fn test_exactly_one_most_recent() {
        let splitter = DocumentSplitter::new();
        let doc = splitter.split(SAMPLE).unwrap();

        let recent: Vec<&RoleRecord> = doc.roles.iter().filter(|r| r.most_recent).collect();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].employer, "Acme Corp");
        assert!(recent[0].is_current);
    }

    #[test]
    fn test_splitting_is_idempotent() {
        let splitter = DocumentSplitter::new();
        let first = splitter.split(SAMPLE).unwrap();
        let second = splitter.split(SAMPLE).unwrap();

        assert_eq!(first, second);
        for (a, b) in first.roles.iter().zip(second.roles.iter()) {
            assert_eq!(a.achievements, b.achievements);
        }
    }

    #[test]
    fn test_zero_achievement_role_still_emitted() {
        let text = "\
Acme Corp — Engineer — Berlin — 2020 - 2021
Skills: Rust

Globex — Engineer — Munich — 2018 - 2020
- Shipped a reporting pipeline processing 10 TB daily
";
        let splitter = DocumentSplitter::new();
        let doc = splitter.split(text).unwrap();

        assert_eq!(doc.roles.len(), 2);
        let empty = doc.roles.iter().find(|r| r.employer == "Acme Corp").unwrap();
        assert!(empty.achievements.is_empty());
        assert_eq!(empty.hard_skills, vec!["Rust"]);
    }

    #[test]
    fn test_unstructured_document_becomes_single_role() {
        let text = "Spent six years building trading systems.\nImproved throughput by 3x on the core matching engine.";
        let splitter = DocumentSplitter::new();
        let doc = splitter.split(text).unwrap();

        assert_eq!(doc.roles.len(), 1);
        assert!(doc.roles[0].most_recent);
        assert_eq!(doc.roles[0].achievements.len(), 2);
    }

    #[test]
    fn test_reverse_chronological_order_without_current_marker() {
        let text = "\
Old Co — Engineer — Remote — 2010 - 2014
- Maintained a legacy billing system for enterprise customers

New Co — Engineer — Remote — 2016 - 2019
- Designed a service mesh rollout across 40 microservices
";
        let splitter = DocumentSplitter::new();
        let doc = splitter.split(text).unwrap();

        assert_eq!(doc.roles[0].employer, "New Co");
        assert!(doc.roles[0].most_recent);
        assert_eq!(doc.roles[1].employer, "Old Co");
    }

    #[test]
    fn test_empty_document_rejected() {
        let splitter = DocumentSplitter::new();
        assert!(splitter.split("   \n  ").is_err());
    }
}
