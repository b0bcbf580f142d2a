//! Fact-grounding verification
//!
//! A deterministic rule engine, no model calls. Every numeric-like token in a
//! generated bullet must trace to a tolerance-equivalent token somewhere in
//! the parent role's achievement text; leadership claims need synonym-level
//! support. Flagged bullets never reach the final document.

use crate::config::Config;
use crate::input::splitter::RoleRecord;
use crate::llm::generator::GeneratedBullet;
use crate::processing::lexicon;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimSeverity {
    /// Fabricated or altered figure
    Critical,
    /// Unsupported qualitative claim
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedClaim {
    pub claim: String,
    pub severity: ClaimSeverity,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletVerdict {
    pub bullet_index: usize,
    pub passed: bool,
    pub flags: Vec<FlaggedClaim>,
}

/// QA outcome for one role's bullet batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub verdicts: Vec<BulletVerdict>,
    /// Fraction of bullets carrying at least one flag
    pub flagged_ratio: f32,
    /// Aggregate confidence in the batch, 1.0 when nothing was flagged
    pub confidence: f32,
    /// Fraction of target keywords present somewhere in the batch
    pub keyword_coverage: f32,
    /// True when the flagged ratio exceeded the configured threshold and the
    /// whole batch should be regenerated with corrective feedback
    pub batch_failed: bool,
}

impl QaReport {
    /// Bullets that survived verification, in original order.
    pub fn surviving<'a>(&self, bullets: &'a [GeneratedBullet]) -> Vec<&'a GeneratedBullet> {
        self.verdicts
            .iter()
            .filter(|v| v.passed)
            .filter_map(|v| bullets.get(v.bullet_index))
            .collect()
    }

    /// Corrective feedback describing every flag, for regeneration prompts.
    pub fn feedback(&self) -> String {
        let mut lines = Vec::new();
        for verdict in &self.verdicts {
            for flag in &verdict.flags {
                lines.push(format!(
                    "bullet {}: {} ({})",
                    verdict.bullet_index, flag.reason, flag.claim
                ));
            }
        }
        lines.join("\n")
    }

    pub fn flag_count(&self) -> usize {
        self.verdicts.iter().map(|v| v.flags.len()).sum()
    }
}

/// A numeric-like token with its normalized magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericToken {
    pub raw: String,
    pub value: f64,
    pub kind: NumericKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericKind {
    Percentage,
    Multiplier,
    Currency,
    Duration,
    Count,
}

pub struct GroundingVerifier {
    tolerance: f32,
    flagged_ratio_threshold: f32,
    percent_regex: Regex,
    multiplier_regex: Regex,
    currency_regex: Regex,
    duration_regex: Regex,
    count_regex: Regex,
    team_claim_regex: Regex,
}

impl GroundingVerifier {
    pub fn new(config: &Config) -> Self {
        Self {
            tolerance: config.qa.numeric_tolerance,
            flagged_ratio_threshold: config.qa.flagged_ratio_threshold,
            percent_regex: Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("Invalid percent regex"),
            multiplier_regex: Regex::new(r"\b(\d+(?:\.\d+)?)x\b").expect("Invalid multiplier regex"),
            currency_regex: Regex::new(r"[$€£]\s*(\d+(?:[.,]\d+)?)\s*([kKmMbB])?")
                .expect("Invalid currency regex"),
            duration_regex: Regex::new(
                r"(?i)\b(\d+(?:\.\d+)?)\s*(ms|milliseconds?|seconds?|secs?|minutes?|mins?|hours?|hrs?|days?|weeks?|months?|years?)\b",
            )
            .expect("Invalid duration regex"),
            count_regex: Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d+))?\s*([KMB])?\b")
                .expect("Invalid count regex"),
            team_claim_regex: Regex::new(
                r"(?i)\b(led|lead|managed|manage|supervised|mentored|mentor|coached|directed|headed|guided|oversaw|grew|hired|built)\b[^.]{0,40}?\b(team|teams|engineers?|developers?|reports?|people|staff|headcount)\b",
            )
            .expect("Invalid team claim regex"),
        }
    }

    /// Verify one role's bullet batch against its role record.
    pub fn verify_role(
        &self,
        bullets: &[GeneratedBullet],
        role: &RoleRecord,
        target_keywords: &[String],
    ) -> QaReport {
        let source_text = role.achievements_text();
        let source_tokens = self.numeric_tokens(&source_text);

        let mut verdicts = Vec::new();
        for (index, bullet) in bullets.iter().enumerate() {
            let mut flags = Vec::new();

            for token in self.numeric_tokens(&bullet.text) {
                if !self.has_tolerant_match(&token, &source_tokens) {
                    flags.push(FlaggedClaim {
                        claim: token.raw.clone(),
                        severity: ClaimSeverity::Critical,
                        reason: format!(
                            "figure '{}' has no tolerance-equivalent value in the source role",
                            token.raw
                        ),
                    });
                }
            }

            if let Some(claim) = self.unsupported_leadership_claim(&bullet.text, &source_text, role)
            {
                flags.push(claim);
            }

            verdicts.push(BulletVerdict {
                bullet_index: index,
                passed: flags.is_empty(),
                flags,
            });
        }

        let flagged = verdicts.iter().filter(|v| !v.passed).count();
        let flagged_ratio = if verdicts.is_empty() {
            0.0
        } else {
            flagged as f32 / verdicts.len() as f32
        };

        let critical: usize = verdicts
            .iter()
            .flat_map(|v| &v.flags)
            .filter(|f| f.severity == ClaimSeverity::Critical)
            .count();
        let warnings: usize = verdicts
            .iter()
            .flat_map(|v| &v.flags)
            .filter(|f| f.severity == ClaimSeverity::Warning)
            .count();
        let confidence = if verdicts.is_empty() {
            1.0
        } else {
            (1.0 - (critical as f32 + 0.5 * warnings as f32) / verdicts.len() as f32).max(0.0)
        };

        QaReport {
            flagged_ratio,
            confidence,
            keyword_coverage: self.keyword_coverage(bullets, target_keywords),
            batch_failed: flagged_ratio > self.flagged_ratio_threshold,
            verdicts,
        }
    }

    /// Extract every numeric-like token. Overlapping interpretations are
    /// resolved in priority order: percentage, multiplier, currency,
    /// duration, then bare counts not already claimed.
    pub fn numeric_tokens(&self, text: &str) -> Vec<NumericToken> {
        let mut tokens = Vec::new();
        let mut claimed: Vec<(usize, usize)> = Vec::new();

        for caps in self.percent_regex.captures_iter(text) {
            let m = caps.get(0).expect("group 0 always present");
            claimed.push((m.start(), m.end()));
            if let Ok(value) = caps[1].parse::<f64>() {
                tokens.push(NumericToken {
                    raw: m.as_str().trim().to_string(),
                    value,
                    kind: NumericKind::Percentage,
                });
            }
        }

        for caps in self.multiplier_regex.captures_iter(text) {
            let m = caps.get(0).expect("group 0 always present");
            if overlaps(&claimed, m.start(), m.end()) {
                continue;
            }
            claimed.push((m.start(), m.end()));
            if let Ok(value) = caps[1].parse::<f64>() {
                tokens.push(NumericToken {
                    raw: m.as_str().to_string(),
                    value,
                    kind: NumericKind::Multiplier,
                });
            }
        }

        for caps in self.currency_regex.captures_iter(text) {
            let m = caps.get(0).expect("group 0 always present");
            if overlaps(&claimed, m.start(), m.end()) {
                continue;
            }
            claimed.push((m.start(), m.end()));
            let base: f64 = caps[1].replace(',', "").parse().unwrap_or(0.0);
            let value = base * suffix_factor(caps.get(2).map(|s| s.as_str()));
            tokens.push(NumericToken {
                raw: m.as_str().trim().to_string(),
                value,
                kind: NumericKind::Currency,
            });
        }

        for caps in self.duration_regex.captures_iter(text) {
            let m = caps.get(0).expect("group 0 always present");
            if overlaps(&claimed, m.start(), m.end()) {
                continue;
            }
            claimed.push((m.start(), m.end()));
            if let Ok(base) = caps[1].parse::<f64>() {
                // Normalize to seconds so "90 seconds" can match "1.5 minutes"
                let value = base * duration_factor(&caps[2]);
                tokens.push(NumericToken {
                    raw: m.as_str().to_string(),
                    value,
                    kind: NumericKind::Duration,
                });
            }
        }

        for caps in self.count_regex.captures_iter(text) {
            let m = caps.get(0).expect("group 0 always present");
            if overlaps(&claimed, m.start(), m.end()) {
                continue;
            }
            let whole = caps[1].replace(',', "");
            let fraction = caps.get(2).map(|f| f.as_str()).unwrap_or("0");
            let base: f64 = format!("{}.{}", whole, fraction).parse().unwrap_or(0.0);
            let value = base * suffix_factor(caps.get(3).map(|s| s.as_str()));
            tokens.push(NumericToken {
                raw: m.as_str().trim().to_string(),
                value,
                kind: NumericKind::Count,
            });
        }

        tokens
    }

    /// Tolerance-equivalent match: same-kind tokens compare by relative
    /// difference; counts additionally accept same-magnitude tokens of other
    /// kinds, allowing "processed 2M payments" against "$2M volume".
    fn has_tolerant_match(&self, token: &NumericToken, source: &[NumericToken]) -> bool {
        let same_kind: Vec<&NumericToken> =
            source.iter().filter(|s| s.kind == token.kind).collect();

        let candidates: Vec<&NumericToken> = if same_kind.is_empty() {
            source.iter().collect()
        } else {
            same_kind
        };

        candidates.iter().any(|s| self.within_tolerance(token.value, s.value))
    }

    fn within_tolerance(&self, claimed: f64, actual: f64) -> bool {
        if actual == 0.0 {
            return claimed == 0.0;
        }
        ((claimed - actual) / actual).abs() <= self.tolerance as f64
    }

    /// A people-management claim in the bullet needs a synonym-tolerant
    /// leadership signal in the source role (achievement text or declared
    /// soft skills).
    fn unsupported_leadership_claim(
        &self,
        bullet_text: &str,
        source_text: &str,
        role: &RoleRecord,
    ) -> Option<FlaggedClaim> {
        let claim = self.team_claim_regex.find(bullet_text)?;

        let source_lower = source_text.to_lowercase();
        let supported = lexicon::leadership_verbs()
            .iter()
            .any(|verb| source_lower.contains(verb))
            || role
                .soft_skills
                .iter()
                .any(|s| {
                    let s = s.to_lowercase();
                    s.contains("leader") || s.contains("mentor") || s.contains("management")
                });

        if supported {
            None
        } else {
            Some(FlaggedClaim {
                claim: claim.as_str().to_string(),
                severity: ClaimSeverity::Warning,
                reason: "leadership claim has no supporting signal in the source role".to_string(),
            })
        }
    }

    /// Fraction of target keywords present across a bullet set.
    pub fn keyword_coverage(&self, bullets: &[GeneratedBullet], keywords: &[String]) -> f32 {
        if keywords.is_empty() {
            return 1.0;
        }

        let combined = bullets
            .iter()
            .map(|b| b.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let present = keywords
            .iter()
            .filter(|k| combined.contains(k.to_lowercase().as_str()))
            .count();

        present as f32 / keywords.len() as f32
    }
}

fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && end > s)
}

fn suffix_factor(suffix: Option<&str>) -> f64 {
    match suffix.map(|s| s.to_ascii_uppercase()) {
        Some(ref s) if s == "K" => 1e3,
        Some(ref s) if s == "M" => 1e6,
        Some(ref s) if s == "B" => 1e9,
        _ => 1.0,
    }
}

fn duration_factor(unit: &str) -> f64 {
    match unit.to_lowercase().as_str() {
        "ms" | "millisecond" | "milliseconds" => 0.001,
        "second" | "seconds" | "sec" | "secs" => 1.0,
        "minute" | "minutes" | "min" | "mins" => 60.0,
        "hour" | "hours" | "hr" | "hrs" => 3_600.0,
        "day" | "days" => 86_400.0,
        "week" | "weeks" => 604_800.0,
        "month" | "months" => 2_592_000.0,
        "year" | "years" => 31_536_000.0,
        _ => 1.0,
    }
}
