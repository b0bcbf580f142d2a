//! Output rendering: markdown artifact, JSON export and console summary
//!
//! The markdown artifact is the pipeline's output contract; binary document
//! export (PDF and friends) is a downstream concern that consumes it as a
//! black box. A below-threshold result is always labeled with its grade and
//! weaknesses, never presented as equivalent to a passing document.

use crate::config::{Config, OutputFormat};
use crate::error::{CvTailorError, Result};
use crate::llm::header::HeaderBlock;
use crate::processing::engine::GenerationOutcome;
use crate::processing::stitcher::{AssembledDocument, RoleSection};
use askama::Template;
use colored::Colorize;

#[derive(Template)]
#[template(path = "cv.md")]
struct CvTemplate<'a> {
    header: &'a HeaderBlock,
    sections: &'a [RoleSection],
}

/// Render the document body and header to markdown. Also used as the grading
/// input so the grader sees exactly what the caller receives.
pub fn render_markdown(document: &AssembledDocument) -> Result<String> {
    let template = CvTemplate {
        header: &document.header,
        sections: &document.body.sections,
    };

    template
        .render()
        .map_err(|e| CvTailorError::OutputFormatting(e.to_string()))
}

pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(config: &Config) -> Self {
        Self {
            color: config.output.color_output,
        }
    }

    pub fn render(&self, outcome: &GenerationOutcome, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Markdown => self.markdown_with_label(outcome),
            OutputFormat::Json => serde_json::to_string_pretty(outcome).map_err(Into::into),
            OutputFormat::Console => Ok(self.console_summary(outcome)),
        }
    }

    /// Markdown artifact, prefixed with a grade banner when the draft never
    /// cleared the passing threshold.
    fn markdown_with_label(&self, outcome: &GenerationOutcome) -> Result<String> {
        let body = render_markdown(&outcome.document)?;

        if outcome.grade.passed {
            return Ok(body);
        }

        let mut banner = format!(
            "> **Grade {:.2} — below the passing threshold after {} improvement iteration(s).**\n",
            outcome.grade.composite, outcome.iterations_used
        );
        for directive in &outcome.grade.directives {
            banner.push_str(&format!(
                "> - {} ({}): {}\n",
                directive.dimension, directive.section, directive.instruction
            ));
        }
        banner.push('\n');

        Ok(format!("{}{}", banner, body))
    }

    fn console_summary(&self, outcome: &GenerationOutcome) -> String {
        let mut out = String::new();

        let verdict = if outcome.grade.passed {
            self.paint("PASSED", |s| s.green().bold().to_string())
        } else {
            self.paint("BELOW THRESHOLD", |s| s.red().bold().to_string())
        };

        out.push_str(&format!(
            "Tailored CV for {} — {}\n",
            outcome.document.header.title_line, verdict
        ));
        out.push_str(&format!(
            "Composite grade: {:.2} ({} draft(s), {} improvement iteration(s), model {})\n",
            outcome.grade.composite,
            outcome.drafts_produced,
            outcome.iterations_used,
            outcome.model_name
        ));

        let scores = &outcome.grade.scores;
        out.push_str(&format!(
            "  ats {:.2} | impact {:.2} | alignment {:.2} | seniority {:.2} | anti-hallucination {:.2}\n",
            scores.ats, scores.impact, scores.alignment, scores.seniority, scores.anti_hallucination
        ));
        out.push_str(&format!(
            "Body: {} words across {} role section(s)\n",
            outcome.document.body.word_count,
            outcome.document.body.sections.len()
        ));

        if outcome.low_confidence_requirement {
            out.push_str(&self.paint(
                "Requirement record came from the lexical fallback (low confidence)\n",
                |s| s.yellow().to_string(),
            ));
        }
        if !outcome.degraded_roles.is_empty() {
            out.push_str(&self.paint(
                &format!(
                    "Degraded role(s) using raw achievements: {}\n",
                    outcome.degraded_roles.join(", ")
                ),
                |s| s.yellow().to_string(),
            ));
        }
        if !outcome.grade.passed {
            for directive in &outcome.grade.directives {
                out.push_str(&format!(
                    "  weakness [{}] {}: {}\n",
                    directive.dimension, directive.section, directive.instruction
                ));
            }
        }

        out
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> String) -> String {
        if self.color {
            style(text)
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::generator::{BulletStructure, BulletTemplate, GeneratedBullet};
    use crate::llm::header::SkillGroup;
    use crate::processing::stitcher::DocumentBody;

    fn document() -> AssembledDocument {
        AssembledDocument {
            header: HeaderBlock {
                name: "Jane Candidate".to_string(),
                contact: vec!["jane@example.com".to_string(), "Berlin".to_string()],
                title_line: "Staff Backend Engineer".to_string(),
                tagline: "Backend engineer scaling distributed systems.".to_string(),
                highlights: vec!["Cut latency 40% with caching".to_string()],
                skill_groups: vec![SkillGroup {
                    name: "Languages & Frameworks".to_string(),
                    skills: vec!["Rust".to_string(), "SQL".to_string()],
                }],
                languages: vec!["English".to_string()],
                certifications: Vec::new(),
                education: vec!["MSc Computer Science".to_string()],
            },
            body: DocumentBody {
                sections: vec![RoleSection {
                    role_id: "role-1".to_string(),
                    employer: "Acme Corp".to_string(),
                    title: "Senior Backend Engineer".to_string(),
                    location: "Berlin".to_string(),
                    date_range: "2021 - Present".to_string(),
                    bullets: vec![GeneratedBullet {
                        text: "Cut latency 40% with caching".to_string(),
                        source_text: "Reduced latency by 40% using caching".to_string(),
                        source_metric: Some("40%".to_string()),
                        keyword: Some("caching".to_string()),
                        pain_point: None,
                        structure: BulletStructure::default(),
                        template: BulletTemplate::TechnologyForward,
                        role_id: "role-1".to_string(),
                    }],
                }],
                word_count: 5,
            },
        }
    }

    #[test]
    fn test_markdown_rendering() {
        let markdown = render_markdown(&document()).unwrap();

        assert!(markdown.contains("# Jane Candidate"));
        assert!(markdown.contains("jane@example.com | Berlin"));
        assert!(markdown.contains("### Acme Corp — Senior Backend Engineer"));
        assert!(markdown.contains("- Cut latency 40% with caching"));
        assert!(markdown.contains("**Languages & Frameworks**: Rust, SQL"));
        assert!(markdown.contains("## Education"));
        // No empty certifications section
        assert!(!markdown.contains("## Certifications"));
    }
}
