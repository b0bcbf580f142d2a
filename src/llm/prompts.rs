//! Prompt templates for the generation stages
//!
//! Every template demands strict JSON so stage boundaries can parse into
//! typed records and reject malformed output early.

#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub requirement_extraction: String,
    pub role_bullets: String,
    pub header_synthesis: String,
    pub document_grade: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            requirement_extraction: REQUIREMENT_EXTRACTION_TEMPLATE.to_string(),
            role_bullets: ROLE_BULLETS_TEMPLATE.to_string(),
            header_synthesis: HEADER_SYNTHESIS_TEMPLATE.to_string(),
            document_grade: DOCUMENT_GRADE_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn render_requirement_extraction(&self, posting: &str, keyword_count: usize) -> String {
        self.requirement_extraction
            .replace("{posting}", posting)
            .replace("{keyword_count}", &keyword_count.to_string())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render_role_bullets(
        &self,
        role_heading: &str,
        achievements: &str,
        template_assignments: &str,
        requirement_summary: &str,
        mapping_hints: &str,
        target_count: usize,
        min_words: usize,
        max_words: usize,
        feedback: Option<&str>,
    ) -> String {
        let feedback_block = match feedback {
            Some(text) => format!("\nPREVIOUS ATTEMPT WAS REJECTED. Corrections required:\n{}\n", text),
            None => String::new(),
        };

        self.role_bullets
            .replace("{role_heading}", role_heading)
            .replace("{achievements}", achievements)
            .replace("{template_assignments}", template_assignments)
            .replace("{requirement_summary}", requirement_summary)
            .replace("{mapping_hints}", mapping_hints)
            .replace("{target_count}", &target_count.to_string())
            .replace("{min_words}", &min_words.to_string())
            .replace("{max_words}", &max_words.to_string())
            .replace("{feedback}", &feedback_block)
    }

    pub fn render_header_synthesis(
        &self,
        requirement_summary: &str,
        career_summary: &str,
        strongest_bullets: &str,
        company_signals: &str,
        feedback: Option<&str>,
    ) -> String {
        let feedback_block = match feedback {
            Some(text) => format!("\nPREVIOUS ATTEMPT WAS REJECTED. Corrections required:\n{}\n", text),
            None => String::new(),
        };

        self.header_synthesis
            .replace("{requirement_summary}", requirement_summary)
            .replace("{career_summary}", career_summary)
            .replace("{strongest_bullets}", strongest_bullets)
            .replace("{company_signals}", company_signals)
            .replace("{feedback}", &feedback_block)
    }

    pub fn render_document_grade(&self, document: &str, requirement_summary: &str) -> String {
        self.document_grade
            .replace("{document}", document)
            .replace("{requirement_summary}", requirement_summary)
    }
}

pub const SYSTEM_PROMPT: &str = "You are an expert CV writer and recruiter. \
You only ever answer with the exact JSON requested, no prose, no code fences.";

const REQUIREMENT_EXTRACTION_TEMPLATE: &str = r#"TASK: Extract a structured requirement record from the job posting below.

<JOB POSTING>
{posting}
</JOB POSTING>

Respond ONLY with JSON in this exact shape:
{
  "role_title": "...",
  "company": "...",
  "role_category": "engineering|data|infrastructure|management|product|security",
  "seniority": "senior|staff|principal|director|vp|executive",
  "competency_mix": {"delivery": 25, "architecture": 25, "leadership": 25, "process": 25},
  "keywords": ["exactly {keyword_count} lowercase keywords, most important first"],
  "pain_points": ["implied problems the hire must solve"],
  "success_metrics": ["how success in the role is measured"],
  "required_skills": ["..."],
  "nice_to_have_skills": ["..."]
}

The four competency_mix integers must sum to 100."#;

const ROLE_BULLETS_TEMPLATE: &str = r#"TASK: Rewrite achievements for one CV role section.

ROLE: {role_heading}

SOURCE ACHIEVEMENTS (numbered, verbatim ground truth):
{achievements}

TEMPLATE PER ACHIEVEMENT:
{template_assignments}
- technology-forward = action, named technology, quantified result, business impact, closing context tying to a pain point
- result-forward = action, quantified result, business impact, closing context (no forced technology mention)

TARGET REQUIREMENT:
{requirement_summary}

RELEVANCE HINTS (achievement index -> pain point it best addresses):
{mapping_hints}
{feedback}
RULES:
1. Produce at most {target_count} bullets. Never invent achievements: if fewer sources exist, produce fewer bullets.
2. Each bullet is {min_words}-{max_words} words.
3. Every number, percentage or currency figure must appear verbatim in the source achievement it cites. Do not alter magnitudes.
4. Weave in target keywords only where the source evidence supports them.

Respond ONLY with a JSON array:
[
  {
    "text": "rewritten bullet",
    "source_index": 0,
    "source_metric": "40%" ,
    "keyword": "caching",
    "pain_point": "system performance issues",
    "structure": {"action": "...", "technology": null, "result": "...", "impact": "...", "situation": null}
  }
]
source_index is the number of the source achievement the bullet was derived from.
source_metric, keyword, pain_point and every structure field may be null."#;

const HEADER_SYNTHESIS_TEMPLATE: &str = r#"TASK: Write the header block for a tailored CV.

TARGET REQUIREMENT:
{requirement_summary}

CAREER HISTORY:
{career_summary}

STRONGEST BULLETS ACROSS ALL ROLES:
{strongest_bullets}

COMPANY SIGNALS (may be empty):
{company_signals}
{feedback}
RULES:
1. The tagline is third-person narrative, 30-50 words. First- and second-person pronouns (I, me, my, we, our, you, your) are forbidden.
2. Highlights are 4-5 one-line distillations of the strongest bullets. Do not introduce figures absent from those bullets.

Respond ONLY with JSON:
{
  "tagline": "...",
  "highlights": ["...", "...", "...", "..."]
}"#;

const DOCUMENT_GRADE_TEMPLATE: &str = r#"TASK: Grade the tailored CV below against the target requirement.

TARGET REQUIREMENT:
{requirement_summary}

<CV DOCUMENT>
{document}
</CV DOCUMENT>

Score each dimension 0-100:
- ats: keyword optimization for applicant tracking systems
- impact: clarity and quantified impact of the bullets
- alignment: fit against the stated requirements and pain points
- seniority: executive presence appropriate to the target seniority
- anti_hallucination: absence of unsupported or inflated claims

Respond ONLY with JSON:
{
  "scores": {"ats": 0, "impact": 0, "alignment": 0, "seniority": 0, "anti_hallucination": 0},
  "improvement_directives": [
    {"dimension": "ats", "section": "employer name or HEADER", "instruction": "specific revision instruction"}
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_rendering() {
        let templates = PromptTemplates::default();
        let prompt = templates.render_requirement_extraction("Staff engineer at Initech", 15);

        assert!(prompt.contains("Staff engineer at Initech"));
        assert!(prompt.contains("exactly 15 lowercase keywords"));
        assert!(prompt.contains("<JOB POSTING>"));
    }

    #[test]
    fn test_role_bullets_rendering_with_feedback() {
        let templates = PromptTemplates::default();
        let prompt = templates.render_role_bullets(
            "Acme Corp — Senior Backend Engineer",
            "0. Reduced latency by 40% using caching",
            "0 -> technology-forward",
            "senior backend role",
            "0 -> system performance issues",
            6,
            25,
            40,
            Some("bullet 2 claimed 75% but source says 60%"),
        );

        assert!(prompt.contains("Acme Corp"));
        assert!(prompt.contains("at most 6 bullets"));
        assert!(prompt.contains("25-40 words"));
        assert!(prompt.contains("PREVIOUS ATTEMPT WAS REJECTED"));
        assert!(prompt.contains("75% but source says 60%"));
    }

    #[test]
    fn test_grade_rendering() {
        let templates = PromptTemplates::default();
        let prompt = templates.render_document_grade("## CV body", "staff role summary");

        assert!(prompt.contains("## CV body"));
        assert!(prompt.contains("anti_hallucination"));
    }
}
