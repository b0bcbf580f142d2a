//! Configuration management for the CV tailoring pipeline

use crate::error::{CvTailorError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub extraction: ExtractionConfig,
    pub mapping: MappingConfig,
    pub generation: GenerationConfig,
    pub qa: QaConfig,
    pub stitching: StitchingConfig,
    pub grading: GradingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint
    pub endpoint: String,
    pub model_name: String,
    /// Environment variable holding the API key, if the endpoint needs one
    pub api_key_env: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: usize,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Exact number of keywords a RequirementRecord carries
    pub keyword_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Minimum overlap score for an achievement to claim a pain point
    pub relevance_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Bullet slots per recency tier: most recent role first
    pub bullet_schedule: Vec<usize>,
    pub min_bullet_words: usize,
    pub max_bullet_words: usize,
    /// Concurrent per-role generation tasks
    pub concurrency: usize,
    /// Per-role wall-clock budget before degrading to raw achievements
    pub role_timeout_secs: u64,
    /// Tech-term density above which a bullet uses the technology-forward template
    pub tech_template_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    /// Relative tolerance band for numeric grounding matches (0.15 = ±15%)
    pub numeric_tolerance: f32,
    /// Fraction of flagged bullets that fails the whole role batch
    pub flagged_ratio_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchingConfig {
    /// Hard cap on the assembled body's word count
    pub word_budget: usize,
    /// Similarity above which two bullets count as duplicates
    pub duplicate_similarity_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Composite score required to pass (0.0 to 1.0)
    pub passing_score: f32,
    pub max_iterations: usize,
    pub weights: GradeWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeWeights {
    pub ats: f32,
    pub impact: f32,
    pub alignment: f32,
    pub seniority: f32,
    pub anti_hallucination: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub color_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Console,
    Json,
    Markdown,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                endpoint: "http://localhost:11434/v1".to_string(),
                model_name: "llama3.1:8b".to_string(),
                api_key_env: None,
                request_timeout_secs: 120,
                max_retries: 3,
                max_tokens: 2048,
                temperature: 0.4,
            },
            extraction: ExtractionConfig { keyword_count: 15 },
            mapping: MappingConfig {
                relevance_threshold: 0.12,
            },
            generation: GenerationConfig {
                bullet_schedule: vec![6, 4, 2],
                min_bullet_words: 25,
                max_bullet_words: 40,
                concurrency: 3,
                role_timeout_secs: 180,
                tech_template_threshold: 0.08,
            },
            qa: QaConfig {
                numeric_tolerance: 0.15,
                flagged_ratio_threshold: 0.5,
            },
            stitching: StitchingConfig {
                word_budget: 600,
                duplicate_similarity_threshold: 0.82,
            },
            grading: GradingConfig {
                passing_score: 0.82,
                max_iterations: 3,
                weights: GradeWeights {
                    ats: 0.25,
                    impact: 0.25,
                    alignment: 0.25,
                    seniority: 0.15,
                    anti_hallucination: 0.10,
                },
            },
            output: OutputConfig {
                format: OutputFormat::Console,
                color_output: true,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content).map_err(|e| {
                CvTailorError::Configuration(format!("Failed to parse config: {}", e))
            })?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            CvTailorError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(config_path, content)?;
        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("cv-tailor")
            .join("config.toml")
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.generation.min_bullet_words >= self.generation.max_bullet_words {
            return Err(CvTailorError::Configuration(
                "min_bullet_words must be below max_bullet_words".to_string(),
            ));
        }
        if self.generation.bullet_schedule.is_empty() {
            return Err(CvTailorError::Configuration(
                "bullet_schedule must have at least one tier".to_string(),
            ));
        }
        if self.generation.concurrency == 0 {
            return Err(CvTailorError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.qa.flagged_ratio_threshold) {
            return Err(CvTailorError::Configuration(
                "flagged_ratio_threshold must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.stitching.word_budget == 0 {
            return Err(CvTailorError::Configuration(
                "word_budget must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Bullet slots for a role at the given recency index (0 = most recent).
    /// Roles older than the last tier get the last tier's allotment.
    pub fn bullets_for_tier(&self, recency_index: usize) -> usize {
        let schedule = &self.generation.bullet_schedule;
        *schedule
            .get(recency_index)
            .unwrap_or_else(|| schedule.last().expect("schedule validated non-empty"))
    }
}
