//! CLI interface for the CV tailoring pipeline

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cv-tailor")]
#[command(about = "LLM-backed CV tailoring pipeline with fact-grounding verification")]
#[command(
    long_about = "Generate a tailored CV from a job posting and a master professional-history document: requirement extraction, grounded bullet generation, hallucination QA, stitching and a graded improvement loop"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a tailored CV for a job posting
    Generate {
        /// Path to the job posting file (TXT, MD)
        #[arg(short, long)]
        job: PathBuf,

        /// Path to the master professional-history document (TXT, MD)
        #[arg(short, long)]
        master: PathBuf,

        /// Output format: console, json, markdown
        #[arg(short, long, default_value = "console")]
        output: String,

        /// Save the markdown artifact to a file
        #[arg(short, long)]
        save: Option<PathBuf>,
    },

    /// Split a master document and show the detected role records
    Split {
        /// Path to the master professional-history document (TXT, MD)
        #[arg(short, long)]
        master: PathBuf,
    },

    /// Extract the structured requirement record from a job posting
    Extract {
        /// Path to the job posting file (TXT, MD)
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,
}

/// Parse and validate output format
pub fn parse_output_format(format: &str) -> Result<crate::config::OutputFormat, String> {
    match format.to_lowercase().as_str() {
        "console" => Ok(crate::config::OutputFormat::Console),
        "json" => Ok(crate::config::OutputFormat::Json),
        "markdown" | "md" => Ok(crate::config::OutputFormat::Markdown),
        _ => Err(format!(
            "Invalid output format: {}. Supported: console, json, markdown",
            format
        )),
    }
}

/// Validate file extension
pub fn validate_file_extension(path: &PathBuf, allowed_extensions: &[&str]) -> Result<(), String> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => {
            if allowed_extensions.contains(&ext.to_lowercase().as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "Unsupported file extension: .{}. Allowed: {}",
                    ext,
                    allowed_extensions.join(", ")
                ))
            }
        }
        None => Err("File has no extension".to_string()),
    }
}
