//! cv-tailor: generate a tailored CV from a job posting and a master document

use clap::Parser;
use colored::Colorize;
use cv_tailor::cli::{self, Cli, Commands, ConfigAction};
use cv_tailor::config::{Config, OutputFormat};
use cv_tailor::error::{CvTailorError, Result};
use cv_tailor::input::manager::InputManager;
use cv_tailor::input::splitter::DocumentSplitter;
use cv_tailor::llm::client::HttpLanguageModel;
use cv_tailor::llm::extractor::RequirementExtractor;
use cv_tailor::output::renderer::Renderer;
use cv_tailor::processing::engine::GenerationEngine;
use cv_tailor::store::{InMemoryJobStore, JobRecord, JobStore};
use indicatif::{ProgressBar, ProgressStyle};
use log::error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command, config).await {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

async fn run_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Generate {
            job,
            master,
            output,
            save,
        } => {
            cli::validate_file_extension(&job, &["txt", "md"])
                .map_err(|e| CvTailorError::InvalidInput(format!("Job posting file: {}", e)))?;
            cli::validate_file_extension(&master, &["txt", "md"])
                .map_err(|e| CvTailorError::InvalidInput(format!("Master document: {}", e)))?;

            let output_format =
                cli::parse_output_format(&output).map_err(CvTailorError::InvalidInput)?;

            println!("🚀 Tailored CV generation");
            println!("💼 Job posting: {}", job.display());
            println!("📄 Master document: {}", master.display());

            let mut input_manager = InputManager::new();
            let posting_text = input_manager.read_text(&job).await?;

            let model = Arc::new(HttpLanguageModel::from_config(&config.model)?);
            let engine = GenerationEngine::new(model, config.clone());

            // Seed the job store the way the runner service would
            let store = InMemoryJobStore::new();
            let job_id = "job-1";
            store
                .put(JobRecord {
                    id: job_id.to_string(),
                    posting_text,
                    master_document_ref: master.to_string_lossy().to_string(),
                    outcome: None,
                })
                .await?;

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message("Generating tailored CV...");
            spinner.enable_steady_tick(Duration::from_millis(120));

            let result = engine.generate_for_job(&store, job_id, &[]).await;
            spinner.finish_and_clear();
            let outcome = result?;

            let renderer = Renderer::new(&config);
            println!("{}", renderer.render(&outcome, &output_format)?);

            if let Some(save_path) = save {
                let markdown = renderer.render(&outcome, &OutputFormat::Markdown)?;
                tokio::fs::write(&save_path, markdown).await?;
                println!("💾 Markdown artifact saved to {}", save_path.display());
            }

            if outcome.grade.passed {
                println!("{}", "✅ Generation complete".green());
            } else {
                println!(
                    "{}",
                    "⚠️  Best draft returned below the passing threshold".yellow()
                );
            }
        }

        Commands::Split { master } => {
            cli::validate_file_extension(&master, &["txt", "md"])
                .map_err(|e| CvTailorError::InvalidInput(format!("Master document: {}", e)))?;

            let mut input_manager = InputManager::new();
            let text = input_manager.read_text(&master).await?;
            let document = DocumentSplitter::new().split(&text)?;

            println!(
                "📄 {} role(s) detected (content hash {})",
                document.roles.len(),
                document.content_hash
            );
            for role in &document.roles {
                println!(
                    "  • {} — {} ({}){}",
                    role.employer,
                    role.title,
                    role.date_range,
                    if role.most_recent { " [most recent]" } else { "" }
                );
                println!(
                    "    {} achievement(s), {} hard skill(s), {} soft skill(s)",
                    role.achievements.len(),
                    role.hard_skills.len(),
                    role.soft_skills.len()
                );
            }
        }

        Commands::Extract { job } => {
            cli::validate_file_extension(&job, &["txt", "md"])
                .map_err(|e| CvTailorError::InvalidInput(format!("Job posting file: {}", e)))?;

            let mut input_manager = InputManager::new();
            let posting = input_manager.read_text(&job).await?;

            let model = HttpLanguageModel::from_config(&config.model)?;
            let extractor = RequirementExtractor::new(&model, &config);
            let record = extractor.extract(&posting).await?;

            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.low_confidence {
                println!(
                    "{}",
                    "⚠️  Extraction used the lexical fallback (low confidence)".yellow()
                );
            }
        }

        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => {
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|e| CvTailorError::Configuration(e.to_string()))?;
                println!("{}", rendered);
            }
            ConfigAction::Reset => {
                let fresh = Config::default();
                fresh.save()?;
                println!("✅ Configuration reset to defaults");
            }
        },
    }

    Ok(())
}
