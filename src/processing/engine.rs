//! Generation engine: the full pipeline for one request
//!
//! Requirement extraction, master-document splitting and achievement mapping
//! feed a concurrent per-role generation stage with QA, then stitching,
//! header synthesis and the grading/improvement loop. Per-role generation
//! fans out under a bounded semaphore; QA and stitching sit behind the join
//! barrier; the grading loop is strictly sequential.

use crate::config::Config;
use crate::error::Result;
use crate::input::manager::InputManager;
use crate::input::splitter::{DocumentSplitter, MasterDocument, RoleRecord};
use crate::llm::client::LanguageModel;
use crate::llm::extractor::{RequirementExtractor, RequirementRecord};
use crate::llm::generator::{degraded_bullets, GeneratedBullet, RoleBulletGenerator};
use crate::llm::grader::{DocumentGrader, DraftState, FallbackSignals, GradeResult};
use crate::llm::header::{CompanySignal, HeaderSynthesizer};
use crate::output::renderer::render_markdown;
use crate::processing::mapper::{AchievementMapper, AchievementMapping};
use crate::processing::qa::GroundingVerifier;
use crate::processing::stitcher::{AssembledDocument, Stitcher};
use crate::store::JobStore;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Final result of one generation request. A below-threshold grade is not an
/// error: the best-seen draft is returned with its grade attached so callers
/// can decide whether to publish anyway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub document: AssembledDocument,
    pub grade: GradeResult,
    pub state: DraftState,
    /// Improvement iterations actually spent
    pub iterations_used: usize,
    /// Total drafts produced (1 initial + improvements)
    pub drafts_produced: usize,
    pub low_confidence_requirement: bool,
    pub degraded_roles: Vec<String>,
    pub model_name: String,
    pub generated_at: DateTime<Utc>,
}

struct RoleOutcome {
    bullets: Vec<GeneratedBullet>,
    confidence: f32,
    degraded: bool,
}

pub struct GenerationEngine {
    model: Arc<dyn LanguageModel>,
    config: Arc<Config>,
}

impl GenerationEngine {
    pub fn new(model: Arc<dyn LanguageModel>, config: Config) -> Self {
        Self {
            model,
            config: Arc::new(config),
        }
    }

    /// Run the whole pipeline for one posting/master-document pair.
    pub async fn generate(
        &self,
        posting: &str,
        master_document: &str,
        signals: &[CompanySignal],
    ) -> Result<GenerationOutcome> {
        let extractor = RequirementExtractor::new(self.model.as_ref(), &self.config);
        let requirement = extractor.extract(posting).await?;
        info!(
            "Requirement extracted: {} at {} ({})",
            requirement.role_title,
            requirement.company,
            if requirement.low_confidence {
                "low confidence"
            } else {
                "model"
            }
        );

        let master = DocumentSplitter::new().split(master_document)?;
        info!("Master document split into {} role(s)", master.roles.len());

        let mapping = AchievementMapper::new(&self.config).map(&master.roles, &requirement);

        let (mut batches, confidences, degraded_roles) =
            self.generate_roles(&master.roles, &requirement, &mapping).await;

        let document = self.assemble(&master, &batches, &requirement, signals).await?;

        let avg_confidence = if confidences.is_empty() {
            1.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        self.grade_and_improve(
            document,
            &mut batches,
            &master,
            &requirement,
            &mapping,
            signals,
            avg_confidence,
            degraded_roles,
        )
        .await
    }

    /// Load inputs through the job store, generate, and persist the outcome
    /// back through the store.
    pub async fn generate_for_job(
        &self,
        store: &dyn JobStore,
        job_id: &str,
        signals: &[CompanySignal],
    ) -> Result<GenerationOutcome> {
        let record = store.get(job_id).await?;

        let mut input = InputManager::new();
        let master_text = input.read_text(Path::new(&record.master_document_ref)).await?;

        let outcome = self
            .generate(&record.posting_text, &master_text, signals)
            .await?;

        store
            .save_outcome(job_id, &outcome.document, &outcome.grade)
            .await?;

        Ok(outcome)
    }

    /// Fan per-role generation out over a bounded worker pool. Roles own
    /// disjoint data, so the join barrier is the only synchronization point;
    /// results are re-ordered by role index regardless of completion order.
    async fn generate_roles(
        &self,
        roles: &[RoleRecord],
        requirement: &RequirementRecord,
        mapping: &AchievementMapping,
    ) -> (Vec<Vec<GeneratedBullet>>, Vec<f32>, Vec<String>) {
        let semaphore = Arc::new(Semaphore::new(self.config.generation.concurrency));
        let mut join_set: JoinSet<(usize, RoleOutcome)> = JoinSet::new();

        for (index, role) in roles.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let model = Arc::clone(&self.model);
            let config = Arc::clone(&self.config);
            let role = role.clone();
            let requirement = requirement.clone();
            let mapping = mapping.clone();
            let target = self.config.bullets_for_tier(index);

            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let outcome = run_role(&model, &config, &role, &requirement, &mapping, target).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<RoleOutcome>> = roles.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => warn!("Per-role generation task panicked: {}", e),
            }
        }

        let mut batches = Vec::new();
        let mut confidences = Vec::new();
        let mut degraded = Vec::new();
        for (index, (role, slot)) in roles.iter().zip(slots).enumerate() {
            match slot {
                Some(outcome) => {
                    if outcome.degraded {
                        degraded.push(role.id.clone());
                    }
                    confidences.push(outcome.confidence);
                    batches.push(outcome.bullets);
                }
                None => {
                    degraded.push(role.id.clone());
                    confidences.push(0.5);
                    batches.push(degraded_bullets(
                        role,
                        self.config.bullets_for_tier(index),
                        &self.config,
                    ));
                }
            }
        }

        (batches, confidences, degraded)
    }

    async fn assemble(
        &self,
        master: &MasterDocument,
        batches: &[Vec<GeneratedBullet>],
        requirement: &RequirementRecord,
        signals: &[CompanySignal],
    ) -> Result<AssembledDocument> {
        let body = Stitcher::new(&self.config).stitch(&master.roles, batches, &requirement.keywords);

        let header = HeaderSynthesizer::new(self.model.as_ref())
            .synthesize(&master.identity, &master.roles, requirement, &body, signals)
            .await?;

        Ok(AssembledDocument { header, body })
    }

    /// The bounded improvement loop. Strictly sequential: each iteration
    /// depends on the previous draft's grade. When the cap is reached the
    /// best-scoring draft seen wins, not the last one.
    #[allow(clippy::too_many_arguments)]
    async fn grade_and_improve(
        &self,
        initial: AssembledDocument,
        batches: &mut Vec<Vec<GeneratedBullet>>,
        master: &MasterDocument,
        requirement: &RequirementRecord,
        mapping: &AchievementMapping,
        signals: &[CompanySignal],
        qa_confidence: f32,
        degraded_roles: Vec<String>,
    ) -> Result<GenerationOutcome> {
        let grader = DocumentGrader::new(self.model.as_ref(), &self.config);
        let verifier = GroundingVerifier::new(&self.config);

        let mut state = DraftState::Drafted;
        let mut current = initial;
        let mut iterations = 0usize;
        let mut drafts = 1usize;
        let mut best: Option<(AssembledDocument, GradeResult)> = None;
        let mut last_grade: Option<GradeResult> = None;

        while state != DraftState::Final {
            match state {
                DraftState::Drafted | DraftState::Improving => {
                    let markdown = render_markdown(&current)?;
                    let all_bullets: Vec<GeneratedBullet> =
                        current.all_bullets().into_iter().cloned().collect();
                    let fallback = FallbackSignals {
                        keyword_coverage: verifier
                            .keyword_coverage(&all_bullets, &requirement.keywords),
                        qa_confidence,
                    };

                    let grade = grader
                        .grade(&markdown, requirement, fallback, iterations)
                        .await?;
                    info!(
                        "Draft {} graded {:.2} ({})",
                        drafts,
                        grade.composite,
                        if grade.passed { "pass" } else { "below threshold" }
                    );

                    let is_best = best
                        .as_ref()
                        .map_or(true, |(_, g)| grade.composite > g.composite);
                    if is_best {
                        best = Some((current.clone(), grade.clone()));
                    }

                    last_grade = Some(grade);
                    state = DraftState::Graded;
                }
                DraftState::Graded => {
                    let grade = last_grade.as_ref().expect("graded state implies a grade");
                    if grade.passed || iterations >= self.config.grading.max_iterations {
                        state = DraftState::Final;
                    } else {
                        iterations += 1;
                        drafts += 1;
                        let grade = grade.clone();
                        current = self
                            .improve(&current, &grade, batches, master, requirement, mapping, signals)
                            .await?;
                        state = DraftState::Improving;
                    }
                }
                DraftState::Final => unreachable!("loop exits before Final is processed"),
            }
        }

        let (document, grade) = best.expect("at least one draft is always graded");

        Ok(GenerationOutcome {
            document,
            grade,
            state,
            iterations_used: iterations,
            drafts_produced: drafts,
            low_confidence_requirement: requirement.low_confidence,
            degraded_roles,
            model_name: self.model.name().to_string(),
            generated_at: Utc::now(),
        })
    }

    /// Scoped regeneration: only the sections named by the grade's
    /// directives are rebuilt, never the whole document. With no usable
    /// directives the most recent role is reworked against the weakest
    /// dimension.
    #[allow(clippy::too_many_arguments)]
    async fn improve(
        &self,
        current: &AssembledDocument,
        grade: &GradeResult,
        batches: &mut [Vec<GeneratedBullet>],
        master: &MasterDocument,
        requirement: &RequirementRecord,
        mapping: &AchievementMapping,
        signals: &[CompanySignal],
    ) -> Result<AssembledDocument> {
        let generator = RoleBulletGenerator::new(self.model.as_ref(), &self.config);
        let verifier = GroundingVerifier::new(&self.config);

        let mut targeted_roles: Vec<(usize, String)> = Vec::new();
        for directive in &grade.directives {
            if directive.section.eq_ignore_ascii_case("HEADER") {
                continue;
            }
            if let Some(index) = master
                .roles
                .iter()
                .position(|r| r.employer.eq_ignore_ascii_case(&directive.section))
            {
                targeted_roles.push((index, directive.instruction.clone()));
            }
        }

        if targeted_roles.is_empty() {
            // No section-level directives; rework the most recent role
            targeted_roles.push((
                0,
                format!(
                    "Strengthen the {} dimension of these bullets.",
                    grade.scores.weakest()
                ),
            ));
        }

        for (index, instruction) in targeted_roles {
            let role = &master.roles[index];
            let target = self.config.bullets_for_tier(index);

            match generator
                .generate_with_feedback(role, requirement, mapping, target, Some(&instruction))
                .await
            {
                Ok(bullets) => {
                    let report = verifier.verify_role(&bullets, role, &requirement.keywords);
                    let surviving: Vec<GeneratedBullet> =
                        report.surviving(&bullets).into_iter().cloned().collect();
                    if !surviving.is_empty() {
                        batches[index] = surviving;
                    } else {
                        warn!(
                            "Improvement pass for {} produced no grounded bullets; keeping previous section",
                            role.employer
                        );
                    }
                }
                Err(e) => {
                    warn!("Improvement pass for {} failed: {}", role.employer, e);
                }
            }
        }

        let mut document = self.assemble(master, batches, requirement, signals).await?;

        // Header-targeted directives regenerate the header; otherwise the
        // previous header carries over untouched.
        if !grade
            .directives
            .iter()
            .any(|d| d.section.eq_ignore_ascii_case("HEADER"))
        {
            document.header = current.header.clone();
        }

        Ok(document)
    }
}

/// One role's generation + QA, run inside the worker pool. Timeouts and
/// exhausted retries degrade to the role's raw achievements instead of
/// aborting the document.
async fn run_role(
    model: &Arc<dyn LanguageModel>,
    config: &Arc<Config>,
    role: &RoleRecord,
    requirement: &RequirementRecord,
    mapping: &AchievementMapping,
    target: usize,
) -> RoleOutcome {
    let budget = Duration::from_secs(config.generation.role_timeout_secs);
    let work = generate_and_verify(model, config, role, requirement, mapping, target);

    match tokio::time::timeout(budget, work).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!("Role {} generation failed ({}); using raw achievements", role.id, e);
            RoleOutcome {
                bullets: degraded_bullets(role, target, config),
                confidence: 0.5,
                degraded: true,
            }
        }
        Err(_) => {
            warn!("Role {} generation timed out; using raw achievements", role.id);
            RoleOutcome {
                bullets: degraded_bullets(role, target, config),
                confidence: 0.5,
                degraded: true,
            }
        }
    }
}

async fn generate_and_verify(
    model: &Arc<dyn LanguageModel>,
    config: &Arc<Config>,
    role: &RoleRecord,
    requirement: &RequirementRecord,
    mapping: &AchievementMapping,
    target: usize,
) -> Result<RoleOutcome> {
    let generator = RoleBulletGenerator::new(model.as_ref(), config);
    let verifier = GroundingVerifier::new(config);

    let bullets = generator.generate(role, requirement, mapping, target).await?;
    let report = verifier.verify_role(&bullets, role, &requirement.keywords);

    let (final_bullets, final_report) = if report.batch_failed {
        // Too many flagged bullets: regenerate the whole batch once with the
        // flagged specifics as corrective feedback
        info!(
            "Role {} batch failed QA ({}% flagged); regenerating",
            role.id,
            (report.flagged_ratio * 100.0) as u32
        );
        let feedback = report.feedback();
        let regenerated = generator
            .generate_with_feedback(role, requirement, mapping, target, Some(&feedback))
            .await?;
        let second = verifier.verify_role(&regenerated, role, &requirement.keywords);
        (regenerated, second)
    } else {
        (bullets, report)
    };

    let mut surviving: Vec<GeneratedBullet> = final_report
        .surviving(&final_bullets)
        .into_iter()
        .cloned()
        .collect();

    // Flagged individual bullets were dropped; backfill remaining slots once
    if surviving.len() < target && final_report.flag_count() > 0 {
        let feedback = final_report.feedback();
        if let Ok(extra) = generator
            .generate_with_feedback(role, requirement, mapping, target, Some(&feedback))
            .await
        {
            let extra_report = verifier.verify_role(&extra, role, &requirement.keywords);
            for bullet in extra_report.surviving(&extra) {
                if surviving.len() >= target {
                    break;
                }
                if !surviving.iter().any(|b| b.text == bullet.text) {
                    surviving.push(bullet.clone());
                }
            }
        }
    }

    Ok(RoleOutcome {
        confidence: final_report.confidence,
        bullets: surviving,
        degraded: false,
    })
}
