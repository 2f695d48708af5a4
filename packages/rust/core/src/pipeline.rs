//! The enrichment orchestrator.
//!
//! `enrich_master_prompt` wires the detector, retriever, integrator, and
//! refinement loop behind one call. Collaborator handles are constructed by
//! the caller and injected; the pipeline itself never touches config files,
//! environment variables, or global state.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use promptforge_analysis::detect_localized;
use promptforge_integrate::{Integration, Rephraser, estimate_tokens, integrate_deep, integrate_fast};
use promptforge_retrieval::Retriever;
use promptforge_shared::{
    AgentMetrics, AmbiguityReport, EnrichmentCandidate, EnrichmentMetrics, EnrichmentMode,
    EnrichmentOptions, EnrichmentResult, PromptForgeError, Result, RunId, SectionName,
};

use crate::agent;
use crate::judge::QualityJudge;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Injected external services plus the judge loop settings.
pub struct Collaborators {
    pub retriever: Arc<Retriever>,
    pub rephraser: Option<Arc<dyn Rephraser>>,
    pub judge: Option<Arc<dyn QualityJudge>>,
    pub target_score: u32,
    pub max_iterations: usize,
}

impl Collaborators {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self {
            retriever,
            rephraser: None,
            judge: None,
            target_score: 90,
            max_iterations: 3,
        }
    }

    pub fn with_rephraser(mut self, rephraser: Arc<dyn Rephraser>) -> Self {
        self.rephraser = Some(rephraser);
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn QualityJudge>, target_score: u32, max_iterations: usize) -> Self {
        self.judge = Some(judge);
        self.target_score = target_score;
        self.max_iterations = max_iterations;
        self
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Run the whole pipeline for one prompt.
///
/// Empty input is an error. A prompt with no detected gaps, or no retrieved
/// candidates, returns unchanged with zero enrichment metrics; in the
/// no-gap case the retriever is never consulted.
#[instrument(skip_all, fields(mode = %options.mode, chars = text.len()))]
pub async fn enrich_master_prompt(
    text: &str,
    options: &EnrichmentOptions,
    collab: &Collaborators,
) -> Result<EnrichmentResult> {
    let started = Instant::now();
    let run_id = RunId::new();

    if text.trim().is_empty() {
        return Err(PromptForgeError::input("prompt text is empty"));
    }

    let domain = options.domain.as_deref();
    let report = detect_localized(text, domain, options.language)?;
    info!(
        run_id = %run_id,
        gaps = report.total_gaps,
        ambiguity = report.ambiguity_score,
        "analysis complete"
    );

    if options.mode == EnrichmentMode::Off {
        return Ok(unchanged(run_id, text, report, options.mode));
    }
    if !report.has_gaps() {
        info!(run_id = %run_id, "no gaps, nothing to enrich");
        return Ok(unchanged(run_id, text, report, options.mode));
    }

    match options.mode {
        EnrichmentMode::Agent => {
            let run = agent::refine(
                text,
                options,
                &collab.retriever,
                collab.judge.as_deref(),
                collab.target_score,
                collab.max_iterations,
            )
            .await?;
            Ok(build_result(
                run_id,
                text,
                run.text,
                report,
                run.candidates_found,
                &run.integrated,
                Some(run.metrics),
                options.mode,
                started,
            ))
        }
        EnrichmentMode::Fast | EnrichmentMode::Deep => {
            let candidates = collab
                .retriever
                .search(text, &report.gaps, options)
                .await;
            if candidates.is_empty() {
                info!(run_id = %run_id, "no candidates above any threshold, returning original");
                return Ok(unchanged(run_id, text, report, options.mode));
            }
            let found = candidates.len();

            let integration = integrate(text, &candidates, options, collab).await;
            Ok(build_result(
                run_id,
                text,
                integration.text,
                report,
                found,
                &integration.integrated,
                None,
                options.mode,
                started,
            ))
        }
        // Off handled above; Agent/Fast/Deep are exhaustive here.
        EnrichmentMode::Off => unreachable!("off mode returns before dispatch"),
    }
}

async fn integrate(
    text: &str,
    candidates: &[EnrichmentCandidate],
    options: &EnrichmentOptions,
    collab: &Collaborators,
) -> Integration {
    match (options.mode, &collab.rephraser) {
        (EnrichmentMode::Deep, Some(rephraser)) => {
            integrate_deep(
                text,
                candidates,
                options.max_token_budget,
                options.language,
                rephraser.as_ref(),
            )
            .await
        }
        (EnrichmentMode::Deep, None) => {
            warn!("no rephraser configured, deep mode degrades to fast integration");
            integrate_fast(text, candidates, options.max_token_budget)
        }
        _ => integrate_fast(text, candidates, options.max_token_budget),
    }
}

// ---------------------------------------------------------------------------
// Result assembly
// ---------------------------------------------------------------------------

fn unchanged(
    run_id: RunId,
    text: &str,
    report: AmbiguityReport,
    mode: EnrichmentMode,
) -> EnrichmentResult {
    EnrichmentResult {
        run_id,
        enriched_text: text.to_string(),
        original_text: text.to_string(),
        ambiguity_report: report,
        candidates_found: 0,
        integrated_candidates: 0,
        metrics: EnrichmentMetrics::default(),
        mode,
        agent_metrics: None,
        finished_at: Utc::now(),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    run_id: RunId,
    original: &str,
    enriched: String,
    report: AmbiguityReport,
    candidates_found: usize,
    integrated: &[EnrichmentCandidate],
    agent_metrics: Option<AgentMetrics>,
    mode: EnrichmentMode,
    started: Instant,
) -> EnrichmentResult {
    let token_delta = estimate_tokens(&enriched) as i64 - estimate_tokens(original) as i64;
    let mut sections_touched: Vec<SectionName> = Vec::new();
    for cand in integrated {
        if !sections_touched.contains(&cand.target_section) {
            sections_touched.push(cand.target_section);
        }
    }
    EnrichmentResult {
        run_id,
        enriched_text: enriched,
        original_text: original.to_string(),
        ambiguity_report: report,
        candidates_found,
        integrated_candidates: integrated.len(),
        metrics: EnrichmentMetrics {
            token_delta,
            sections_touched,
            elapsed_ms: started.elapsed().as_millis() as u64,
        },
        mode,
        agent_metrics,
        finished_at: Utc::now(),
    }
}
