//! Processing Pipeline
//!
//! Drives one job attempt through Probe → Classifier → Detector → Generator
//! → Executor → Evaluator, reporting progress through a callback so the
//! Worker Pool can fan it out to the Progress Bus.

use crate::evaluator::{self, PerceptualQuality};
use crate::executor::{self, ExecutorError};
use crate::models::{AnalysisMetrics, EvaluationScore, JobResult};
use crate::probe;
use crate::runner::{self, RunnerError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source analysis failed: {0}")]
    Probe(#[from] RunnerError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("no candidate scored safely and no fallback was available")]
    NoWinner,
    #[error("encoding the winning candidate to its final output failed: {0}")]
    FinalEncode(RunnerError),
}

/// Progress milestones reported during one attempt, mirrored onto the job's
/// monotonic percentage and fanned out over the Progress Bus.
#[derive(Debug, Clone, Copy)]
pub enum Stage {
    Analyzing,
    Classifying,
    GeneratingCandidates,
    Processing,
    Evaluating,
    Encoding,
    Done,
}

impl Stage {
    pub fn progress_percent(&self) -> u8 {
        match self {
            Stage::Analyzing => 10,
            Stage::Classifying => 20,
            Stage::GeneratingCandidates => 30,
            Stage::Processing => 60,
            Stage::Evaluating => 85,
            Stage::Encoding => 95,
            Stage::Done => 100,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(Stage) + Send + Sync>;

pub struct PipelineOutcome {
    pub result: JobResult,
}

const LOUDNORM_ANALYSIS_FILTER: &str = "loudnorm=I=-16:TP=-1.5:LRA=11:print_format=summary,astats=metadata=1:reset=1";

async fn analyze(media_toolchain_path: &str, input: &Path, deadline: Duration) -> Result<AnalysisMetrics, RunnerError> {
    let args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-af".to_string(),
        LOUDNORM_ANALYSIS_FILTER.to_string(),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    let output = runner::run(media_toolchain_path, &args, &[], deadline, None).await?;
    Ok(probe::parse_metrics(&format!("{}\n{}", output.stdout, output.stderr)))
}

/// Run one full attempt for a job's input file, returning the chosen
/// candidate's final output path and its evaluation record.
pub async fn run_attempt(
    media_toolchain_path: &str,
    input_path: &Path,
    final_output_path: &Path,
    scratch_dir: &Path,
    candidate_timeout: Duration,
    final_encode_timeout: Duration,
    quality_model_path: Option<&Path>,
    quality_model_weights: Option<&Path>,
    cancel: CancellationToken,
    on_progress: Option<ProgressCallback>,
) -> Result<PipelineOutcome, PipelineError> {
    let report = |stage: Stage| {
        if let Some(cb) = &on_progress {
            cb(stage);
        }
    };

    report(Stage::Analyzing);
    let source_metrics = analyze(media_toolchain_path, input_path, candidate_timeout).await?;

    report(Stage::Classifying);
    let classification = crate::classifier::classify(&source_metrics);

    let problems = crate::detector::detect(&source_metrics, classification.content_type);

    report(Stage::GeneratingCandidates);
    let candidates = crate::generator::generate(classification.content_type, &problems);

    report(Stage::Processing);
    let candidate_results = executor::execute_all(
        media_toolchain_path,
        input_path,
        scratch_dir,
        &candidates,
        candidate_timeout,
        cancel,
    )
    .await?;

    report(Stage::Evaluating);
    let mut scores: Vec<EvaluationScore> = Vec::new();
    for result in candidate_results.iter().filter(|r| r.success) {
        let Some(output_path) = &result.output_path else { continue };
        let Some(candidate) = candidates.iter().find(|c| c.id == result.candidate_id) else { continue };

        let scratch_metrics = match analyze(media_toolchain_path, Path::new(output_path), candidate_timeout).await {
            Ok(m) => m,
            Err(_) => continue,
        };

        let perceptual = perceptual_quality(
            quality_model_path,
            quality_model_weights,
            input_path,
            Path::new(output_path),
            &source_metrics,
            &scratch_metrics,
            candidate_timeout,
        )
        .await;
        scores.push(evaluator::score_candidate(
            candidate,
            &source_metrics,
            &scratch_metrics,
            classification.content_type,
            perceptual,
        ));
    }

    let winner = evaluator::select_winner(&scores).cloned().ok_or(PipelineError::NoWinner)?;
    let winner_reason = evaluator::winner_reason(&winner);

    report(Stage::Encoding);
    let winner_candidate = candidates
        .iter()
        .find(|c| c.id == winner.candidate_id)
        .expect("winner candidate must be present in the generated set");
    let winner_scratch = candidate_results
        .iter()
        .find(|r| r.candidate_id == winner.candidate_id)
        .and_then(|r| r.output_path.clone())
        .expect("winning candidate must have produced scratch output");

    encode_final(media_toolchain_path, Path::new(&winner_scratch), final_output_path, final_encode_timeout)
        .await
        .map_err(PipelineError::FinalEncode)?;

    executor::cleanup_scratch(scratch_dir, &candidate_results, None).await;

    report(Stage::Done);

    Ok(PipelineOutcome {
        result: JobResult {
            output_path: final_output_path.display().to_string(),
            winner_candidate: winner_candidate.name.clone(),
            winner_reason,
            evaluation: winner,
        },
    })
}

async fn perceptual_quality(
    quality_model_path: Option<&Path>,
    quality_model_weights: Option<&Path>,
    source_path: &Path,
    candidate_path: &Path,
    source: &AnalysisMetrics,
    candidate: &AnalysisMetrics,
    deadline: Duration,
) -> PerceptualQuality {
    evaluator::estimate_perceptual_quality(quality_model_path, quality_model_weights, source_path, candidate_path, source, candidate, deadline).await
}

async fn encode_final(media_toolchain_path: &str, scratch_path: &Path, final_output_path: &Path, deadline: Duration) -> Result<(), RunnerError> {
    let args = vec![
        "-y".to_string(),
        "-i".to_string(),
        scratch_path.display().to_string(),
        final_output_path.display().to_string(),
    ];
    runner::run(media_toolchain_path, &args, &[], deadline, None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progress_is_monotonic() {
        let stages = [
            Stage::Analyzing,
            Stage::Classifying,
            Stage::GeneratingCandidates,
            Stage::Processing,
            Stage::Evaluating,
            Stage::Encoding,
            Stage::Done,
        ];
        let mut last = 0;
        for stage in stages {
            let p = stage.progress_percent();
            assert!(p > last, "stage progress must strictly increase");
            last = p;
        }
        assert_eq!(last, 100);
    }
}
