//! Candidate Executor
//!
//! Runs every candidate for a job concurrently via the Runner, each writing
//! an intermediate lossless scratch file. Structured concurrency: spawn one
//! task per candidate, await all, collect results; an outer cancellation
//! propagates to every in-flight child process.

use crate::models::{CandidateResult, ProcessingCandidate};
use crate::runner::{self, RunnerError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("every candidate failed processing")]
    AllCandidatesFailed,
}

/// Run `candidates` against `input_path` in parallel, writing scratch output
/// under `scratch_dir`. `media_toolchain_path` is the Runner's argv[0].
pub async fn execute_all(
    media_toolchain_path: &str,
    input_path: &Path,
    scratch_dir: &Path,
    candidates: &[ProcessingCandidate],
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<Vec<CandidateResult>, ExecutorError> {
    let mut handles = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let program = media_toolchain_path.to_string();
        let input = input_path.to_path_buf();
        let scratch_path = scratch_path_for(scratch_dir, &candidate.id);
        let filter_chain = candidate.filter_chain.clone();
        let candidate_id = candidate.id.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            run_one_candidate(&program, &input, &scratch_path, &filter_chain, &candidate_id, timeout, cancel).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_err) => results.push(CandidateResult {
                candidate_id: "unknown".to_string(),
                success: false,
                output_path: None,
                error: Some(format!("task join error: {join_err}")),
                processing_time_ms: 0,
            }),
        }
    }

    if results.iter().all(|r| !r.success) {
        return Err(ExecutorError::AllCandidatesFailed);
    }

    Ok(results)
}

fn scratch_path_for(scratch_dir: &Path, candidate_id: &str) -> PathBuf {
    scratch_dir.join(format!("{candidate_id}.wav"))
}

async fn run_one_candidate(
    program: &str,
    input: &Path,
    scratch_path: &Path,
    filter_chain: &str,
    candidate_id: &str,
    timeout: Duration,
    cancel: CancellationToken,
) -> CandidateResult {
    let started = Instant::now();
    let args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-af".to_string(),
        filter_chain.to_string(),
        scratch_path.display().to_string(),
    ];

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunnerError::Timeout(timeout)),
        result = runner::run(program, &args, &[], timeout, None) => result,
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(output) if output.exit_code == Some(0) => CandidateResult {
            candidate_id: candidate_id.to_string(),
            success: true,
            output_path: Some(scratch_path.display().to_string()),
            error: None,
            processing_time_ms: elapsed_ms,
        },
        Ok(output) => CandidateResult {
            candidate_id: candidate_id.to_string(),
            success: false,
            output_path: None,
            error: Some(format!("exit code {:?}: {}", output.exit_code, output.stderr)),
            processing_time_ms: elapsed_ms,
        },
        Err(err) => CandidateResult {
            candidate_id: candidate_id.to_string(),
            success: false,
            output_path: None,
            error: Some(err.to_string()),
            processing_time_ms: elapsed_ms,
        },
    }
}

/// Delete every scratch artifact except `keep_candidate_id` (the winner),
/// if given.
pub async fn cleanup_scratch(scratch_dir: &Path, results: &[CandidateResult], keep_candidate_id: Option<&str>) {
    for result in results {
        if Some(result.candidate_id.as_str()) == keep_candidate_id {
            continue;
        }
        if let Some(path) = &result.output_path {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
    let _ = scratch_dir;
}
