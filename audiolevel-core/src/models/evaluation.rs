//! Executor/Evaluator result types.

use super::metrics::AnalysisMetrics;
use serde::{Deserialize, Serialize};

/// Outcome of running one candidate through the Runner. Consumed by the
/// Evaluator; losers' `output_path` is deleted after scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub success: bool,
    pub output_path: Option<String>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubScores {
    pub loudness_accuracy: f64,
    pub dynamic_range: f64,
    pub peak_safety: f64,
    pub noise_reduction: f64,
    pub perceptual_quality: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub candidate_id: String,
    pub candidate_name: String,
    pub sub_scores: SubScores,
    pub total_score: f64,
    pub metrics: AnalysisMetrics,
    pub passed_safety: bool,
    pub rejection_reason: Option<String>,
}
