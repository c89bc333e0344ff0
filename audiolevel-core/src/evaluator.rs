//! Evaluator
//!
//! Re-measures each successful candidate's scratch artifact, scores it with
//! content-type-specific sub-score weights, applies safety vetoes, and picks
//! a winner. Weighted-dimension scoring is modeled on the quality scorer's
//! weighted-average-with-thresholds shape; here the weights vary by content
//! type rather than being fixed.

use crate::models::{AnalysisMetrics, ContentType, EvaluationScore, ProcessingCandidate, SubScores};
use crate::runner;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const SAFETY_MAX_TRUE_PEAK_DBTP: f64 = -0.5;
const SAFETY_MIN_MOS: f64 = 3.0;
const TIE_BREAK_MARGIN: f64 = 0.05;

struct Weights {
    loudness_accuracy: f64,
    dynamic_range: f64,
    peak_safety: f64,
    noise_reduction: f64,
    perceptual_quality: f64,
}

fn weights_for(content_type: ContentType) -> Weights {
    match content_type {
        ContentType::Music => Weights {
            loudness_accuracy: 0.2,
            dynamic_range: 0.3,
            peak_safety: 0.15,
            noise_reduction: 0.1,
            perceptual_quality: 0.25,
        },
        ContentType::Speech | ContentType::PodcastMixed => Weights {
            loudness_accuracy: 0.25,
            dynamic_range: 0.1,
            peak_safety: 0.15,
            noise_reduction: 0.3,
            perceptual_quality: 0.2,
        },
        ContentType::Unknown => Weights {
            loudness_accuracy: 0.2,
            dynamic_range: 0.2,
            peak_safety: 0.2,
            noise_reduction: 0.2,
            perceptual_quality: 0.2,
        },
    }
}

fn score_loudness_accuracy(metrics: &AnalysisMetrics, candidate: &ProcessingCandidate) -> f64 {
    let error = (metrics.integrated_loudness_lufs - candidate.target_lufs).abs();
    (100.0 - error * 20.0).clamp(0.0, 100.0)
}

fn score_dynamic_range(metrics: &AnalysisMetrics) -> f64 {
    // Reward LRA within a comfortable 6-14 LU band; penalize outside it.
    if (6.0..=14.0).contains(&metrics.loudness_range_lu) {
        100.0
    } else {
        let distance = if metrics.loudness_range_lu < 6.0 {
            6.0 - metrics.loudness_range_lu
        } else {
            metrics.loudness_range_lu - 14.0
        };
        (100.0 - distance * 8.0).clamp(0.0, 100.0)
    }
}

fn score_peak_safety(metrics: &AnalysisMetrics) -> f64 {
    if metrics.true_peak_dbtp <= SAFETY_MAX_TRUE_PEAK_DBTP {
        100.0
    } else {
        (100.0 - (metrics.true_peak_dbtp - SAFETY_MAX_TRUE_PEAK_DBTP) * 50.0).clamp(0.0, 100.0)
    }
}

fn score_noise_reduction(metrics: &AnalysisMetrics) -> f64 {
    let floor_estimate = metrics.rms_db - metrics.crest_factor_db;
    (100.0 + (floor_estimate + 50.0) * 2.0).clamp(0.0, 100.0)
}

/// Perceptual quality MOS estimate in [1, 5], plus the method used to
/// produce it (external model or spectral-difference fallback).
pub struct PerceptualQuality {
    pub mos: f64,
    pub method: &'static str,
}

/// Fallback spectral-difference heuristic used when no external quality
/// model is configured: penalizes excessive spectral-flatness drift and
/// clipping artifacts relative to the source.
pub fn estimate_perceptual_quality_fallback(source: &AnalysisMetrics, candidate: &AnalysisMetrics) -> PerceptualQuality {
    let flatness_drift = (source.spectral_flatness - candidate.spectral_flatness).abs();
    let clip_penalty = if candidate.flat_factor > 0.0 { 0.5 } else { 0.0 };
    let mos = (5.0 - flatness_drift * 4.0 - clip_penalty).clamp(1.0, 5.0);
    PerceptualQuality { mos, method: "spectral_difference_fallback" }
}

/// Perceptual quality per spec: an external quality-model binary when one
/// is configured and present, otherwise the spectral-difference fallback.
/// The model is invoked against the source and candidate artifacts and is
/// expected to print a bare MOS score on the final line of its stdout.
pub async fn estimate_perceptual_quality(
    model_path: Option<&Path>,
    model_weights: Option<&Path>,
    source_path: &Path,
    candidate_path: &Path,
    source: &AnalysisMetrics,
    candidate: &AnalysisMetrics,
    deadline: Duration,
) -> PerceptualQuality {
    if let Some(model_path) = model_path.filter(|p| p.exists()) {
        if let Some(mos) = run_quality_model(model_path, model_weights, source_path, candidate_path, deadline).await {
            return PerceptualQuality { mos: mos.clamp(1.0, 5.0), method: "external_quality_model" };
        }
        warn!(?model_path, "external quality model invocation failed, falling back to spectral heuristic");
    }
    estimate_perceptual_quality_fallback(source, candidate)
}

async fn run_quality_model(model_path: &Path, model_weights: Option<&Path>, source_path: &Path, candidate_path: &Path, deadline: Duration) -> Option<f64> {
    let mut args = vec![source_path.display().to_string(), candidate_path.display().to_string()];
    if let Some(weights) = model_weights {
        args.push("--weights".to_string());
        args.push(weights.display().to_string());
    }
    let output = runner::run(&model_path.display().to_string(), &args, &[], deadline, None).await.ok()?;
    output.stdout.lines().last()?.trim().parse::<f64>().ok()
}

fn mos_to_score(mos: f64) -> f64 {
    ((mos - 1.0) / 4.0 * 100.0).clamp(0.0, 100.0)
}

/// Score one candidate given its re-measured scratch artifact.
pub fn score_candidate(
    candidate: &ProcessingCandidate,
    source_metrics: &AnalysisMetrics,
    scratch_metrics: &AnalysisMetrics,
    content_type: ContentType,
    perceptual: PerceptualQuality,
) -> EvaluationScore {
    let weights = weights_for(content_type);

    let sub_scores = SubScores {
        loudness_accuracy: score_loudness_accuracy(scratch_metrics, candidate),
        dynamic_range: score_dynamic_range(scratch_metrics),
        peak_safety: score_peak_safety(scratch_metrics),
        noise_reduction: score_noise_reduction(scratch_metrics),
        perceptual_quality: mos_to_score(perceptual.mos),
    };

    let total_score = sub_scores.loudness_accuracy * weights.loudness_accuracy
        + sub_scores.dynamic_range * weights.dynamic_range
        + sub_scores.peak_safety * weights.peak_safety
        + sub_scores.noise_reduction * weights.noise_reduction
        + sub_scores.perceptual_quality * weights.perceptual_quality;

    let passed_safety = scratch_metrics.true_peak_dbtp <= SAFETY_MAX_TRUE_PEAK_DBTP && perceptual.mos >= SAFETY_MIN_MOS;

    let rejection_reason = if !passed_safety {
        Some(if scratch_metrics.true_peak_dbtp > SAFETY_MAX_TRUE_PEAK_DBTP {
            format!("true peak {:.2} dBTP exceeds safety ceiling of {SAFETY_MAX_TRUE_PEAK_DBTP}", scratch_metrics.true_peak_dbtp)
        } else {
            format!("perceptual quality MOS {:.2} below safety floor of {SAFETY_MIN_MOS}", perceptual.mos)
        })
    } else {
        None
    };

    let _ = source_metrics;

    EvaluationScore {
        candidate_id: candidate.id.clone(),
        candidate_name: candidate.name.clone(),
        sub_scores,
        total_score,
        metrics: *scratch_metrics,
        passed_safety,
        rejection_reason,
    }
}

/// Select the winner among scored candidates per spec.md §4.7: prefer safe
/// candidates; among those within 5% of the leader, Conservative wins;
/// otherwise highest score. If no candidate is safe, fall back to
/// Conservative regardless of score, else to the highest score overall.
pub fn select_winner(scores: &[EvaluationScore]) -> Option<&EvaluationScore> {
    if scores.is_empty() {
        return None;
    }

    let safe: Vec<&EvaluationScore> = scores.iter().filter(|s| s.passed_safety).collect();

    let pool: Vec<&EvaluationScore> = if safe.is_empty() {
        if let Some(conservative) = scores.iter().find(|s| s.candidate_id == "conservative") {
            return Some(conservative);
        }
        scores.iter().collect()
    } else {
        safe
    };

    let leader_score = pool.iter().map(|s| s.total_score).fold(f64::MIN, f64::max);

    let within_margin: Vec<&&EvaluationScore> = pool
        .iter()
        .filter(|s| leader_score - s.total_score <= leader_score * TIE_BREAK_MARGIN)
        .collect();

    if within_margin.len() > 1 {
        if let Some(conservative) = within_margin.iter().find(|s| s.candidate_id == "conservative") {
            return Some(**conservative);
        }
    }

    pool.into_iter().max_by(|a, b| a.total_score.partial_cmp(&b.total_score).unwrap())
}

/// Synthesize a human-readable winner-reason sentence from sub-scores that
/// exceed informative thresholds.
pub fn winner_reason(score: &EvaluationScore) -> String {
    let mut reasons = Vec::new();
    if score.sub_scores.loudness_accuracy >= 90.0 {
        reasons.push("hit the target loudness precisely");
    }
    if score.sub_scores.dynamic_range >= 90.0 {
        reasons.push("preserved a natural dynamic range");
    }
    if score.sub_scores.peak_safety >= 95.0 {
        reasons.push("stayed safely under the true-peak ceiling");
    }
    if score.sub_scores.noise_reduction >= 80.0 {
        reasons.push("reduced background noise effectively");
    }
    if score.sub_scores.perceptual_quality >= 80.0 {
        reasons.push("preserved perceptual quality");
    }
    if reasons.is_empty() {
        format!("{} was selected as the best available option", score.candidate_name)
    } else {
        format!("{} {}", score.candidate_name, reasons.join(", "))
    }
}
