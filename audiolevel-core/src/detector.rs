//! Problem Detector
//!
//! Maps an `AnalysisMetrics` snapshot plus content type to the fixed
//! `AudioProblems` taxonomy against the thresholds named in spec.md §4.4.

use crate::models::{AnalysisMetrics, AudioProblems, ContentType, ProblemEntry, Severity};

fn severity_from_ratio(ratio: f64, mild: f64, moderate: f64, severe: f64) -> Severity {
    if ratio >= severe {
        Severity::Severe
    } else if ratio >= moderate {
        Severity::Moderate
    } else if ratio >= mild {
        Severity::Mild
    } else {
        Severity::None
    }
}

/// Detect audio defects in `metrics` for a file classified as `content_type`.
pub fn detect(metrics: &AnalysisMetrics, content_type: ContentType) -> AudioProblems {
    let mut problems = AudioProblems::default();

    // Clipping: > 100 peak samples, or a non-zero flat factor.
    let clip_detected = metrics.peak_sample_count > 100 || metrics.flat_factor > 0.0;
    problems.clipping = ProblemEntry {
        detected: clip_detected,
        severity: if !clip_detected {
            Severity::None
        } else {
            severity_from_ratio(metrics.flat_factor.max(metrics.peak_sample_count as f64 / 1000.0), 0.0, 0.02, 0.1)
                .max(Severity::Mild)
        },
        metric: metrics.peak_sample_count as f64,
    };

    // Noise floor: estimated floor at or above -50 dB (approximated from RMS/crest).
    let noise_floor_estimate = metrics.rms_db - metrics.crest_factor_db;
    let noise_detected = noise_floor_estimate > -50.0;
    problems.noise_floor = ProblemEntry {
        detected: noise_detected,
        severity: if !noise_detected {
            Severity::None
        } else {
            severity_from_ratio(noise_floor_estimate + 50.0, 0.0, 10.0, 20.0)
        },
        metric: noise_floor_estimate,
    };

    // DC offset: > 0.01.
    let dc_detected = metrics.dc_offset.abs() > 0.01;
    problems.dc_offset = ProblemEntry {
        detected: dc_detected,
        severity: if !dc_detected {
            Severity::None
        } else {
            severity_from_ratio(metrics.dc_offset.abs(), 0.01, 0.05, 0.1)
        },
        metric: metrics.dc_offset,
    };

    // Low loudness: integrated < -24 LUFS.
    let low_loudness_detected = metrics.integrated_loudness_lufs < -24.0;
    problems.low_loudness = ProblemEntry {
        detected: low_loudness_detected,
        severity: if !low_loudness_detected {
            Severity::None
        } else {
            severity_from_ratio(-24.0 - metrics.integrated_loudness_lufs, 0.0, 4.0, 8.0)
        },
        metric: metrics.integrated_loudness_lufs,
    };

    // Excessive dynamic range: > 15 LU for speech-like content, > 20 LU for music.
    let lra_threshold = match content_type {
        ContentType::Speech | ContentType::PodcastMixed => 15.0,
        ContentType::Music | ContentType::Unknown => 20.0,
    };
    let excessive_dr_detected = metrics.loudness_range_lu > lra_threshold;
    problems.excessive_dynamic_range = ProblemEntry {
        detected: excessive_dr_detected,
        severity: if !excessive_dr_detected {
            Severity::None
        } else {
            severity_from_ratio(metrics.loudness_range_lu - lra_threshold, 0.0, 3.0, 6.0)
        },
        metric: metrics.loudness_range_lu,
    };

    // Sibilance: very-high/mid energy ratio >= 0.5, only evaluated for non-music.
    let sibilance_ratio = if metrics.energy_mid > 0.0 {
        metrics.energy_very_high / metrics.energy_mid
    } else {
        0.0
    };
    let sibilance_detected = content_type != ContentType::Music && sibilance_ratio >= 0.5;
    problems.sibilance = ProblemEntry {
        detected: sibilance_detected,
        severity: if !sibilance_detected {
            Severity::None
        } else {
            severity_from_ratio(sibilance_ratio - 0.5, 0.0, 0.2, 0.4)
        },
        metric: sibilance_ratio,
    };

    // Muddiness: low/mid energy ratio > 1.5.
    let mud_ratio = if metrics.energy_mid > 0.0 {
        metrics.energy_low / metrics.energy_mid
    } else {
        0.0
    };
    let mud_detected = mud_ratio > 1.5;
    problems.muddiness = ProblemEntry {
        detected: mud_detected,
        severity: if !mud_detected {
            Severity::None
        } else {
            severity_from_ratio(mud_ratio - 1.5, 0.0, 0.5, 1.0)
        },
        metric: mud_ratio,
    };

    // Stereo imbalance: > 3 dB.
    let imbalance_detected = metrics.stereo_balance_db.abs() > 3.0;
    problems.stereo_imbalance = ProblemEntry {
        detected: imbalance_detected,
        severity: if !imbalance_detected {
            Severity::None
        } else {
            severity_from_ratio(metrics.stereo_balance_db.abs() - 3.0, 0.0, 3.0, 6.0)
        },
        metric: metrics.stereo_balance_db,
    };

    // Silence padding: > 0.5s at head or tail.
    let padding_detected = metrics.leading_silence_secs > 0.5 || metrics.trailing_silence_secs > 0.5;
    let max_padding = metrics.leading_silence_secs.max(metrics.trailing_silence_secs);
    problems.silence_padding = ProblemEntry {
        detected: padding_detected,
        severity: if !padding_detected {
            Severity::None
        } else {
            severity_from_ratio(max_padding - 0.5, 0.0, 2.0, 5.0)
        },
        metric: max_padding,
    };

    problems
}

impl Severity {
    fn max(self, other: Severity) -> Severity {
        use Severity::*;
        match (self, other) {
            (Severe, _) | (_, Severe) => Severe,
            (Moderate, _) | (_, Moderate) => Moderate,
            (Mild, _) | (_, Mild) => Mild,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_metrics() -> AnalysisMetrics {
        AnalysisMetrics {
            rms_db: -18.0,
            crest_factor_db: 12.0,
            dc_offset: 0.0,
            integrated_loudness_lufs: -16.0,
            loudness_range_lu: 8.0,
            energy_low: 0.2,
            energy_mid: 0.5,
            energy_high: 0.2,
            energy_very_high: 0.05,
            stereo_balance_db: 0.0,
            leading_silence_secs: 0.0,
            trailing_silence_secs: 0.0,
            flat_factor: 0.0,
            peak_sample_count: 0,
            ..AnalysisMetrics::default()
        }
    }

    #[test]
    fn clean_audio_detects_nothing() {
        let problems = detect(&clean_metrics(), ContentType::Music);
        assert!(!problems.any_at_least_moderate());
        assert!(!problems.clipping.detected);
        assert!(!problems.low_loudness.detected);
    }

    #[test]
    fn low_loudness_below_threshold_is_detected() {
        let m = AnalysisMetrics { integrated_loudness_lufs: -30.0, ..clean_metrics() };
        let problems = detect(&m, ContentType::Speech);
        assert!(problems.low_loudness.detected);
    }

    #[test]
    fn excessive_dynamic_range_threshold_differs_by_content_type() {
        let m = AnalysisMetrics { loudness_range_lu: 18.0, ..clean_metrics() };
        let speech_problems = detect(&m, ContentType::Speech);
        let music_problems = detect(&m, ContentType::Music);
        assert!(speech_problems.excessive_dynamic_range.detected);
        assert!(!music_problems.excessive_dynamic_range.detected);
    }

    #[test]
    fn sibilance_only_applies_to_non_music() {
        let m = AnalysisMetrics { energy_very_high: 0.4, energy_mid: 0.5, ..clean_metrics() };
        let speech_problems = detect(&m, ContentType::Speech);
        let music_problems = detect(&m, ContentType::Music);
        assert!(speech_problems.sibilance.detected);
        assert!(!music_problems.sibilance.detected);
    }

    #[test]
    fn severe_problems_trigger_aggressive_candidate_condition() {
        let m = AnalysisMetrics { integrated_loudness_lufs: -40.0, ..clean_metrics() };
        let problems = detect(&m, ContentType::Speech);
        assert!(problems.any_at_least_moderate());
    }
}
