//! Content Classifier
//!
//! Scores speech vs. music independently by summing weighted signals drawn
//! from the measurement vector, then applies a margin-and-threshold decision
//! rule. Modeled on the confidence-assessor's weighted-evidence-combination
//! shape, but per spec the two content scores are computed independently
//! rather than as complementary weights of one scale.

use crate::models::{AnalysisMetrics, ContentClassification, ContentType, Signal};

struct Weighted {
    name: &'static str,
    value: f64,
    speech_weight: f64,
    music_weight: f64,
}

fn signals(m: &AnalysisMetrics) -> Vec<Weighted> {
    vec![
        Weighted {
            name: "silence_ratio",
            value: m.silence_ratio,
            speech_weight: m.silence_ratio * 0.3,
            music_weight: (1.0 - m.silence_ratio) * 0.1,
        },
        Weighted {
            name: "crest_factor",
            value: m.crest_factor_db,
            speech_weight: if m.crest_factor_db > 14.0 { 0.15 } else { 0.05 },
            music_weight: if m.crest_factor_db <= 14.0 { 0.2 } else { 0.05 },
        },
        Weighted {
            name: "spectral_flatness",
            value: m.spectral_flatness,
            speech_weight: (1.0 - m.spectral_flatness) * 0.15,
            music_weight: m.spectral_flatness * 0.15,
        },
        Weighted {
            name: "loudness_range",
            value: m.loudness_range_lu,
            speech_weight: if m.loudness_range_lu < 10.0 { 0.2 } else { 0.05 },
            music_weight: if m.loudness_range_lu >= 10.0 { 0.25 } else { 0.05 },
        },
        Weighted {
            name: "spectral_centroid",
            value: m.spectral_centroid_hz,
            speech_weight: if m.spectral_centroid_hz > 1_500.0 && m.spectral_centroid_hz < 4_000.0 {
                0.2
            } else {
                0.05
            },
            music_weight: if m.spectral_centroid_hz <= 1_500.0 || m.spectral_centroid_hz >= 4_000.0 {
                0.25
            } else {
                0.05
            },
        },
    ]
}

/// Classify an `AnalysisMetrics` snapshot into a content type with
/// confidence, per spec.md's margin-and-threshold decision rule.
pub fn classify(metrics: &AnalysisMetrics) -> ContentClassification {
    let weighted = signals(metrics);

    let speech: f64 = weighted.iter().map(|w| w.speech_weight).sum();
    let music: f64 = weighted.iter().map(|w| w.music_weight).sum();

    let signal_list: Vec<Signal> = weighted
        .iter()
        .map(|w| {
            let (points_toward, weight) = if w.speech_weight >= w.music_weight {
                (ContentType::Speech, w.speech_weight)
            } else {
                (ContentType::Music, w.music_weight)
            };
            Signal {
                name: w.name.to_string(),
                value: w.value,
                points_toward,
                weight,
            }
        })
        .collect();

    let (content_type, confidence) = if speech - music > 0.2 && speech > 0.6 {
        (ContentType::Speech, speech.min(1.0))
    } else if music - speech > 0.2 && music > 0.6 {
        (ContentType::Music, music.min(1.0))
    } else if speech > 0.3 && music > 0.3 {
        (ContentType::PodcastMixed, 0.6)
    } else {
        (ContentType::Unknown, 0.5)
    };

    ContentClassification {
        content_type,
        confidence,
        signals: signal_list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_metrics() -> AnalysisMetrics {
        AnalysisMetrics::default()
    }

    #[test]
    fn speech_like_metrics_classify_as_speech() {
        let m = AnalysisMetrics {
            silence_ratio: 0.3,
            crest_factor_db: 16.0,
            spectral_flatness: 0.1,
            loudness_range_lu: 6.0,
            spectral_centroid_hz: 2_500.0,
            ..base_metrics()
        };
        let c = classify(&m);
        assert_eq!(c.content_type, ContentType::Speech);
        assert!(c.confidence > 0.6);
    }

    #[test]
    fn music_like_metrics_classify_as_music() {
        let m = AnalysisMetrics {
            silence_ratio: 0.0,
            crest_factor_db: 10.0,
            spectral_flatness: 0.8,
            loudness_range_lu: 14.0,
            spectral_centroid_hz: 800.0,
            ..base_metrics()
        };
        let c = classify(&m);
        assert_eq!(c.content_type, ContentType::Music);
    }

    #[test]
    fn ambiguous_metrics_fall_back_to_unknown_or_mixed() {
        let m = base_metrics();
        let c = classify(&m);
        assert!(matches!(c.content_type, ContentType::Unknown | ContentType::PodcastMixed));
    }

    #[test]
    fn signals_are_returned_unmodified_for_explainability() {
        let m = base_metrics();
        let c = classify(&m);
        assert_eq!(c.signals.len(), 5);
    }
}
