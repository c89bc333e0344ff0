//! Candidate Generator
//!
//! Produces the set of `ProcessingCandidate`s for a job from its analysis,
//! classification, and detected problems. Filter-chain ordering is a
//! contract the Evaluator relies on: `highpass` → `anlmdn` (optional) →
//! `equalizer` (optional) → `deesser` (optional) → one of
//! `dynaudnorm`/`acompressor` (optional, never both) → `loudnorm`, always
//! last, always in linear mode.

use crate::models::{Aggressiveness, AudioProblems, ContentType, ProcessingCandidate};

/// Output loudness-range target for every generated candidate's final
/// `loudnorm` stage. This is a normalization target, not a measurement of
/// the source — it must not vary with the source's measured LRA.
const TARGET_LRA: f64 = 11.0;

struct ChainConfig {
    highpass_hz: u32,
    noise_reduction_strength: Option<u32>,
    mud_cut_db: Option<f64>,
    deesser: bool,
    dynamic_leveler: bool,
    compression_ratio: Option<f64>,
    target_lufs: f64,
    target_true_peak: f64,
}

fn target_envelope(content_type: ContentType) -> (f64, f64) {
    match content_type {
        ContentType::Speech | ContentType::PodcastMixed => (-16.0, -1.5),
        ContentType::Music | ContentType::Unknown => (-14.0, -1.0),
    }
}

fn base_config(content_type: ContentType, aggressiveness: Aggressiveness, problems: &AudioProblems) -> ChainConfig {
    let (target_lufs, target_true_peak) = target_envelope(content_type);
    let aggressive = aggressiveness == Aggressiveness::Aggressive;

    match content_type {
        ContentType::Speech => ChainConfig {
            highpass_hz: 80,
            noise_reduction_strength: if problems.noise_floor.detected { Some(if aggressive { 12 } else { 7 }) } else { None },
            mud_cut_db: if problems.muddiness.detected { Some(-3.0) } else { None },
            deesser: problems.sibilance.detected,
            dynamic_leveler: true,
            compression_ratio: None,
            target_lufs,
            target_true_peak,
        },
        ContentType::PodcastMixed => ChainConfig {
            highpass_hz: 60,
            noise_reduction_strength: if problems.noise_floor.detected { Some(if aggressive { 10 } else { 6 }) } else { None },
            mud_cut_db: if problems.muddiness.detected { Some(-2.5) } else { None },
            deesser: problems.sibilance.detected,
            dynamic_leveler: true,
            compression_ratio: None,
            target_lufs,
            target_true_peak,
        },
        ContentType::Music => ChainConfig {
            highpass_hz: 30,
            noise_reduction_strength: if aggressive && problems.noise_floor.detected { Some(8) } else { None },
            mud_cut_db: if problems.muddiness.detected { Some(-2.0) } else { None },
            deesser: false,
            dynamic_leveler: false,
            compression_ratio: if problems.excessive_dynamic_range.detected {
                Some(if aggressive { 2.0 } else { 1.5 })
            } else {
                None
            },
            target_lufs,
            target_true_peak,
        },
        ContentType::Unknown => ChainConfig {
            highpass_hz: 30,
            noise_reduction_strength: None,
            mud_cut_db: None,
            deesser: false,
            dynamic_leveler: false,
            compression_ratio: None,
            target_lufs,
            target_true_peak,
        },
    }
}

fn build_filter_chain(cfg: &ChainConfig) -> (String, Vec<String>) {
    let mut filters = Vec::new();
    let mut applied = Vec::new();

    filters.push(format!("highpass=f={}", cfg.highpass_hz));
    applied.push("highpass".to_string());

    if let Some(strength) = cfg.noise_reduction_strength {
        filters.push(format!("anlmdn=s={}", strength));
        applied.push("anlmdn".to_string());
    }

    if let Some(cut) = cfg.mud_cut_db {
        filters.push(format!("equalizer=f=300:width_type=o:width=2:g={}", cut));
        applied.push("equalizer".to_string());
    }

    if cfg.deesser {
        filters.push("deesser".to_string());
        applied.push("deesser".to_string());
    }

    if cfg.dynamic_leveler {
        filters.push("dynaudnorm".to_string());
        applied.push("dynaudnorm".to_string());
    } else if let Some(ratio) = cfg.compression_ratio {
        filters.push(format!("acompressor=ratio={}", ratio));
        applied.push("acompressor".to_string());
    }

    filters.push(format!(
        "loudnorm=I={}:TP={}:LRA={}:linear=true",
        cfg.target_lufs, cfg.target_true_peak, TARGET_LRA
    ));
    applied.push("loudnorm".to_string());

    (filters.join(","), applied)
}

fn make_candidate(id: &str, name: &str, description: &str, aggressiveness: Aggressiveness, cfg: ChainConfig) -> ProcessingCandidate {
    let (filter_chain, filters_applied) = build_filter_chain(&cfg);
    ProcessingCandidate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        aggressiveness,
        filter_chain,
        filters_applied,
        target_lufs: cfg.target_lufs,
        target_true_peak: cfg.target_true_peak,
    }
}

/// Build the candidate set for this job: always Conservative + Balanced,
/// Aggressive iff any detected problem is at least moderate, and always one
/// Content-Optimized candidate named after the content type.
pub fn generate(content_type: ContentType, problems: &AudioProblems) -> Vec<ProcessingCandidate> {
    let mut candidates = Vec::new();

    let mut conservative_cfg = base_config(content_type, Aggressiveness::Conservative, problems);
    conservative_cfg.noise_reduction_strength = conservative_cfg.noise_reduction_strength.map(|s| s.min(5));
    conservative_cfg.compression_ratio = None;
    candidates.push(make_candidate(
        "conservative",
        "Conservative",
        "Minimal intervention, preserves source dynamics",
        Aggressiveness::Conservative,
        conservative_cfg,
    ));

    let balanced_cfg = base_config(content_type, Aggressiveness::Balanced, problems);
    candidates.push(make_candidate(
        "balanced",
        "Balanced",
        "Standard corrective processing for detected problems",
        Aggressiveness::Balanced,
        balanced_cfg,
    ));

    if problems.any_at_least_moderate() {
        let aggressive_cfg = base_config(content_type, Aggressiveness::Aggressive, problems);
        candidates.push(make_candidate(
            "aggressive",
            "Aggressive",
            "Stronger correction for moderate-or-worse defects",
            Aggressiveness::Aggressive,
            aggressive_cfg,
        ));
    }

    let optimized_cfg = base_config(content_type, Aggressiveness::Balanced, problems);
    candidates.push(make_candidate(
        "content-optimized",
        &format!("Content-Optimized ({})", content_type),
        "Balanced processing tuned specifically to the detected content type",
        Aggressiveness::Balanced,
        optimized_cfg,
    ));

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProblemEntry, Severity};

    fn clean_problems() -> AudioProblems {
        AudioProblems::default()
    }

    fn filter_position(chain: &str, filter: &str) -> Option<usize> {
        chain.split(',').position(|f| f.starts_with(filter))
    }

    #[test]
    fn always_emits_conservative_and_balanced() {
        let candidates = generate(ContentType::Music, &clean_problems());
        assert!(candidates.iter().any(|c| c.id == "conservative"));
        assert!(candidates.iter().any(|c| c.id == "balanced"));
    }

    #[test]
    fn aggressive_only_emitted_when_problem_at_least_moderate() {
        let candidates = generate(ContentType::Music, &clean_problems());
        assert!(!candidates.iter().any(|c| c.id == "aggressive"));

        let mut problems = clean_problems();
        problems.low_loudness = ProblemEntry { detected: true, severity: Severity::Moderate, metric: -30.0 };
        let candidates = generate(ContentType::Music, &problems);
        assert!(candidates.iter().any(|c| c.id == "aggressive"));
    }

    #[test]
    fn target_envelope_matches_content_type() {
        let speech = generate(ContentType::Speech, &clean_problems());
        let balanced = speech.iter().find(|c| c.id == "balanced").unwrap();
        assert_eq!(balanced.target_lufs, -16.0);
        assert_eq!(balanced.target_true_peak, -1.5);

        let music = generate(ContentType::Music, &clean_problems());
        let balanced = music.iter().find(|c| c.id == "balanced").unwrap();
        assert_eq!(balanced.target_lufs, -14.0);
        assert_eq!(balanced.target_true_peak, -1.0);
    }

    #[test]
    fn filter_chain_ordering_contract_holds() {
        let mut problems = clean_problems();
        problems.noise_floor = ProblemEntry { detected: true, severity: Severity::Mild, metric: -45.0 };
        problems.muddiness = ProblemEntry { detected: true, severity: Severity::Mild, metric: 1.6 };
        problems.sibilance = ProblemEntry { detected: true, severity: Severity::Mild, metric: 0.6 };

        let candidates = generate(ContentType::Speech, &problems);
        let balanced = candidates.iter().find(|c| c.id == "balanced").unwrap();
        let chain = &balanced.filter_chain;

        let hp = filter_position(chain, "highpass").unwrap();
        let nr = filter_position(chain, "anlmdn").unwrap();
        let eq = filter_position(chain, "equalizer").unwrap();
        let de = filter_position(chain, "deesser").unwrap();
        let lev = filter_position(chain, "dynaudnorm").unwrap();
        let ln = filter_position(chain, "loudnorm").unwrap();

        assert!(hp < nr && nr < eq && eq < de && de < lev && lev < ln);
        assert!(chain.ends_with("linear=true"));
    }

    #[test]
    fn music_never_combines_leveler_and_compressor() {
        let mut problems = clean_problems();
        problems.excessive_dynamic_range = ProblemEntry { detected: true, severity: Severity::Moderate, metric: 22.0 };
        let candidates = generate(ContentType::Music, &problems);
        let balanced = candidates.iter().find(|c| c.id == "balanced").unwrap();
        assert!(balanced.filter_chain.contains("acompressor"));
        assert!(!balanced.filter_chain.contains("dynaudnorm"));
    }

    #[test]
    fn content_optimized_candidate_named_after_content_type() {
        let candidates = generate(ContentType::Music, &clean_problems());
        let optimized = candidates.iter().find(|c| c.id == "content-optimized").unwrap();
        assert!(optimized.name.contains("music"));
    }

    #[test]
    fn loudnorm_lra_target_is_fixed_regardless_of_source_measurement() {
        // LRA in the generated chain is an output target, not the measured
        // source value; varying what would have been the source LRA must
        // not move it.
        let candidates_a = generate(ContentType::Speech, &clean_problems());
        let candidates_b = generate(ContentType::Speech, &clean_problems());
        let lra_a = candidates_a.iter().find(|c| c.id == "balanced").unwrap().filter_chain.clone();
        let lra_b = candidates_b.iter().find(|c| c.id == "balanced").unwrap().filter_chain.clone();
        assert!(lra_a.contains(&format!("LRA={TARGET_LRA}")));
        assert_eq!(lra_a, lra_b);
    }
}
