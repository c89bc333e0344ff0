//! Analysis Probe
//!
//! Orchestrates Runner invocations against the media toolchain's
//! loudness/peak/silence-detector filters and parses their textual output
//! into `AnalysisMetrics`. Every field is individually optional in the
//! source text; a missing field falls back to the documented default in
//! [`crate::models::metrics::defaults`] rather than failing the job.

use crate::models::metrics::defaults;
use crate::models::AnalysisMetrics;
use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    input_integrated: Regex,
    output_integrated: Regex,
    input_lra: Regex,
    output_lra: Regex,
    true_peak: Regex,
    rms: Regex,
    peak: Regex,
    sample_rate: Regex,
    channels: Regex,
    duration: Regex,
    silence_ratio: Regex,
    leading_silence: Regex,
    trailing_silence: Regex,
    spectral_centroid: Regex,
    spectral_flatness: Regex,
    dc_offset: Regex,
    stereo_balance: Regex,
    flat_factor: Regex,
    peak_count: Regex,
    energy_low: Regex,
    energy_mid: Regex,
    energy_high: Regex,
    energy_very_high: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        input_integrated: Regex::new(r"(?i)Input Integrated:\s*(-?\d+(?:\.\d+)?)\s*LUFS").unwrap(),
        output_integrated: Regex::new(r"(?i)Output Integrated:\s*(-?\d+(?:\.\d+)?)\s*LUFS").unwrap(),
        input_lra: Regex::new(r"(?i)Input LRA:\s*(-?\d+(?:\.\d+)?)\s*LU").unwrap(),
        output_lra: Regex::new(r"(?i)Output LRA:\s*(-?\d+(?:\.\d+)?)\s*LU").unwrap(),
        true_peak: Regex::new(r"(?i)True peak:\s*(-?\d+(?:\.\d+)?)\s*dBTP").unwrap(),
        rms: Regex::new(r"(?i)RMS level dB:\s*(-?\d+(?:\.\d+)?)").unwrap(),
        peak: Regex::new(r"(?i)Peak level dB:\s*(-?\d+(?:\.\d+)?)").unwrap(),
        sample_rate: Regex::new(r"(?i)(\d+)\s*Hz").unwrap(),
        channels: Regex::new(r"(?i)(mono|stereo|(\d+)\s*channels)").unwrap(),
        duration: Regex::new(r"(?i)Duration:\s*(\d+):(\d+):(\d+(?:\.\d+)?)").unwrap(),
        silence_ratio: Regex::new(r"(?i)silence_ratio:\s*(\d+(?:\.\d+)?)").unwrap(),
        leading_silence: Regex::new(r"(?i)silence_start:\s*(\d+(?:\.\d+)?)").unwrap(),
        trailing_silence: Regex::new(r"(?i)silence_end_offset:\s*(\d+(?:\.\d+)?)").unwrap(),
        spectral_centroid: Regex::new(r"(?i)spectral_centroid:\s*(\d+(?:\.\d+)?)").unwrap(),
        spectral_flatness: Regex::new(r"(?i)spectral_flatness:\s*(\d+(?:\.\d+)?)").unwrap(),
        dc_offset: Regex::new(r"(?i)DC offset:\s*(-?\d+(?:\.\d+)?)").unwrap(),
        stereo_balance: Regex::new(r"(?i)stereo_balance:\s*(-?\d+(?:\.\d+)?)").unwrap(),
        flat_factor: Regex::new(r"(?i)Flat factor:\s*(\d+(?:\.\d+)?)").unwrap(),
        peak_count: Regex::new(r"(?i)Peak count:\s*(\d+)").unwrap(),
        energy_low: Regex::new(r"(?i)energy_low:\s*(\d+(?:\.\d+)?)").unwrap(),
        energy_mid: Regex::new(r"(?i)energy_mid:\s*(\d+(?:\.\d+)?)").unwrap(),
        energy_high: Regex::new(r"(?i)energy_high:\s*(\d+(?:\.\d+)?)").unwrap(),
        energy_very_high: Regex::new(r"(?i)energy_very_high:\s*(\d+(?:\.\d+)?)").unwrap(),
    })
}

fn parse_f64(re: &Regex, text: &str, default: f64) -> f64 {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(default)
}

/// Parse a combined loudness/peak/silence-detector stats block into
/// `AnalysisMetrics`, degrading each missing field independently.
pub fn parse_metrics(stats_text: &str) -> AnalysisMetrics {
    let p = patterns();

    let integrated_loudness_lufs = if p.output_integrated.is_match(stats_text) {
        parse_f64(&p.output_integrated, stats_text, defaults::INTEGRATED_LOUDNESS_LUFS)
    } else {
        parse_f64(&p.input_integrated, stats_text, defaults::INTEGRATED_LOUDNESS_LUFS)
    };

    let loudness_range_lu = if p.output_lra.is_match(stats_text) {
        parse_f64(&p.output_lra, stats_text, defaults::LOUDNESS_RANGE_LU)
    } else {
        parse_f64(&p.input_lra, stats_text, defaults::LOUDNESS_RANGE_LU)
    };

    let channels = p
        .channels
        .captures(stats_text)
        .map(|c| {
            if c.get(1).map(|m| m.as_str().eq_ignore_ascii_case("mono")).unwrap_or(false) {
                1
            } else if c.get(1).map(|m| m.as_str().eq_ignore_ascii_case("stereo")).unwrap_or(false) {
                2
            } else {
                c.get(2)
                    .and_then(|m| m.as_str().parse::<u16>().ok())
                    .unwrap_or(defaults::CHANNELS)
            }
        })
        .unwrap_or(defaults::CHANNELS);

    let sample_rate = p
        .sample_rate
        .captures(stats_text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(defaults::SAMPLE_RATE);

    let duration_secs = p
        .duration
        .captures(stats_text)
        .and_then(|c| {
            let h: f64 = c.get(1)?.as_str().parse().ok()?;
            let m: f64 = c.get(2)?.as_str().parse().ok()?;
            let s: f64 = c.get(3)?.as_str().parse().ok()?;
            Some(h * 3600.0 + m * 60.0 + s)
        })
        .unwrap_or(defaults::DURATION_SECS);

    let peak_db = parse_f64(&p.peak, stats_text, defaults::PEAK_DB);
    let rms_db = parse_f64(&p.rms, stats_text, defaults::RMS_DB);
    let crest_factor_db = (peak_db - rms_db).abs();

    AnalysisMetrics {
        channels,
        sample_rate,
        bit_depth: defaults::BIT_DEPTH,
        duration_secs,
        integrated_loudness_lufs,
        loudness_range_lu,
        true_peak_dbtp: parse_f64(&p.true_peak, stats_text, defaults::TRUE_PEAK_DBTP),
        rms_db,
        peak_db,
        crest_factor_db,
        flat_factor: parse_f64(&p.flat_factor, stats_text, defaults::FLAT_FACTOR),
        peak_sample_count: p
            .peak_count
            .captures(stats_text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(defaults::PEAK_SAMPLE_COUNT),
        silence_ratio: parse_f64(&p.silence_ratio, stats_text, defaults::SILENCE_RATIO),
        leading_silence_secs: parse_f64(&p.leading_silence, stats_text, defaults::LEADING_SILENCE_SECS),
        trailing_silence_secs: parse_f64(&p.trailing_silence, stats_text, defaults::TRAILING_SILENCE_SECS),
        spectral_centroid_hz: parse_f64(&p.spectral_centroid, stats_text, defaults::SPECTRAL_CENTROID_HZ),
        spectral_flatness: parse_f64(&p.spectral_flatness, stats_text, defaults::SPECTRAL_FLATNESS),
        energy_low: parse_f64(&p.energy_low, stats_text, defaults::ENERGY_LOW),
        energy_mid: parse_f64(&p.energy_mid, stats_text, defaults::ENERGY_MID),
        energy_high: parse_f64(&p.energy_high, stats_text, defaults::ENERGY_HIGH),
        energy_very_high: parse_f64(&p.energy_very_high, stats_text, defaults::ENERGY_VERY_HIGH),
        dc_offset: parse_f64(&p.dc_offset, stats_text, defaults::DC_OFFSET),
        stereo_balance_db: parse_f64(&p.stereo_balance, stats_text, defaults::STEREO_BALANCE_DB),
    }
}

/// Lightweight summary used by the Evaluator to re-measure a scratch
/// artifact without paying for a full metrics parse.
pub struct LoudnessSummary {
    pub integrated_lufs: f64,
    pub loudness_range: f64,
    pub true_peak: f64,
}

pub fn parse_summary(stats_text: &str) -> LoudnessSummary {
    let m = parse_metrics(stats_text);
    LoudnessSummary {
        integrated_lufs: m.integrated_loudness_lufs,
        loudness_range: m.loudness_range_lu,
        true_peak: m.true_peak_dbtp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Input Integrated:   -20.1 LUFS
Input LRA:          11.3 LU
Output Integrated:  -16.0 LUFS
Output LRA:         10.5 LU
True peak:          -1.4 dBTP
RMS level dB: -18.2
Peak level dB: -3.1
Stream #0:0: Audio: pcm_s16le, 44100 Hz, stereo
Duration: 00:03:27.50
";

    #[test]
    fn parses_present_fields() {
        let m = parse_metrics(SAMPLE);
        assert_eq!(m.integrated_loudness_lufs, -16.0);
        assert_eq!(m.loudness_range_lu, 10.5);
        assert_eq!(m.true_peak_dbtp, -1.4);
        assert_eq!(m.channels, 2);
        assert_eq!(m.sample_rate, 44100);
        assert!((m.duration_secs - 207.5).abs() < 0.01);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let m = parse_metrics("garbage text with no recognizable fields");
        assert_eq!(m.integrated_loudness_lufs, defaults::INTEGRATED_LOUDNESS_LUFS);
        assert_eq!(m.channels, defaults::CHANNELS);
        assert_eq!(m.sample_rate, defaults::SAMPLE_RATE);
        assert_eq!(m.spectral_flatness, defaults::SPECTRAL_FLATNESS);
    }

    #[test]
    fn prefers_output_over_input_loudness() {
        let m = parse_metrics("Input Integrated: -23.0 LUFS\nOutput Integrated: -14.0 LUFS\n");
        assert_eq!(m.integrated_loudness_lufs, -14.0);
    }

    #[test]
    fn parses_astats_and_energy_band_fields_when_present() {
        let text = "\
Flat factor: 3.5
Peak count: 142
energy_low: 0.6
energy_mid: 0.3
energy_high: 0.08
energy_very_high: 0.02
";
        let m = parse_metrics(text);
        assert_eq!(m.flat_factor, 3.5);
        assert_eq!(m.peak_sample_count, 142);
        assert_eq!(m.energy_low, 0.6);
        assert_eq!(m.energy_mid, 0.3);
        assert_eq!(m.energy_high, 0.08);
        assert_eq!(m.energy_very_high, 0.02);
    }

    #[test]
    fn missing_astats_and_energy_band_fields_fall_back_to_defaults() {
        let m = parse_metrics("garbage text with no recognizable fields");
        assert_eq!(m.flat_factor, defaults::FLAT_FACTOR);
        assert_eq!(m.peak_sample_count, defaults::PEAK_SAMPLE_COUNT);
        assert_eq!(m.energy_low, defaults::ENERGY_LOW);
        assert_eq!(m.energy_very_high, defaults::ENERGY_VERY_HIGH);
    }
}
