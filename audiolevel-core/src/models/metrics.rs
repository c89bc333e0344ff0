//! Immutable measurement snapshot produced by the Analysis Probe.

use serde::{Deserialize, Serialize};

/// A single analysis pass over an audio file. All fields are best-effort:
/// any field the Probe could not extract from tool output falls back to a
/// documented default rather than failing the job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub duration_secs: f64,

    pub integrated_loudness_lufs: f64,
    pub loudness_range_lu: f64,
    pub true_peak_dbtp: f64,

    pub rms_db: f64,
    pub peak_db: f64,
    pub crest_factor_db: f64,
    pub flat_factor: f64,
    pub peak_sample_count: u32,

    pub silence_ratio: f64,
    pub leading_silence_secs: f64,
    pub trailing_silence_secs: f64,

    pub spectral_centroid_hz: f64,
    pub spectral_flatness: f64,
    pub energy_low: f64,
    pub energy_mid: f64,
    pub energy_high: f64,
    pub energy_very_high: f64,

    pub dc_offset: f64,
    pub stereo_balance_db: f64,
}

/// Documented fallback values used whenever the Probe cannot parse a field
/// out of the media toolchain's textual output.
pub mod defaults {
    pub const CHANNELS: u16 = 2;
    pub const SAMPLE_RATE: u32 = 44_100;
    pub const BIT_DEPTH: u16 = 16;
    pub const DURATION_SECS: f64 = 0.0;

    pub const INTEGRATED_LOUDNESS_LUFS: f64 = -23.0;
    pub const LOUDNESS_RANGE_LU: f64 = 7.0;
    pub const TRUE_PEAK_DBTP: f64 = -1.0;

    pub const RMS_DB: f64 = -20.0;
    pub const PEAK_DB: f64 = -1.0;
    pub const CREST_FACTOR_DB: f64 = 12.0;
    pub const FLAT_FACTOR: f64 = 0.0;
    pub const PEAK_SAMPLE_COUNT: u32 = 0;

    pub const SILENCE_RATIO: f64 = 0.0;
    pub const LEADING_SILENCE_SECS: f64 = 0.0;
    pub const TRAILING_SILENCE_SECS: f64 = 0.0;

    pub const SPECTRAL_CENTROID_HZ: f64 = 2_000.0;
    pub const SPECTRAL_FLATNESS: f64 = 0.3;
    pub const ENERGY_LOW: f64 = 0.25;
    pub const ENERGY_MID: f64 = 0.5;
    pub const ENERGY_HIGH: f64 = 0.2;
    pub const ENERGY_VERY_HIGH: f64 = 0.05;

    pub const DC_OFFSET: f64 = 0.0;
    pub const STEREO_BALANCE_DB: f64 = 0.0;
}

impl Default for AnalysisMetrics {
    fn default() -> Self {
        use defaults::*;
        Self {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bit_depth: BIT_DEPTH,
            duration_secs: DURATION_SECS,
            integrated_loudness_lufs: INTEGRATED_LOUDNESS_LUFS,
            loudness_range_lu: LOUDNESS_RANGE_LU,
            true_peak_dbtp: TRUE_PEAK_DBTP,
            rms_db: RMS_DB,
            peak_db: PEAK_DB,
            crest_factor_db: CREST_FACTOR_DB,
            flat_factor: FLAT_FACTOR,
            peak_sample_count: PEAK_SAMPLE_COUNT,
            silence_ratio: SILENCE_RATIO,
            leading_silence_secs: LEADING_SILENCE_SECS,
            trailing_silence_secs: TRAILING_SILENCE_SECS,
            spectral_centroid_hz: SPECTRAL_CENTROID_HZ,
            spectral_flatness: SPECTRAL_FLATNESS,
            energy_low: ENERGY_LOW,
            energy_mid: ENERGY_MID,
            energy_high: ENERGY_HIGH,
            energy_very_high: ENERGY_VERY_HIGH,
            dc_offset: DC_OFFSET,
            stereo_balance_db: STEREO_BALANCE_DB,
        }
    }
}
