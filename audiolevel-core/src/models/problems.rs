//! Detected audio defects and their severity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn at_least_moderate(&self) -> bool {
        matches!(self, Severity::Moderate | Severity::Severe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    Clipping,
    NoiseFloor,
    DcOffset,
    LowLoudness,
    ExcessiveDynamicRange,
    Sibilance,
    Muddiness,
    StereoImbalance,
    SilencePadding,
}

impl ProblemKind {
    pub const ALL: [ProblemKind; 9] = [
        ProblemKind::Clipping,
        ProblemKind::NoiseFloor,
        ProblemKind::DcOffset,
        ProblemKind::LowLoudness,
        ProblemKind::ExcessiveDynamicRange,
        ProblemKind::Sibilance,
        ProblemKind::Muddiness,
        ProblemKind::StereoImbalance,
        ProblemKind::SilencePadding,
    ];
}

/// One defect entry: whether it was detected, how severe, and the metric
/// value that triggered the decision (for display/debugging).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProblemEntry {
    pub detected: bool,
    pub severity: Severity,
    pub metric: f64,
}

impl ProblemEntry {
    pub fn clear() -> Self {
        Self { detected: false, severity: Severity::None, metric: 0.0 }
    }
}

/// Fixed record with one entry per defect kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioProblems {
    pub clipping: ProblemEntry,
    pub noise_floor: ProblemEntry,
    pub dc_offset: ProblemEntry,
    pub low_loudness: ProblemEntry,
    pub excessive_dynamic_range: ProblemEntry,
    pub sibilance: ProblemEntry,
    pub muddiness: ProblemEntry,
    pub stereo_imbalance: ProblemEntry,
    pub silence_padding: ProblemEntry,
}

impl Default for AudioProblems {
    fn default() -> Self {
        Self {
            clipping: ProblemEntry::clear(),
            noise_floor: ProblemEntry::clear(),
            dc_offset: ProblemEntry::clear(),
            low_loudness: ProblemEntry::clear(),
            excessive_dynamic_range: ProblemEntry::clear(),
            sibilance: ProblemEntry::clear(),
            muddiness: ProblemEntry::clear(),
            stereo_imbalance: ProblemEntry::clear(),
            silence_padding: ProblemEntry::clear(),
        }
    }
}

impl AudioProblems {
    pub fn get(&self, kind: ProblemKind) -> ProblemEntry {
        match kind {
            ProblemKind::Clipping => self.clipping,
            ProblemKind::NoiseFloor => self.noise_floor,
            ProblemKind::DcOffset => self.dc_offset,
            ProblemKind::LowLoudness => self.low_loudness,
            ProblemKind::ExcessiveDynamicRange => self.excessive_dynamic_range,
            ProblemKind::Sibilance => self.sibilance,
            ProblemKind::Muddiness => self.muddiness,
            ProblemKind::StereoImbalance => self.stereo_imbalance,
            ProblemKind::SilencePadding => self.silence_padding,
        }
    }

    /// True if any detected problem reaches at least `moderate` severity —
    /// this is the trigger condition for the Candidate Generator's
    /// Aggressive candidate.
    pub fn any_at_least_moderate(&self) -> bool {
        ProblemKind::ALL
            .iter()
            .any(|&k| self.get(k).detected && self.get(k).severity.at_least_moderate())
    }
}
