//! Candidate processing chain configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggressiveness {
    Conservative,
    Balanced,
    Aggressive,
}

/// One end-to-end processing configuration evaluated against a single input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingCandidate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub aggressiveness: Aggressiveness,
    /// Opaque filter-chain string accepted by the media toolchain.
    pub filter_chain: String,
    pub filters_applied: Vec<String>,
    pub target_lufs: f64,
    pub target_true_peak: f64,
}
