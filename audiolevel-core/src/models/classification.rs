//! Content-type classification and the signals behind a decision.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Speech,
    Music,
    PodcastMixed,
    Unknown,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentType::Speech => "speech",
            ContentType::Music => "music",
            ContentType::PodcastMixed => "podcast_mixed",
            ContentType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One heuristic's vote toward a content type, kept for explainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub value: f64,
    pub points_toward: ContentType,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentClassification {
    pub content_type: ContentType,
    pub confidence: f64,
    pub signals: Vec<Signal>,
}
