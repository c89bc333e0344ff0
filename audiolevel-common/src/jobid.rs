//! Opaque job identifiers
//!
//! A JobId is a 12-character URL-safe token drawn from a CSPRNG, not a
//! sequential counter or a UUID — the format is deliberately shorter and
//! friendlier in a download URL while still carrying enough entropy
//! (~71 bits) that guessing one is infeasible.

use rand::Rng;
use std::fmt;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const LEN: usize = 12;

/// Opaque job identifier, unique across the lifetime of stored jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new JobId from a cryptographic RNG.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let token: String = (0..LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(token)
    }

    /// Parse a JobId from a user-supplied string, validating its shape.
    ///
    /// Matches `^[A-Za-z0-9_-]{12}$`; does not check that the job exists.
    pub fn parse(s: &str) -> Result<Self, InvalidJobId> {
        if s.len() != LEN || !s.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(InvalidJobId);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The supplied string does not match the JobId shape `^[A-Za-z0-9_-]{12}$`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid job id")]
pub struct InvalidJobId;
