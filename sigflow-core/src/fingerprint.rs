//! Configuration fingerprinting.
//!
//! A `ConfigFingerprint` is the BLAKE3 hash of the canonical JSON form of an
//! `EngineConfig`. Two scan reports carrying the same fingerprint were
//! produced by the same detector population with the same parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigFingerprint(pub String);

impl ConfigFingerprint {
    /// Hash arbitrary bytes. Uses BLAKE3 for hashes that are stable across
    /// builds and platforms.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex characters, for log lines and tables.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
