use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key derivation algorithm recorded in the file header.
///
/// A closed set: the header's algorithm field selects one of these and the
/// engine dispatches with a `match`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256,
    #[serde(rename = "scrypt")]
    Scrypt,
    #[default]
    #[serde(rename = "argon2id")]
    Argon2id,
    /// PBKDF2 + scrypt + Argon2id folded through HMAC-SHA256.
    #[serde(rename = "combined")]
    Combined,
}

impl KdfAlgorithm {
    pub const ALL: [KdfAlgorithm; 4] = [
        KdfAlgorithm::Pbkdf2Sha256,
        KdfAlgorithm::Scrypt,
        KdfAlgorithm::Argon2id,
        KdfAlgorithm::Combined,
    ];

    /// ASCII identifier written into the 16-byte header field.
    pub fn header_id(self) -> &'static str {
        match self {
            KdfAlgorithm::Pbkdf2Sha256 => "PBKDF2-SHA256",
            KdfAlgorithm::Scrypt => "SCRYPT",
            KdfAlgorithm::Argon2id => "ARGON2ID",
            KdfAlgorithm::Combined => "COMBINED",
        }
    }

    /// Inverse of [`header_id`](Self::header_id). Exact match only.
    pub fn from_header_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.header_id() == id)
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_id())
    }
}

impl FromStr for KdfAlgorithm {
    type Err = String;

    /// Accepts both the header form (`ARGON2ID`) and the config form (`argon2id`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pbkdf2-sha256" | "pbkdf2" => Ok(KdfAlgorithm::Pbkdf2Sha256),
            "scrypt" => Ok(KdfAlgorithm::Scrypt),
            "argon2id" | "argon2" => Ok(KdfAlgorithm::Argon2id),
            "combined" => Ok(KdfAlgorithm::Combined),
            other => Err(format!("unknown KDF algorithm: {other}")),
        }
    }
}
