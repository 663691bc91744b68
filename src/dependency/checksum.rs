//! Artifact checksums
//!
//! Checksums are written as `<algorithm>:<hex>`; a bare hex string is
//! taken to be SHA-256.

use crate::error::{RustupLayersError, RustupLayersResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Sha512 => write!(f, "sha512"),
        }
    }
}

/// A declared artifact digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex digest
    pub value: String,
}

impl Checksum {
    /// Parse `<algorithm>:<hex>` or bare SHA-256 hex
    pub fn parse(raw: &str) -> RustupLayersResult<Self> {
        let raw = raw.trim();
        let (algorithm, value) = match raw.split_once(':') {
            Some((name, value)) => {
                let algorithm =
                    ChecksumAlgorithm::parse(name).ok_or_else(|| RustupLayersError::InvalidChecksum {
                        checksum: raw.to_string(),
                        reason: format!("unsupported algorithm '{}'", name),
                    })?;
                (algorithm, value)
            }
            None => (ChecksumAlgorithm::Sha256, raw),
        };

        let value = value.to_ascii_lowercase();
        if value.len() != algorithm.hex_len() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RustupLayersError::InvalidChecksum {
                checksum: raw.to_string(),
                reason: format!("expected {} hex digits for {}", algorithm.hex_len(), algorithm),
            });
        }

        Ok(Self { algorithm, value })
    }

    /// Digest a byte stream with this checksum's algorithm
    pub fn digest_reader(algorithm: ChecksumAlgorithm, reader: &mut dyn Read) -> std::io::Result<String> {
        let mut buf = [0u8; 64 * 1024];
        match algorithm {
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
            ChecksumAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
        }
    }

    /// Digest a file on disk with this checksum's algorithm
    pub fn digest_file(&self, path: &Path) -> RustupLayersResult<String> {
        let mut file = std::fs::File::open(path)
            .map_err(|e| RustupLayersError::io(format!("opening {}", path.display()), e))?;
        Self::digest_reader(self.algorithm, &mut file)
            .map_err(|e| RustupLayersError::io(format!("hashing {}", path.display()), e))
    }

    /// Whether the file at `path` hashes to this checksum
    pub fn matches_file(&self, path: &Path) -> RustupLayersResult<bool> {
        Ok(self.digest_file(path)? == self.value)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}
