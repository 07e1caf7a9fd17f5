use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A SHA-256 digest of a content row's extracted text.
///
/// Stored as a 64-character lowercase hex string and used to detect
/// re-ingestion of identical material.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

/// Error when parsing an invalid hash string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidHash(String);

impl fmt::Display for InvalidHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid content hash: {}", self.0)
    }
}

impl std::error::Error for InvalidHash {}

impl ContentHash {
    /// Compute the SHA-256 hash of the given text.
    pub fn compute(text: &str) -> Self {
        let hash = Sha256::digest(text.as_bytes());
        Self(hash.into())
    }

    /// Construct from raw SHA-256 bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded content hash string.
    pub fn from_hex(s: &str) -> Result<Self, InvalidHash> {
        if s.len() != 64 {
            return Err(InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }

        let bytes = hex::decode(s).map_err(|e| InvalidHash(format!("invalid hex: {e}")))?;

        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidHash("decoded to wrong length".into()))?;

        Ok(Self(arr))
    }

    /// Return the hash as a 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Return the raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
