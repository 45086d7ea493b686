// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Content addressing. Every fileref, block and blockref digest in the
//! system is a SHA-512 hash rendered as lowercase hex.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha512};
use serde::{Deserialize, Serialize};

/// A SHA-512 digest, displayed and (de)serialized as 128 lowercase hex
/// characters.
#[derive(Wrapper, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From)]
#[wrapper(Deref)]
pub struct Digest([u8; 64]);

impl Digest {
    pub fn from_bytes(bytes: [u8; 64]) -> Self { Digest(bytes) }

    pub fn as_bytes(&self) -> &[u8; 64] { &self.0 }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", hex::encode(self.0)) }
}

#[derive(Clone, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum DigestParseError {
    /// digest must be exactly 128 hex characters, got {0}
    WrongLength(usize),

    /// digest is not valid hex - {0}
    #[from]
    InvalidHex(hex::FromHexError),
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 128 {
            return Err(DigestParseError::WrongLength(s.len()));
        }
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Digest(arr))
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: serde::Serializer {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: serde::Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        Digest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Hashes `bytes` with SHA-512.
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut arr = [0u8; 64];
    arr.copy_from_slice(&out);
    Digest(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_roundtrips_through_display_and_fromstr() {
        let digest = hash_bytes(b"covenant");
        let s = digest.to_string();
        assert_eq!(s.len(), 128);
        let parsed: Digest = s.parse().unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(Digest::from_str("abcd"), Err(DigestParseError::WrongLength(4))));
    }

    #[test]
    fn distinct_inputs_hash_differently() {
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }
}
