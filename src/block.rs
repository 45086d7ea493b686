// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Canonical encode/decode of blocks and blockrefs. A blockref is the
//! minimal evidence that an owner committed to a block's contents: small
//! enough to copy alongside a detached signature as a self-contained
//! fork-proof, without exposing the (possibly sensitive) block body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{Error, Result};
use crate::fileref::FileRef;
use crate::fpr::Fingerprint;
use crate::hash::{hash_bytes, Digest};
use crate::magic::{BLOCKREF_MAGIC, BLOCK_MAGIC, VERSION};

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Owner {
    pub gpg: Fingerprint,
}

/// One signed commitment of an action list.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Block {
    pub pyom_version: u32,
    pub pyom_block_magic: String,
    pub idx: u64,
    pub owner: Owner,
    pub prev: FileRef,
    pub timestamp: DateTime<Utc>,
    pub actions: Vec<Action>,
}

impl Block {
    pub fn check_magic(&self) -> Result<()> {
        if self.pyom_block_magic != BLOCK_MAGIC {
            return Err(Error::Schema(format!("bad block magic: {}", self.pyom_block_magic)));
        }
        if self.pyom_version != VERSION {
            return Err(Error::Schema(format!("bad block version: {}", self.pyom_version)));
        }
        Ok(())
    }
}

/// A digest record over a block; the unit that gets gpg-signed.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct BlockRef {
    pub pyom_version: u32,
    pub pyom_blockref_magic: String,
    pub gpg: Fingerprint,
    pub idx: u64,
    #[serde(rename = "SHA-512")]
    pub sha512: Digest,
}

impl BlockRef {
    pub fn new(gpg: Fingerprint, idx: u64, sha512: Digest) -> Self {
        BlockRef { pyom_version: VERSION, pyom_blockref_magic: BLOCKREF_MAGIC.to_owned(), gpg, idx, sha512 }
    }

    /// Validates the blockref against the fingerprint the signature verified
    /// under. `SchemaError` covers both a wrong field count (guaranteed by
    /// our struct's closed field set) and malformed individual fields.
    pub fn check(&self, fpr: &Fingerprint) -> Result<()> {
        if self.pyom_blockref_magic != BLOCKREF_MAGIC {
            return Err(Error::Schema(format!("bad blockref magic: {}", self.pyom_blockref_magic)));
        }
        if self.pyom_version != VERSION {
            return Err(Error::Schema(format!("bad blockref version: {}", self.pyom_version)));
        }
        if &self.gpg != fpr {
            return Err(Error::FprMismatch { declared: fpr.clone(), imported: self.gpg.clone() });
        }
        Ok(())
    }
}

/// Canonical encoding: UTF-8, two-space indentation, fields in declared
/// order, no trailing newline. Digests are computed over exactly these
/// bytes, so this function must never change behavior for types already in
/// use on disk.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

pub fn from_canonical_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn digest_of(bytes: &[u8]) -> Digest { hash_bytes(bytes) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockref_roundtrips_byte_for_byte() {
        let blockref = BlockRef::new(Fingerprint::new("FPR"), 3, digest_of(b"block-bytes"));
        let encoded = to_canonical_json(&blockref).unwrap();
        let decoded: BlockRef = from_canonical_json(&encoded).unwrap();
        let reencoded = to_canonical_json(&decoded).unwrap();
        assert_eq!(encoded, reencoded);
    }

    #[test]
    fn rejects_fpr_mismatch() {
        let blockref = BlockRef::new(Fingerprint::new("FPR-A"), 0, digest_of(b"x"));
        let err = blockref.check(&Fingerprint::new("FPR-B")).unwrap_err();
        assert!(matches!(err, Error::FprMismatch { .. }));
    }
}
