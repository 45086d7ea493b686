// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The block store capability: lays out a chain's blocks on disk (or
//! wherever the implementation chooses) under a deterministic scheme and
//! lets the Verifier enumerate them in order without an index file.

use crate::block::{Block, BlockRef};
use crate::error::Result;

pub const EXT_BLOCK: &str = ".json";
pub const EXT_BLOCKREF: &str = ".ref.json";
pub const EXT_SIG: &str = ".ref.json.sig";

/// Splits a 16-hex-digit block index into nested two-digit directory
/// segments: `"0000000000000abc"` -> `"00/00/00/00/00/00/0a/bc"`. Pure,
/// deterministic, no I/O - the bounded fan-out that lets the store avoid an
/// index file.
pub fn folder_for_filename(filename: &str) -> String {
    if filename.len() <= 4 {
        filename[0..2].to_owned()
    } else {
        format!("{}/{}", &filename[0..2], folder_for_filename(&filename[2..]))
    }
}

pub fn block_idx_hex(idx: u64) -> String { format!("{idx:016x}") }

pub fn block_relpath(idx: u64, ext: &str) -> String {
    let hex = block_idx_hex(idx);
    format!("blockchain/{}/{}{}", folder_for_filename(&hex), hex, ext)
}

/// Persists and retrieves the three files (`.json`, `.ref.json`,
/// `.ref.json.sig`) that make up one block, plus raw bytes for canonical
/// digest computation.
pub trait BlockStore {
    fn write_block(&self, idx: u64, block_bytes: &[u8], blockref_bytes: &[u8], sig_bytes: &[u8]) -> Result<()>;

    fn read_block_bytes(&self, idx: u64) -> Result<Vec<u8>>;
    fn read_blockref_bytes(&self, idx: u64) -> Result<Vec<u8>>;
    fn read_sig_bytes(&self, idx: u64) -> Result<Vec<u8>>;

    fn read_block(&self, idx: u64) -> Result<Block> {
        crate::block::from_canonical_json(&self.read_block_bytes(idx)?)
    }

    fn read_blockref(&self, idx: u64) -> Result<BlockRef> {
        crate::block::from_canonical_json(&self.read_blockref_bytes(idx)?)
    }

    /// Number of contiguous blocks present, verifying the on-disk layout is
    /// exactly `{0, 1, ..., n-1}` with no gaps or strays. Fails with
    /// `LayoutCorruption` otherwise.
    fn block_count(&self) -> Result<u64>;

    /// Highest populated block index, or `None` if the store is empty.
    fn most_recent(&self) -> Result<Option<u64>>;
}
