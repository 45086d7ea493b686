// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The on-disk `BlockStore`: three files per block under a hierarchical
//! `blockchain/` directory, laid out exactly as `covenant::store`'s path
//! helpers compute it.

use std::path::PathBuf;

use covenant::error::{Error, Result};
use covenant::store::{block_relpath, BlockStore, EXT_BLOCK, EXT_BLOCKREF, EXT_SIG};

#[derive(Clone, Debug)]
pub struct FsBlockStore {
    rootdir: PathBuf,
}

impl FsBlockStore {
    pub fn new(rootdir: PathBuf) -> Self { FsBlockStore { rootdir } }

    fn path(&self, idx: u64, ext: &str) -> PathBuf { self.rootdir.join(block_relpath(idx, ext)) }

    /// Recursively collects every block index with a present `.json` file,
    /// unsorted. A `.ref.json` file also ends in `.json`, so it's excluded
    /// explicitly rather than matched by suffix alone.
    fn collect_indices(&self) -> Result<Vec<u64>> {
        let blockchain_dir = self.rootdir.join("blockchain");
        if !blockchain_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut indices = Vec::new();
        let mut stack = vec![blockchain_dir];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
                if !name.ends_with(EXT_BLOCK) || name.ends_with(EXT_BLOCKREF) {
                    continue;
                }
                let stem = &name[..name.len() - EXT_BLOCK.len()];
                let idx = u64::from_str_radix(stem, 16)
                    .map_err(|_| Error::LayoutCorruption(u64::MAX))?;
                if self.path(idx, EXT_BLOCK) != path {
                    return Err(Error::LayoutCorruption(idx));
                }
                indices.push(idx);
            }
        }
        Ok(indices)
    }
}

impl BlockStore for FsBlockStore {
    fn write_block(&self, idx: u64, block_bytes: &[u8], blockref_bytes: &[u8], sig_bytes: &[u8]) -> Result<()> {
        let block_path = self.path(idx, EXT_BLOCK);
        if let Some(parent) = block_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&block_path, block_bytes)?;
        std::fs::write(self.path(idx, EXT_BLOCKREF), blockref_bytes)?;
        std::fs::write(self.path(idx, EXT_SIG), sig_bytes)?;
        Ok(())
    }

    fn read_block_bytes(&self, idx: u64) -> Result<Vec<u8>> { Ok(std::fs::read(self.path(idx, EXT_BLOCK))?) }

    fn read_blockref_bytes(&self, idx: u64) -> Result<Vec<u8>> { Ok(std::fs::read(self.path(idx, EXT_BLOCKREF))?) }

    fn read_sig_bytes(&self, idx: u64) -> Result<Vec<u8>> { Ok(std::fs::read(self.path(idx, EXT_SIG))?) }

    fn block_count(&self) -> Result<u64> {
        let mut indices = self.collect_indices()?;
        indices.sort_unstable();
        for (expected, actual) in indices.iter().enumerate() {
            if expected as u64 != *actual {
                return Err(Error::LayoutCorruption(*actual));
            }
        }
        Ok(indices.len() as u64)
    }

    fn most_recent(&self) -> Result<Option<u64>> {
        let count = self.block_count()?;
        Ok(if count == 0 { None } else { Some(count - 1) })
    }
}
