// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Deterministic, subprocess-free doubles for [`crate::signer::Signer`],
//! [`crate::vcs::Vcs`] and [`crate::store::BlockStore`]. Gated behind the
//! `test-util` feature so the core crate never pulls this into a release
//! build.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fpr::Fingerprint;
use crate::hash::hash_bytes;
use crate::signer::Signer;
use crate::store::BlockStore;
use crate::vcs::Vcs;

/// A signer that "signs" by concatenating an identity tag with the message
/// digest, and verifies by checking the tag is a known identity. No real
/// cryptography; deterministic and side-effect free.
#[derive(Debug)]
pub struct FakeSigner {
    known: RefCell<BTreeMap<Fingerprint, Vec<u8>>>,
    signed_tags: RefCell<BTreeMap<(PathBuf, String), Vec<Fingerprint>>>,
}

impl FakeSigner {
    pub fn new() -> Self { FakeSigner { known: RefCell::new(BTreeMap::new()), signed_tags: RefCell::new(BTreeMap::new()) } }

    /// Registers a new identity with public key material `name` and returns
    /// its fingerprint (derived deterministically from the key bytes).
    pub fn generate_identity(&self, name: &str) -> Fingerprint {
        let fpr = Fingerprint::new(format!("fpr:{name}"));
        self.known.borrow_mut().insert(fpr.clone(), name.as_bytes().to_vec());
        fpr
    }

    /// Marks `fpr` as having a signed tag at `commit_id` in `repo_dir`, for
    /// `verify_signed_tag`/contract-author tests.
    pub fn stage_signed_tag(&self, repo_dir: &Path, commit_id: &str, fpr: Fingerprint) {
        self.signed_tags
            .borrow_mut()
            .entry((repo_dir.to_path_buf(), commit_id.to_owned()))
            .or_default()
            .push(fpr);
    }
}

impl Default for FakeSigner {
    fn default() -> Self { Self::new() }
}

fn fake_sig(fpr: &Fingerprint, bytes: &[u8]) -> Vec<u8> {
    let digest = hash_bytes(bytes);
    format!("{fpr}:{digest}").into_bytes()
}

impl Signer for FakeSigner {
    fn sign_detached(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let known = self.known.borrow();
        let fpr = known.keys().next().ok_or(Error::SignatureInvalid)?;
        Ok(fake_sig(fpr, bytes))
    }

    fn verify_detached(&self, bytes: &[u8], sig: &[u8]) -> Result<Fingerprint> {
        let sig_str = std::str::from_utf8(sig).map_err(|_| Error::SignatureInvalid)?;
        let (fpr_part, digest_part) = sig_str.rsplit_once(':').ok_or(Error::SignatureInvalid)?;
        let fpr = Fingerprint::new(fpr_part);
        if !self.known.borrow().contains_key(&fpr) {
            return Err(Error::SignatureInvalid);
        }
        if digest_part != hash_bytes(bytes).to_string() {
            return Err(Error::SignatureInvalid);
        }
        Ok(fpr)
    }

    fn import_key(&self, key_bytes: &[u8]) -> Result<Fingerprint> {
        let fpr = Fingerprint::new(format!("fpr:{}", String::from_utf8_lossy(key_bytes)));
        self.known.borrow_mut().insert(fpr.clone(), key_bytes.to_vec());
        Ok(fpr)
    }

    fn list_signed_tags(&self, repo_dir: &Path, commit_id: &str) -> Result<Vec<Fingerprint>> {
        Ok(self
            .signed_tags
            .borrow()
            .get(&(repo_dir.to_path_buf(), commit_id.to_owned()))
            .cloned()
            .unwrap_or_default())
    }
}

/// A VCS double backed by an in-memory map from directory to current commit
/// and remotes, staged explicitly by the test.
#[derive(Default, Debug)]
pub struct FakeVcs {
    commits: RefCell<BTreeMap<PathBuf, String>>,
    remotes: RefCell<BTreeMap<PathBuf, BTreeMap<String, String>>>,
}

impl FakeVcs {
    pub fn new() -> Self { Self::default() }

    pub fn stage_commit(&self, dir: &Path, commit_id: &str) {
        self.commits.borrow_mut().insert(dir.to_path_buf(), commit_id.to_owned());
    }
}

impl Vcs for FakeVcs {
    fn current_commit(&self, dir: &Path) -> Result<String> {
        self.commits.borrow().get(dir).cloned().ok_or_else(|| Error::NotFound(dir.display().to_string()))
    }

    fn remote_urls(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
        Ok(self.remotes.borrow().get(dir).cloned().unwrap_or_default())
    }

    fn init(&self, dir: &Path) -> Result<()> {
        self.commits.borrow_mut().insert(dir.to_path_buf(), "0".repeat(40));
        Ok(())
    }
}

/// An in-memory block store, for tests that exercise the interpreter
/// without touching the filesystem.
#[derive(Default)]
pub struct InMemoryStore {
    blocks: RefCell<BTreeMap<u64, (Vec<u8>, Vec<u8>, Vec<u8>)>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl BlockStore for InMemoryStore {
    fn write_block(&self, idx: u64, block_bytes: &[u8], blockref_bytes: &[u8], sig_bytes: &[u8]) -> Result<()> {
        self.blocks.borrow_mut().insert(idx, (block_bytes.to_vec(), blockref_bytes.to_vec(), sig_bytes.to_vec()));
        Ok(())
    }

    fn read_block_bytes(&self, idx: u64) -> Result<Vec<u8>> {
        self.blocks.borrow().get(&idx).map(|(b, _, _)| b.clone()).ok_or_else(|| Error::NotFound(format!("block {idx}")))
    }

    fn read_blockref_bytes(&self, idx: u64) -> Result<Vec<u8>> {
        self.blocks.borrow().get(&idx).map(|(_, r, _)| r.clone()).ok_or_else(|| Error::NotFound(format!("blockref {idx}")))
    }

    fn read_sig_bytes(&self, idx: u64) -> Result<Vec<u8>> {
        self.blocks.borrow().get(&idx).map(|(_, _, s)| s.clone()).ok_or_else(|| Error::NotFound(format!("sig {idx}")))
    }

    fn block_count(&self) -> Result<u64> { Ok(self.blocks.borrow().len() as u64) }

    fn most_recent(&self) -> Result<Option<u64>> { Ok(self.blocks.borrow().keys().next_back().copied()) }
}
