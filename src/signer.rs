// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The signing capability. Covenant never talks to an OpenPGP
//! implementation directly - every block of code in this crate that needs a
//! signature goes through this trait, so tests can substitute an in-memory
//! double and no subprocess call leaks outside the boundary.

use crate::error::Result;
use crate::fpr::Fingerprint;

pub trait Signer {
    /// Detached-signs `bytes` under the signer's own identity, returning the
    /// signature bytes.
    fn sign_detached(&self, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Verifies a detached signature, returning the fingerprint it verified
    /// under. `SignatureInvalid` if it doesn't verify under any known key.
    fn verify_detached(&self, bytes: &[u8], sig: &[u8]) -> Result<Fingerprint>;

    /// Imports a public key, returning its fingerprint.
    fn import_key(&self, key_bytes: &[u8]) -> Result<Fingerprint>;

    /// Fingerprints of every signer whose signature over a tag pointing at
    /// `commit_id` in `repo_dir` verifies.
    fn list_signed_tags(&self, repo_dir: &std::path::Path, commit_id: &str) -> Result<Vec<Fingerprint>>;
}
