// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The version-control capability backing `verify_signed_tag` and chain
//! bootstrap. Like `Signer`, this is an injected capability so the
//! interpreter never shells out directly.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

pub trait Vcs {
    /// The current commit id of the repository at `dir`, as a hex string.
    fn current_commit(&self, dir: &Path) -> Result<String>;

    /// Configured remote name -> URL map for the repository at `dir`.
    fn remote_urls(&self, dir: &Path) -> Result<BTreeMap<String, String>>;

    /// Initializes an empty repository at `dir`.
    fn init(&self, dir: &Path) -> Result<()>;
}
