// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! `FsChain`: the one concrete chain handle the CLI deals with, bundling a
//! rootdir with its `FsBlockStore`, `GpgSigner` and `GitVcs`.

use std::path::{Path, PathBuf};

use covenant::bootstrap::{self, SmartContractSeed};
use covenant::fpr::Fingerprint;
use covenant::signer::Signer;
use covenant::verifier::Verifier;

use crate::config::Config;
use crate::error::{Error as FsError, Result as FsResult};
use crate::git::GitVcs;
use crate::gpg::GpgSigner;
use crate::store::FsBlockStore;

pub type FsVerifier = Verifier<FsBlockStore, GpgSigner, GitVcs>;

const GNUPG_DIRNAME: &str = "gnupg";

/// Imports `key_bytes` under a placeholder signer identity and rebuilds a
/// `GpgSigner` around the fingerprint gpg reports. `gnupg_home` persists
/// across process runs as part of the chain's on-disk state, so a secret key
/// imported here by [`create`] is still present the next time [`open`]
/// re-imports the (by-then public-only) `public.key` into the same
/// directory - the import is idempotent and never evicts a secret key gpg
/// already holds for that fingerprint.
fn build_signer(gnupg_home: &Path, config: &Config, key_bytes: &[u8]) -> FsResult<(GpgSigner, Fingerprint)> {
    std::fs::create_dir_all(gnupg_home)?;
    let bootstrap_signer = GpgSigner::new(
        gnupg_home.to_path_buf(),
        config.gpg_binary.clone(),
        config.git_binary.clone(),
        Fingerprint::new(""),
    );
    let fpr = bootstrap_signer.import_key(key_bytes).map_err(fs_err)?;
    let signer = GpgSigner::new(gnupg_home.to_path_buf(), config.gpg_binary.clone(), config.git_binary.clone(), fpr.clone());
    Ok((signer, fpr))
}

/// Opens an already-initialized chain at `rootdir` and replays it fully.
pub fn open(rootdir: &Path) -> FsResult<FsVerifier> {
    tracing::debug!(rootdir = %rootdir.display(), "opening chain for full replay");
    let config = Config::load(rootdir)?;
    let gnupg_home = rootdir.join(GNUPG_DIRNAME);
    let pubkey_bytes = std::fs::read(rootdir.join("public.key"))?;
    let (signer, fpr) = build_signer(&gnupg_home, &config, &pubkey_bytes)?;
    let store = FsBlockStore::new(rootdir.to_path_buf());
    let vcs = GitVcs::new(config.git_binary);
    let mut verifier = Verifier::new(rootdir.to_path_buf(), store, signer, vcs).map_err(fs_err)?;
    verifier.replay_all().map_err(fs_err)?;
    tracing::debug!(%fpr, next_idx = verifier.next_idx, "chain replayed");
    Ok(verifier)
}

/// Opens a chain at `rootdir` without replaying it - used for a dependency
/// peer, which the caller only wants to replay as far as a specific
/// reachable block.
pub fn open_lazy(rootdir: &Path) -> FsResult<FsVerifier> {
    tracing::debug!(rootdir = %rootdir.display(), "opening chain without replay");
    let config = Config::load(rootdir)?;
    let gnupg_home = rootdir.join(GNUPG_DIRNAME);
    let pubkey_bytes = std::fs::read(rootdir.join("public.key"))?;
    let (signer, _fpr) = build_signer(&gnupg_home, &config, &pubkey_bytes)?;
    let store = FsBlockStore::new(rootdir.to_path_buf());
    let vcs = GitVcs::new(config.git_binary);
    Verifier::new(rootdir.to_path_buf(), store, signer, vcs).map_err(fs_err)
}

/// Creates a brand new chain at `rootdir`: `git init`, `public.key`,
/// `gnupg/`, block 0, and optionally `add_smart_contract` for a
/// self-referential checkout. `owner_key_bytes` is a full secret-key export
/// (e.g. `gpg --export-secret-keys`) - it is imported into the chain's own
/// `gnupg/` directory so the chain can sign its own future blocks without
/// depending on the operator's personal keyring, and only its public half is
/// ever written to `public.key` or handed to another chain.
pub fn create(rootdir: PathBuf, owner_key_bytes: &[u8], smart_contract: Option<SmartContractSeed>) -> FsResult<FsVerifier> {
    tracing::debug!(rootdir = %rootdir.display(), "creating new chain");
    let config = Config::load(&rootdir)?;
    std::fs::create_dir_all(&rootdir)?;
    let gnupg_home = rootdir.join(GNUPG_DIRNAME);
    let (signer, fpr) = build_signer(&gnupg_home, &config, owner_key_bytes)?;
    let pubkey_bytes = signer.export_public(&fpr).map_err(fs_err)?;
    let store = FsBlockStore::new(rootdir.clone());
    let vcs = GitVcs::new(config.git_binary);
    let verifier = bootstrap::initialize_blockchain(rootdir, store, signer, vcs, &pubkey_bytes, smart_contract).map_err(fs_err)?;
    tracing::debug!(%fpr, "chain created");
    Ok(verifier)
}

fn fs_err(e: covenant::error::Error) -> FsError { FsError::Io(std::io::Error::other(e.to_string())) }

pub fn smart_contracts_root(rootdir: &Path) -> PathBuf { bootstrap::smart_contracts_root(rootdir) }
