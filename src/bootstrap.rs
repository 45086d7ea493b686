// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Chain bootstrap: turning an empty directory into block 0, and the
//! `add_smart_contract` ceremony that vouches for a VCS checkout's
//! developer identity.

use std::path::{Path, PathBuf};

use crate::action::Action;
use crate::builder::{self, ProtoBlock};
use crate::error::{Error, Result};
use crate::fileref::{create_fileref, create_pathref};
use crate::signer::Signer;
use crate::store::BlockStore;
use crate::vcs::Vcs;
use crate::verifier::Verifier;

const SMART_CONTRACT_PUBKEY: &str = "public.key";
const SMART_CONTRACT_UUID: &str = "pyom_smart_contract_uuid.txt";

/// An optional self-referential smart-contract checkout to register during
/// bootstrap, e.g. the core package's own repository under
/// `smart_contracts/`.
pub struct SmartContractSeed {
    /// Path to the checkout, relative to the chain rootdir.
    pub submodule_relpath: String,
}

/// Creates `public.key`, block 0 (a single `import_gpg_key` action for the
/// owner's own key), and the chain-local keyring directory. `rootdir` must
/// have an empty (or absent) `blockchain/` directory. When `smart_contract`
/// is given, immediately follows up with `add_smart_contract` for it - not
/// every deployment has a self-referential checkout to register.
pub fn initialize_blockchain<S: BlockStore, G: Signer, V: Vcs>(
    rootdir: PathBuf,
    store: S,
    signer: G,
    vcs: V,
    owner_pubkey_bytes: &[u8],
    smart_contract: Option<SmartContractSeed>,
) -> Result<Verifier<S, G, V>> {
    if store.block_count()? != 0 {
        return Err(Error::Schema("initialize_blockchain: blockchain directory is not empty".into()));
    }
    std::fs::create_dir_all(&rootdir)?;
    vcs.init(&rootdir)?;
    std::fs::write(rootdir.join("public.key"), owner_pubkey_bytes)?;
    std::fs::create_dir_all(rootdir.join("gnupg"))?;

    let mut verifier = Verifier::new(rootdir, store, signer, vcs)?;
    let fpr = verifier.fpr.clone();
    let keyfile = create_fileref(&verifier.rootdir, 0, "public.key")?;
    builder::append_block(
        &mut verifier,
        ProtoBlock::new(vec![Action::ImportGpgKey { gpg: fpr, keyfile, git_remote_urls: Default::default() }]),
    )?;

    if let Some(seed) = smart_contract {
        add_smart_contract(&mut verifier, &seed.submodule_relpath)?;
    }
    Ok(verifier)
}

/// Vouches for a VCS checkout: imports the developer's public key from
/// `<submodule_relpath>/public.key`, commits to the checkout's declared
/// UUID file via `link_file`, and checks the current commit carries a tag
/// signed by that same key.
pub fn add_smart_contract<S: BlockStore, G: Signer, V: Vcs>(
    verifier: &mut Verifier<S, G, V>,
    submodule_relpath: &str,
) -> Result<u64> {
    let keypath = format!("{submodule_relpath}/{SMART_CONTRACT_PUBKEY}");
    let uuidpath = format!("{submodule_relpath}/{SMART_CONTRACT_UUID}");
    let key_bytes = std::fs::read(verifier.rootdir.join(&keypath))?;
    let fpr = verifier.signer.import_key(&key_bytes)?;
    let repodir = verifier.rootdir.join(submodule_relpath);
    let remotes = verifier.vcs.remote_urls(&repodir).unwrap_or_default();

    let actions = vec![
        Action::ImportGpgKey {
            gpg: fpr.clone(),
            keyfile: create_fileref(&verifier.rootdir, 0, &keypath)?,
            git_remote_urls: remotes,
        },
        Action::LinkFile { file: create_fileref(&verifier.rootdir, 0, &uuidpath)? },
        Action::VerifySignedTag { gpg: fpr, git_repo: create_pathref(0, submodule_relpath) },
    ];
    builder::append_block(verifier, ProtoBlock::new(actions))
}

pub fn smart_contracts_root(rootdir: &Path) -> PathBuf { rootdir.join("smart_contracts") }
