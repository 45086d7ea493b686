// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The `covenant` binary's subcommands. Each maps to exactly one core or
//! coordinator call against the current directory's chain - everything
//! heavier (replay, signature checking, dependency walking) lives in
//! `covenant` and `covenant-fs`, never here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use covenant::bootstrap::{self, SmartContractSeed};
use covenant::builder::{self, ProtoBlock};
use covenant::coordinator;
use covenant::dependency;

#[derive(Parser)]
pub enum Cmd {
    /// Turn an empty directory into a new chain's block 0
    InitializeBlockchain {
        /// Secret-key export (`gpg --export-secret-keys`) of the chain
        /// owner's identity; only its public half ever leaves this directory
        keyfile: PathBuf,

        /// Relative path of a self-referential VCS checkout to vouch for
        /// immediately after bootstrap
        #[clap(long)]
        smart_contract: Option<String>,
    },

    /// Append a hand-written protoblock (a JSON `{"actions": [...]}` file) to
    /// the chain in the current directory
    CreateBlock {
        /// Path to the protoblock JSON file
        protoblock: PathBuf,
    },

    /// Vouch for a VCS checkout at `path` (relative to the current chain)
    AddSmartContract {
        /// Checkout path, relative to the chain rootdir
        path: String,
    },

    /// Detect a fork between two copies of the same owner's chain and ban
    /// that owner on the current chain
    AddBan {
        /// First fork's rootdir
        fork1: PathBuf,
        /// Second fork's rootdir
        fork2: PathBuf,
    },

    /// Copy every ban `other` directories know about that `main` doesn't
    CopyBans {
        /// The chain that receives the copied bans
        main: PathBuf,
        /// One or more peer chains to copy bans from
        other: Vec<PathBuf>,
    },

    /// Vouch for block `idx` of `other` as an extra dependency connection
    AddExtraConnection {
        /// Peer chain's rootdir
        other: PathBuf,
        /// Block index on `other` to vouch for
        idx: u64,
    },

    /// Stop treating `other` as a dependency
    RemoveExtraConnection {
        /// Peer chain's rootdir
        other: PathBuf,
    },

    /// Mark a confirmed transaction as annulled
    AnnulTransaction {
        /// The transaction's content digest, as printed at registration time
        hash: String,
        /// Human-readable reason, recorded on-chain
        explanation: String,
    },

    /// Move an annulled transaction back to confirmed
    ReinstateTransaction {
        /// The transaction's content digest
        hash: String,
    },

    /// Scan pending transactions against `other` and sign, confirm, or
    /// cancel as appropriate, refusing to close out a transaction that still
    /// has other pending participants
    ConfirmTransactions {
        /// Peer chain's rootdir
        other: PathBuf,
    },

    /// Same scan as `confirm-transactions`, but willing to close out a
    /// transaction even while other participants remain pending
    SignTransactions {
        /// Peer chain's rootdir
        other: PathBuf,
    },

    /// Walk the dependency closure reachable from `main` and reject any
    /// cherry-picked annulment
    CheckDependencyChain {
        /// The chain whose dependency closure is being checked
        main: PathBuf,
        /// Every peer chain reachable from `main`, by rootdir
        other: Vec<PathBuf>,
    },

    /// Fully replay the chain in the current directory and report success
    Verifier,
}

impl Cmd {
    pub fn exec(self) -> Result<()> {
        match self {
            Cmd::InitializeBlockchain { keyfile, smart_contract } => initialize_blockchain(keyfile, smart_contract)?,
            Cmd::CreateBlock { protoblock } => create_block(protoblock)?,
            Cmd::AddSmartContract { path } => add_smart_contract(path)?,
            Cmd::AddBan { fork1, fork2 } => add_ban(fork1, fork2)?,
            Cmd::CopyBans { main, other } => copy_bans(main, other)?,
            Cmd::AddExtraConnection { other, idx } => add_extra_connection(other, idx)?,
            Cmd::RemoveExtraConnection { other } => remove_extra_connection(other)?,
            Cmd::AnnulTransaction { hash, explanation } => annul_transaction(hash, explanation)?,
            Cmd::ReinstateTransaction { hash } => reinstate_transaction(hash)?,
            Cmd::ConfirmTransactions { other } => confirm_transactions(other, true)?,
            Cmd::SignTransactions { other } => confirm_transactions(other, false)?,
            Cmd::CheckDependencyChain { main, other } => check_dependency_chain(main, other)?,
            Cmd::Verifier => verify_cwd()?,
        }
        Ok(())
    }
}

fn cwd() -> Result<PathBuf> { std::env::current_dir().context("reading current directory") }

fn initialize_blockchain(keyfile: PathBuf, smart_contract: Option<String>) -> Result<()> {
    let rootdir = cwd()?;
    tracing::info!(rootdir = %rootdir.display(), "initializing blockchain");
    let key_bytes = std::fs::read(&keyfile).with_context(|| format!("reading {}", keyfile.display()))?;
    let seed = smart_contract.map(|submodule_relpath| SmartContractSeed { submodule_relpath });
    let verifier = covenant_fs::create(rootdir, &key_bytes, seed)?;
    println!("initialized chain for {}", verifier.fpr);
    Ok(())
}

fn create_block(protoblock_path: PathBuf) -> Result<()> {
    let rootdir = cwd()?;
    let mut verifier = covenant_fs::open(&rootdir)?;
    let bytes = std::fs::read(&protoblock_path).with_context(|| format!("reading {}", protoblock_path.display()))?;
    #[derive(serde::Deserialize)]
    struct ProtoBlockFile {
        actions: Vec<covenant::action::Action>,
    }
    let parsed: ProtoBlockFile = serde_json::from_slice(&bytes).context("parsing protoblock JSON")?;
    let idx = builder::append_block(&mut verifier, ProtoBlock::new(parsed.actions))?;
    println!("appended block {idx}");
    Ok(())
}

fn add_smart_contract(path: String) -> Result<()> {
    let rootdir = cwd()?;
    let mut verifier = covenant_fs::open(&rootdir)?;
    let idx = bootstrap::add_smart_contract(&mut verifier, &path)?;
    println!("appended block {idx}");
    Ok(())
}

fn add_ban(fork1: PathBuf, fork2: PathBuf) -> Result<()> {
    let rootdir = cwd()?;
    let mut main = covenant_fs::open(&rootdir)?;
    let fork1 = covenant_fs::open(&fork1)?;
    let fork2 = covenant_fs::open(&fork2)?;
    let idx = coordinator::create_ban(&mut main, &fork1, &fork2)?;
    println!("appended block {idx}");
    Ok(())
}

fn copy_bans(main: PathBuf, other: Vec<PathBuf>) -> Result<()> {
    let mut main_v = covenant_fs::open(&main)?;
    let mut others = Vec::with_capacity(other.len());
    for dir in &other {
        others.push(covenant_fs::open(dir)?);
    }
    let appended = coordinator::copy_bans(&mut main_v, &others)?;
    println!("appended {} ban block(s)", appended.len());
    Ok(())
}

fn add_extra_connection(other: PathBuf, idx: u64) -> Result<()> {
    let rootdir = cwd()?;
    let mut this = covenant_fs::open(&rootdir)?;
    let that = covenant_fs::open(&other)?;
    let idx = coordinator::add_extra_connection(&mut this, &that, idx)?;
    println!("appended block {idx}");
    Ok(())
}

fn remove_extra_connection(other: PathBuf) -> Result<()> {
    let rootdir = cwd()?;
    let mut this = covenant_fs::open(&rootdir)?;
    let that = covenant_fs::open(&other)?;
    let idx = coordinator::remove_extra_connection(&mut this, &that)?;
    println!("appended block {idx}");
    Ok(())
}

fn annul_transaction(hash: String, explanation: String) -> Result<()> {
    let rootdir = cwd()?;
    let mut this = covenant_fs::open(&rootdir)?;
    let idx = coordinator::annul_transaction(&mut this, &hash, &explanation)?;
    println!("appended block {idx}");
    Ok(())
}

fn reinstate_transaction(hash: String) -> Result<()> {
    let rootdir = cwd()?;
    let mut this = covenant_fs::open(&rootdir)?;
    let idx = coordinator::reinstate_transaction(&mut this, &hash)?;
    println!("appended block {idx}");
    Ok(())
}

fn confirm_transactions(other: PathBuf, confirm_only: bool) -> Result<()> {
    let rootdir = cwd()?;
    let mut this = covenant_fs::open(&rootdir)?;
    let mut that = covenant_fs::open(&other)?;
    match coordinator::confirm_transactions(&mut this, &mut that, confirm_only)? {
        Some(idx) => println!("appended block {idx}"),
        None => println!("nothing to do"),
    }
    Ok(())
}

fn check_dependency_chain(main: PathBuf, other: Vec<PathBuf>) -> Result<()> {
    let main_v = covenant_fs::open(&main)?;
    let main_fpr = main_v.fpr.clone();
    tracing::info!(main = %main_fpr, peers = other.len(), "checking dependency chain");
    let mut verifiers = BTreeMap::new();
    verifiers.insert(main_fpr.clone(), main_v);
    for dir in &other {
        let peer = covenant_fs::open_lazy(dir)?;
        verifiers.insert(peer.fpr.clone(), peer);
    }
    dependency::check_dependency_chain(verifiers, main_fpr).context("dependency chain check failed")?;
    println!("dependency chain check passed");
    Ok(())
}

fn verify_cwd() -> Result<()> {
    let rootdir = cwd()?;
    let verifier = covenant_fs::open(&rootdir)?;
    if verifier.next_idx == 0 {
        bail!("empty chain at {}", rootdir.display());
    }
    println!("verified {} blocks for {}", verifier.next_idx, verifier.fpr);
    Ok(())
}
