// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The Transaction Coordinator: the multi-chain protocol run out-of-band by
//! each participant's own process. Nothing here is a single source of
//! truth - every participant runs `create_transaction` against their own
//! rootdir and `confirm_transactions`/`copy_bans` against whichever peers
//! they happen to have on hand; the Verifier enforces consistency when each
//! resulting protoblock is later appended and replayed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::action::{Action, SignedBlockRefs, TransactionRef};
use crate::block::Block;
use crate::builder::{self, ProtoBlock};
use crate::error::{Error, Result};
use crate::fileref::{self, create_fileref, create_pathref, FileRef};
use crate::fpr::Fingerprint;
use crate::hash::hash_bytes;
use crate::magic::FILEREF_MAGIC;
use crate::signer::Signer;
use crate::store::{block_relpath, BlockStore, EXT_BLOCK, EXT_BLOCKREF, EXT_SIG};
use crate::transaction::{Contract, Participant, Transaction, TransactionStatus};
use crate::vcs::Vcs;
use crate::verifier::Verifier;

/// One participant's chain directory, as seen from another participant's
/// machine before any chain has been replayed.
pub struct ParticipantSeed {
    pub rootdir: PathBuf,
}

fn read_raw_block(rootdir: &Path, idx: u64) -> Result<Block> {
    let bytes = std::fs::read(rootdir.join(block_relpath(idx, EXT_BLOCK)))?;
    crate::block::from_canonical_json(&bytes)
}

fn timestamp_dirname(ts: DateTime<Utc>) -> String {
    format!("transactions/{}", ts.format("%Y/%m/%d/%Y%m%dT%H%M%S%.fZ"))
}

/// Builds the transaction file and one protoblock per participant,
/// registering everyone who isn't already a known key on `this_rootdir` via
/// a staged `import_gpg_key` action. The caller appends the returned
/// protoblock to `this`'s own chain; every other participant independently
/// runs the same function (or receives their protoblock out-of-band) and
/// appends their own.
pub fn create_transaction<S: BlockStore, G: Signer, V: Vcs>(
    verifier: &Verifier<S, G, V>,
    peers: &[ParticipantSeed],
    expiry_delta: Duration,
    contracts: Vec<Contract>,
) -> Result<(ProtoBlock, FileRef)> {
    let timestamp = Utc::now();
    let expiry = timestamp + expiry_delta;
    let transaction_reldir = timestamp_dirname(timestamp);
    let transaction_dir = verifier.rootdir.join(&transaction_reldir);
    std::fs::create_dir_all(&transaction_dir)?;

    let mut locations = vec![create_pathref(0, &transaction_reldir)];
    let mut actions = Vec::new();
    let mut participants = Vec::new();

    for peer in peers {
        let idx = most_recent_idx_on_disk(&peer.rootdir)?;
        let recent_block = read_raw_block(&peer.rootdir, idx)?;
        let fpr = recent_block.owner.gpg.clone();
        if !verifier.known_keys.contains_key(&fpr) {
            let fpr_dir = transaction_reldir.clone() + "/" + fpr.as_str();
            std::fs::create_dir(verifier.rootdir.join(&fpr_dir))?;
            let key_bytes = std::fs::read(peer.rootdir.join("public.key"))?;
            let key_relpath = format!("{fpr_dir}/{fpr}.key");
            std::fs::write(verifier.rootdir.join(&key_relpath), &key_bytes)?;
            let keyfile = create_fileref(&verifier.rootdir, 0, &key_relpath)?;
            let remotes = verifier.vcs.remote_urls(&peer.rootdir).unwrap_or_default();
            actions.push(Action::ImportGpgKey { gpg: fpr.clone(), keyfile, git_remote_urls: remotes });
        }
        participants.push(Participant { gpg: fpr });
    }

    let numlocations = locations.len();
    let transaction = Transaction::new(timestamp, expiry, participants, contracts, numlocations);
    let transaction_bytes = crate::block::to_canonical_json(&transaction)?;
    let transaction_relpath = format!("{transaction_reldir}/transaction.json");
    std::fs::write(verifier.rootdir.join(&transaction_relpath), &transaction_bytes)?;
    let transaction_fileref = create_fileref(&verifier.rootdir, 0, &transaction_relpath)?;

    actions.push(Action::RegisterTransaction {
        transaction: transaction_fileref.clone(),
        locations: std::mem::take(&mut locations),
    });

    Ok((ProtoBlock::new(actions), transaction_fileref))
}

fn most_recent_idx_on_disk(rootdir: &Path) -> Result<u64> {
    let blockchain_dir = rootdir.join("blockchain");
    let mut best: Option<u64> = None;
    let mut stack = vec![blockchain_dir];
    while let Some(dir) = stack.pop() {
        if !dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(hex) = name.strip_suffix(".json") {
                    if hex.len() == 16 {
                        if let Ok(idx) = u64::from_str_radix(hex, 16) {
                            best = Some(best.map_or(idx, |b| b.max(idx)));
                        }
                    }
                }
            }
        }
    }
    best.ok_or_else(|| Error::NotFound(format!("no blocks under {}", rootdir.display())))
}

fn copy_block<S: BlockStore, G: Signer, V: Vcs>(
    this_rootdir: &Path,
    dest_reldir: &str,
    that: &Verifier<S, G, V>,
    that_idx: u64,
) -> Result<SignedBlockRefs> {
    let block_bytes = that.store.read_block_bytes(that_idx)?;
    let blockref_bytes = that.store.read_blockref_bytes(that_idx)?;
    let sig_bytes = that.store.read_sig_bytes(that_idx)?;

    let block_relpath = format!("{dest_reldir}/{:016x}{EXT_BLOCK}", that_idx);
    let blockref_relpath = format!("{dest_reldir}/{:016x}{EXT_BLOCKREF}", that_idx);
    let sig_relpath = format!("{dest_reldir}/{:016x}{EXT_SIG}", that_idx);

    std::fs::write(this_rootdir.join(&block_relpath), &block_bytes)?;
    std::fs::write(this_rootdir.join(&blockref_relpath), &blockref_bytes)?;
    std::fs::write(this_rootdir.join(&sig_relpath), &sig_bytes)?;

    Ok(SignedBlockRefs {
        block: FileRef { magic: FILEREF_MAGIC.to_owned(), locidx: 0, filename: block_relpath, sha512: hash_bytes(&block_bytes) },
        block_ref: FileRef {
            magic: FILEREF_MAGIC.to_owned(),
            locidx: 0,
            filename: blockref_relpath,
            sha512: hash_bytes(&blockref_bytes),
        },
        block_sig: FileRef { magic: FILEREF_MAGIC.to_owned(), locidx: 0, filename: sig_relpath, sha512: hash_bytes(&sig_bytes) },
    })
}

/// Scans `this`'s pending transactions against `that`'s state and emits
/// sign/confirm actions for ones `that` has also registered, or
/// cancel actions for ones `that` never registered before expiry.
/// `confirm_only=true` aborts the whole call with an error the moment it
/// finds a transaction that still has other pending participants besides
/// `that` - the caller should use `sign_transactions` semantics
/// (`confirm_only=false`) unless they intend to be the one who closes it
/// out early.
pub fn confirm_transactions<S: BlockStore, G: Signer, V: Vcs>(
    this: &mut Verifier<S, G, V>,
    that: &mut Verifier<S, G, V>,
    confirm_only: bool,
) -> Result<Option<u64>> {
    let mut actions = Vec::new();
    let this_rootdir = this.rootdir.clone();
    let that_fpr = that.fpr.clone();

    let pending_hashes: Vec<String> = this
        .transactions
        .iter()
        .filter(|(_, state)| state.status == TransactionStatus::Pending && state.pending_participants.contains(&that_fpr))
        .map(|(hash, _)| hash.clone())
        .collect();

    for transaction_hash in pending_hashes {
        if that.transactions.contains_key(&transaction_hash) {
            let pending_count = this.transactions[&transaction_hash].pending_participants.len();
            if confirm_only && pending_count > 1 {
                return Err(Error::Schema(format!(
                    "confirm_transactions: transaction {transaction_hash} still has {pending_count} pending \
                     participants besides {that_fpr} - use sign_transactions to close it out early"
                )));
            }
            let that_idx = that.transactions[&transaction_hash].block_idx;
            let dest_reldir = timestamp_dirname(Utc::now()).replacen("transactions", "confirmations", 1);
            std::fs::create_dir_all(this_rootdir.join(&dest_reldir))?;
            let triple = copy_block(&this_rootdir, &dest_reldir, that, that_idx)?;
            actions.push(Action::SignTransaction {
                gpg: that_fpr.clone(),
                transaction: TransactionRef { sha512: transaction_hash.parse().map_err(|_| Error::Schema("bad digest".into()))? },
                block: triple.block,
                block_ref: triple.block_ref,
                block_sig: triple.block_sig,
            });
            if pending_count == 1 {
                actions.push(Action::ConfirmTransaction {
                    transaction: TransactionRef { sha512: transaction_hash.parse().map_err(|_| Error::Schema("bad digest".into()))? },
                });
            }
        } else {
            let state = &this.transactions[&transaction_hash];
            let transaction_timestamp = state.transaction.timestamp;
            let expiry_timestamp = state.transaction.expiry;

            let mut that_idx = that
                .store
                .most_recent()?
                .ok_or_else(|| Error::NotFound(format!("no blocks under {}", that.rootdir.display())))?;
            let mut end_idx = None;
            loop {
                let that_block = that.store.read_block(that_idx)?;
                if that_block.timestamp < expiry_timestamp {
                    break;
                }
                end_idx = Some(that_idx);
                if that_idx == 0 {
                    break;
                }
                that_idx -= 1;
            }
            let Some(mut idx) = end_idx else { continue };
            let dest_reldir = timestamp_dirname(Utc::now()).replacen("transactions", "cancellations", 1);
            std::fs::create_dir_all(this_rootdir.join(&dest_reldir))?;
            let mut blocks = Vec::new();
            loop {
                blocks.insert(0, copy_block(&this_rootdir, &dest_reldir, that, idx)?);
                let that_block = that.store.read_block(idx)?;
                if that_block.timestamp < transaction_timestamp || idx == 0 {
                    break;
                }
                idx -= 1;
            }
            actions.push(Action::CancelTransaction {
                gpg: that_fpr.clone(),
                transaction: TransactionRef { sha512: transaction_hash.parse().map_err(|_| Error::Schema("bad digest".into()))? },
                blocks,
            });
        }
    }

    if actions.is_empty() {
        return Ok(None);
    }
    builder::append_block(this, ProtoBlock::new(actions)).map(Some)
}

/// Finds the first block index at which `forkdir1` and `forkdir2` diverge
/// under the same owner fingerprint, stages the fork-proof files under
/// `main`'s `banned/` directory, and appends a `ban` action.
pub fn create_ban<S: BlockStore, G: Signer, V: Vcs>(
    main: &mut Verifier<S, G, V>,
    fork1: &Verifier<S, G, V>,
    fork2: &Verifier<S, G, V>,
) -> Result<u64> {
    if fork1.fpr != fork2.fpr {
        return Err(Error::Schema("create_ban: forks belong to different owners".into()));
    }
    let fpr = fork1.fpr.clone();
    if main.is_banned(&fpr) {
        return Err(Error::AlreadyBanned(fpr));
    }
    let count1 = fork1.store.block_count()?;
    let count2 = fork2.store.block_count()?;
    for idx in 0..count1.min(count2) {
        let blockref1 = fork1.store.read_blockref(idx)?;
        let blockref2 = fork2.store.read_blockref(idx)?;
        if blockref1.sha512 != blockref2.sha512 {
            let ref1_bytes = fork1.store.read_blockref_bytes(idx)?;
            let sig1_bytes = fork1.store.read_sig_bytes(idx)?;
            let ref2_bytes = fork2.store.read_blockref_bytes(idx)?;
            let sig2_bytes = fork2.store.read_sig_bytes(idx)?;
            let key_bytes = std::fs::read(fork1.rootdir.join("public.key"))?;
            let mut remotes = main.vcs.remote_urls(&fork1.rootdir).unwrap_or_default();
            remotes.extend(main.vcs.remote_urls(&fork2.rootdir).unwrap_or_default());
            return stage_and_append_ban(main, &fpr, idx, &key_bytes, remotes, &ref1_bytes, &sig1_bytes, &ref2_bytes, &sig2_bytes);
        }
    }
    Err(Error::NotFound("no fork found between the two directories".into()))
}

#[allow(clippy::too_many_arguments)]
fn stage_and_append_ban<S: BlockStore, G: Signer, V: Vcs>(
    main: &mut Verifier<S, G, V>,
    fpr: &Fingerprint,
    idx: u64,
    key_bytes: &[u8],
    remotes: BTreeMap<String, String>,
    ref1_bytes: &[u8],
    sig1_bytes: &[u8],
    ref2_bytes: &[u8],
    sig2_bytes: &[u8],
) -> Result<u64> {
    let ban_dir = format!("banned/{fpr}");
    let dir1 = format!("{ban_dir}/fork1");
    let dir2 = format!("{ban_dir}/fork2");
    std::fs::create_dir_all(main.rootdir.join(&dir1))?;
    std::fs::create_dir_all(main.rootdir.join(&dir2))?;

    let ref1_relpath = format!("{dir1}/{:016x}{EXT_BLOCKREF}", idx);
    let sig1_relpath = format!("{dir1}/{:016x}{EXT_SIG}", idx);
    let ref2_relpath = format!("{dir2}/{:016x}{EXT_BLOCKREF}", idx);
    let sig2_relpath = format!("{dir2}/{:016x}{EXT_SIG}", idx);
    std::fs::write(main.rootdir.join(&ref1_relpath), ref1_bytes)?;
    std::fs::write(main.rootdir.join(&sig1_relpath), sig1_bytes)?;
    std::fs::write(main.rootdir.join(&ref2_relpath), ref2_bytes)?;
    std::fs::write(main.rootdir.join(&sig2_relpath), sig2_bytes)?;

    let key_relpath = format!("{ban_dir}/{fpr}.key");
    std::fs::write(main.rootdir.join(&key_relpath), key_bytes)?;

    let action = Action::Ban {
        gpg: fpr.clone(),
        keyfile: create_fileref(&main.rootdir, 0, &key_relpath)?,
        git_remote_urls: remotes,
        block_ref1: create_fileref(&main.rootdir, 0, &ref1_relpath)?,
        block_sig1: create_fileref(&main.rootdir, 0, &sig1_relpath)?,
        block_ref2: create_fileref(&main.rootdir, 0, &ref2_relpath)?,
        block_sig2: create_fileref(&main.rootdir, 0, &sig2_relpath)?,
    };
    builder::append_block(main, ProtoBlock::new(vec![action]))
}

/// Copies `that`'s block `that_idx` blockref+signature into `this`'s chain
/// under `extra_connections/` and appends an `add_extra_connection` action
/// vouching for it.
pub fn add_extra_connection<S: BlockStore, G: Signer, V: Vcs>(
    this: &mut Verifier<S, G, V>,
    that: &Verifier<S, G, V>,
    that_idx: u64,
) -> Result<u64> {
    let dest_reldir = format!("extra_connections/{}/{}", that.fpr, timestamp_dirname(Utc::now()).trim_start_matches("transactions/"));
    std::fs::create_dir_all(this.rootdir.join(&dest_reldir))?;
    let triple = copy_block(&this.rootdir.clone(), &dest_reldir, that, that_idx)?;
    let action = Action::AddExtraConnection { gpg: that.fpr.clone(), block_ref: triple.block_ref, block_sig: triple.block_sig };
    builder::append_block(this, ProtoBlock::new(vec![action]))
}

/// Stops treating `that` as a dependency. Revisiting `that`'s state is still
/// possible via other extra connections or confirmed-transaction signatures.
pub fn remove_extra_connection<S: BlockStore, G: Signer, V: Vcs>(
    this: &mut Verifier<S, G, V>,
    that: &Verifier<S, G, V>,
) -> Result<u64> {
    let action = Action::RemoveExtraConnection { gpg: that.fpr.clone() };
    builder::append_block(this, ProtoBlock::new(vec![action]))
}

/// Marks a confirmed transaction as annulled, with a human-readable reason.
pub fn annul_transaction<S: BlockStore, G: Signer, V: Vcs>(
    this: &mut Verifier<S, G, V>,
    transaction_hash: &str,
    explanation: &str,
) -> Result<u64> {
    let action = Action::AnnulTransaction {
        transaction: TransactionRef { sha512: transaction_hash.parse().map_err(|_| Error::Schema("bad digest".into()))? },
        explanation: explanation.to_owned(),
    };
    builder::append_block(this, ProtoBlock::new(vec![action]))
}

/// Moves a transaction back from `Annulled` to `Confirmed`.
pub fn reinstate_transaction<S: BlockStore, G: Signer, V: Vcs>(
    this: &mut Verifier<S, G, V>,
    transaction_hash: &str,
) -> Result<u64> {
    let action = Action::ReinstateTransaction {
        transaction: TransactionRef { sha512: transaction_hash.parse().map_err(|_| Error::Schema("bad digest".into()))? },
    };
    builder::append_block(this, ProtoBlock::new(vec![action]))
}

/// Copies every ban `others` know about but `main` doesn't into `main`'s own
/// chain, one `ban` action at a time.
pub fn copy_bans<S: BlockStore, G: Signer, V: Vcs>(
    main: &mut Verifier<S, G, V>,
    others: &[Verifier<S, G, V>],
) -> Result<Vec<u64>> {
    let mut appended = Vec::new();
    for other in others {
        let bans: Vec<(Fingerprint, Action)> = other.banned.iter().map(|(fpr, a)| (fpr.clone(), a.clone())).collect();
        for (fpr, action) in bans {
            if main.is_banned(&fpr) {
                continue;
            }
            let Action::Ban { keyfile, git_remote_urls, block_ref1, block_sig1, block_ref2, block_sig2, .. } = action
            else {
                unreachable!("banned map only ever holds Ban actions")
            };
            let locations = vec![other.rootdir.clone()];
            let key_bytes = fileref::load(&locations, &keyfile)?;
            let ref1_bytes = fileref::load(&locations, &block_ref1)?;
            let sig1_bytes = fileref::load(&locations, &block_sig1)?;
            let ref2_bytes = fileref::load(&locations, &block_ref2)?;
            let sig2_bytes = fileref::load(&locations, &block_sig2)?;
            let blockref1: crate::block::BlockRef = crate::block::from_canonical_json(&ref1_bytes)?;
            let idx = blockref1.idx;
            appended.push(stage_and_append_ban(
                main,
                &fpr,
                idx,
                &key_bytes,
                git_remote_urls,
                &ref1_bytes,
                &sig1_bytes,
                &ref2_bytes,
                &sig2_bytes,
            )?);
        }
    }
    Ok(appended)
}
