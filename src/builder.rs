// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The Chain Builder: the only place new blocks get written. Atomicity
//! comes from dry-running the draft through the Verifier before anything
//! touches disk - a draft that would fail never gets stamped, signed, or
//! written.

use chrono::Utc;

use crate::action::Action;
use crate::block::{to_canonical_json, Block, BlockRef, Owner};
use crate::error::Result;
use crate::hash::hash_bytes;
use crate::magic::{BLOCK_MAGIC, VERSION};
use crate::signer::Signer;
use crate::store::BlockStore;
use crate::vcs::Vcs;
use crate::verifier::Verifier;

/// An unstamped block body: just the actions a caller wants appended next.
#[derive(Clone, Debug, Default)]
pub struct ProtoBlock {
    pub actions: Vec<Action>,
}

impl ProtoBlock {
    pub fn new(actions: Vec<Action>) -> Self { ProtoBlock { actions } }
}

/// Dry-runs `protoblock` against `verifier`, then stamps, signs and writes
/// it as the next block, advancing `verifier.next_idx` on success. The dry
/// run is also the commit: `verify_block_body` updates in-memory Verifier
/// state (transactions, bans, connections) exactly as it would for a block
/// already on disk. If verification fails nothing is written, but a caller
/// must still discard `verifier` on error rather than reuse it, since a
/// failure after a partial action sequence can leave in-memory state ahead
/// of disk.
pub fn append_block<S: BlockStore, G: Signer, V: Vcs>(
    verifier: &mut Verifier<S, G, V>,
    protoblock: ProtoBlock,
) -> Result<u64> {
    let idx = verifier.next_idx;
    let now = Utc::now();

    verifier.verify_block_body(now, idx, &protoblock.actions)?;

    let prev = if idx == 0 {
        crate::fileref::create_fileref(&verifier.rootdir, 0, "public.key")?
    } else {
        let prev_bytes = verifier.store.read_block_bytes(idx - 1)?;
        crate::fileref::FileRef {
            magic: crate::magic::FILEREF_MAGIC.to_owned(),
            locidx: 0,
            filename: crate::store::block_relpath(idx - 1, crate::store::EXT_BLOCK),
            sha512: hash_bytes(&prev_bytes),
        }
    };

    let block = Block {
        pyom_version: VERSION,
        pyom_block_magic: BLOCK_MAGIC.to_owned(),
        idx,
        owner: Owner { gpg: verifier.fpr.clone() },
        prev,
        timestamp: now,
        actions: protoblock.actions,
    };

    let block_bytes = to_canonical_json(&block)?;
    let block_digest = hash_bytes(&block_bytes);
    let blockref = BlockRef::new(verifier.fpr.clone(), idx, block_digest);
    let blockref_bytes = to_canonical_json(&blockref)?;
    let sig_bytes = verifier.signer.sign_detached(&blockref_bytes)?;

    verifier.store.write_block(idx, &block_bytes, &blockref_bytes, &sig_bytes)?;
    verifier.next_idx += 1;
    Ok(idx)
}
