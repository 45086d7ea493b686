// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The Dependency Checker: a worklist walk across a main chain and its
//! reachable peers, detecting forks by blockref digest mismatch and
//! enforcing the no-cherry-pick rule on annulments.

use std::collections::BTreeMap;

use crate::block::BlockRef;
use crate::error::{Error, Result};
use crate::fpr::Fingerprint;
use crate::hash::hash_bytes;
use crate::signer::Signer;
use crate::store::BlockStore;
use crate::transaction::TransactionStatus;
use crate::vcs::Vcs;
use crate::verifier::Verifier;

/// Lazily replays `that` up to (and including) `that_blockref.idx`, pushing
/// its fingerprint onto `worklist` if this is the first time it has been
/// visited. Fails with [`Error::HashMismatch`] if the replayed block's
/// digest doesn't match what `that_blockref` claims - this is the fork
/// detector.
fn check_dependency<S: BlockStore, G: Signer, V: Vcs>(
    worklist: &mut Vec<Fingerprint>,
    verifiers: &mut BTreeMap<Fingerprint, Verifier<S, G, V>>,
    that_fpr: &Fingerprint,
    that_blockref: &BlockRef,
) -> Result<()> {
    let Some(that_v) = verifiers.get_mut(that_fpr) else {
        tracing::warn!(peer = %that_fpr, "missing blockchain during dependency check");
        return Ok(());
    };
    let that_idx = that_blockref.idx;
    let block_bytes = that_v.store.read_block_bytes(that_idx)?;
    let digest = hash_bytes(&block_bytes);
    if digest != that_blockref.sha512 {
        return Err(Error::HashMismatch { expected: that_blockref.sha512.to_string(), found: digest.to_string() });
    }
    if that_idx < that_v.next_idx {
        return Ok(());
    }
    that_v.replay_to(that_idx)?;
    worklist.push(that_fpr.clone());
    Ok(())
}

/// An annulled transaction is detached iff at least one of its
/// peer-signatures refers to an idx the peer hasn't replayed yet - i.e. it
/// lies beyond the reachable dependency slice. A missing peer gets the
/// benefit of the doubt and counts as detached.
pub fn is_detached<S: BlockStore, G: Signer, V: Vcs>(
    verifiers: &BTreeMap<Fingerprint, Verifier<S, G, V>>,
    signatures: &BTreeMap<Fingerprint, BlockRef>,
) -> bool {
    for (that_fpr, that_blockref) in signatures {
        match verifiers.get(that_fpr) {
            None => return true,
            Some(that_v) => {
                if that_blockref.idx >= that_v.next_idx {
                    return true;
                }
            }
        }
    }
    false
}

/// Walks the dependency closure reachable from `main` via extra connections
/// and confirmed-transaction signatures, replaying each peer lazily and only
/// as far as referenced, then enforces that every annulled transaction in
/// the closure is detached.
pub fn check_dependency_chain<S: BlockStore, G: Signer, V: Vcs>(
    mut verifiers: BTreeMap<Fingerprint, Verifier<S, G, V>>,
    main_fpr: Fingerprint,
) -> Result<BTreeMap<Fingerprint, Verifier<S, G, V>>> {
    let mut worklist = vec![main_fpr];
    while let Some(this_fpr) = worklist.pop() {
        let (extra_connections, confirmed_signatures) = {
            let this_v = verifiers.get(&this_fpr).expect("worklist only holds known fingerprints");
            let extra_connections: Vec<(Fingerprint, BlockRef)> =
                this_v.extra_connections.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let confirmed_signatures: Vec<(Fingerprint, BlockRef)> = this_v
                .transactions
                .values()
                .filter(|state| state.status == TransactionStatus::Confirmed)
                .flat_map(|state| state.signatures.iter().map(|(k, v)| (k.clone(), v.clone())))
                .collect();
            (extra_connections, confirmed_signatures)
        };
        for (that_fpr, that_blockref) in extra_connections.iter().chain(confirmed_signatures.iter()) {
            check_dependency(&mut worklist, &mut verifiers, that_fpr, that_blockref)?;
        }
    }

    for (this_fpr, this_v) in &verifiers {
        for (transaction_hash, state) in &this_v.transactions {
            if state.status != TransactionStatus::Annulled {
                continue;
            }
            if !is_detached(&verifiers, &state.signatures) {
                return Err(Error::Schema(format!(
                    "annulled transaction should be reinstated: {this_fpr}: {transaction_hash}"
                )));
            }
        }
    }
    Ok(verifiers)
}
