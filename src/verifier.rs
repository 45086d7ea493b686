// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The Action Interpreter: replays a chain's blocks against the capability
//! traits, enforcing every invariant in one place. A `Verifier` holds no
//! state that didn't come from a block it has already checked.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Utc;

use crate::action::Action;
use crate::block::{Block, BlockRef};
use crate::error::{Error, Result};
use crate::fileref::{self, FileRef};
use crate::fpr::Fingerprint;
use crate::hash::hash_bytes;
use crate::signer::Signer;
use crate::store::BlockStore;
use crate::transaction::{Transaction, TransactionState, TransactionStatus};
use crate::vcs::Vcs;

const PUBKEY_FILENAME: &str = "public.key";

#[derive(Debug)]
pub struct Verifier<S: BlockStore, G: Signer, V: Vcs> {
    pub rootdir: PathBuf,
    pub store: S,
    pub signer: G,
    pub vcs: V,
    pub next_idx: u64,
    pub fpr: Fingerprint,
    pub known_keys: BTreeMap<Fingerprint, BTreeMap<String, String>>,
    pub transactions: BTreeMap<String, TransactionState>,
    pub banned: BTreeMap<Fingerprint, Action>,
    pub extra_connections: BTreeMap<Fingerprint, BlockRef>,
}

impl<S: BlockStore, G: Signer, V: Vcs> Verifier<S, G, V> {
    /// Imports the owner's genesis public key and starts a fresh,
    /// zero-block Verifier. Use [`Verifier::replay`] to bring it up to date.
    pub fn new(rootdir: PathBuf, store: S, signer: G, vcs: V) -> Result<Self> {
        let pubkey_bytes = std::fs::read(rootdir.join(PUBKEY_FILENAME))?;
        let fpr = signer.import_key(&pubkey_bytes)?;
        let mut known_keys = BTreeMap::new();
        known_keys.insert(fpr.clone(), BTreeMap::new());
        Ok(Verifier {
            rootdir,
            store,
            signer,
            vcs,
            next_idx: 0,
            fpr,
            known_keys,
            transactions: BTreeMap::new(),
            banned: BTreeMap::new(),
            extra_connections: BTreeMap::new(),
        })
    }

    pub fn is_banned(&self, fpr: &Fingerprint) -> bool { self.banned.contains_key(fpr) }

    pub fn verify_fpr(&self, fpr: &Fingerprint) -> Result<()> {
        if !self.known_keys.contains_key(fpr) {
            return Err(Error::UnknownKey(fpr.clone()));
        }
        Ok(())
    }

    fn locations(&self) -> Vec<PathBuf> { vec![self.rootdir.clone()] }

    fn expected_prev(&self, idx: u64) -> Result<FileRef> {
        if idx == 0 {
            fileref::create_fileref(&self.rootdir, 0, PUBKEY_FILENAME)
        } else {
            let prev_bytes = self.store.read_block_bytes(idx - 1)?;
            Ok(FileRef {
                magic: crate::magic::FILEREF_MAGIC.to_owned(),
                locidx: 0,
                filename: crate::store::block_relpath(idx - 1, crate::store::EXT_BLOCK),
                sha512: hash_bytes(&prev_bytes),
            })
        }
    }

    /// Checks the gpg signature over a blockref and decodes it, verifying it
    /// was produced by `fpr`.
    fn check_blockref_sig(&self, fpr: &Fingerprint, blockref_bytes: &[u8], sig_bytes: &[u8]) -> Result<BlockRef> {
        let verified_fpr = self.signer.verify_detached(blockref_bytes, sig_bytes)?;
        if &verified_fpr != fpr {
            return Err(Error::SignatureInvalid);
        }
        let blockref: BlockRef = crate::block::from_canonical_json(blockref_bytes)?;
        blockref.check(fpr)?;
        Ok(blockref)
    }

    /// Checks a full block+blockref+sig triple, returning the decoded block.
    fn check_block_sig(
        &self,
        fpr: &Fingerprint,
        block_bytes: &[u8],
        blockref_bytes: &[u8],
        sig_bytes: &[u8],
    ) -> Result<Block> {
        let blockref = self.check_blockref_sig(fpr, blockref_bytes, sig_bytes)?;
        let block: Block = crate::block::from_canonical_json(block_bytes)?;
        block.check_magic()?;
        if blockref.idx != block.idx {
            return Err(Error::Schema("blockref idx does not match block idx".into()));
        }
        if blockref.sha512 != hash_bytes(block_bytes) {
            return Err(Error::HashMismatch {
                expected: blockref.sha512.to_string(),
                found: hash_bytes(block_bytes).to_string(),
            });
        }
        if &block.owner.gpg != fpr {
            return Err(Error::FprMismatch { declared: fpr.clone(), imported: block.owner.gpg.clone() });
        }
        Ok(block)
    }

    /// Replays every block from `next_idx` up to (and including) `upto`.
    pub fn replay_to(&mut self, upto: u64) -> Result<()> {
        while self.next_idx <= upto {
            self.verify_next_block()?;
        }
        Ok(())
    }

    pub fn replay_all(&mut self) -> Result<()> {
        let count = self.store.block_count()?;
        if count == 0 {
            return Ok(());
        }
        self.replay_to(count - 1)
    }

    fn verify_next_block(&mut self) -> Result<()> {
        let idx = self.next_idx;
        let block_bytes = self.store.read_block_bytes(idx)?;
        let blockref_bytes = self.store.read_blockref_bytes(idx)?;
        let sig_bytes = self.store.read_sig_bytes(idx)?;
        let fpr = self.fpr.clone();
        let block = self.check_block_sig(&fpr, &block_bytes, &blockref_bytes, &sig_bytes)?;

        if block.idx != idx {
            return Err(Error::Schema("unexpected block index".into()));
        }
        let expected_prev = self.expected_prev(idx)?;
        if block.prev != expected_prev {
            return Err(Error::Schema("bad prev reference".into()));
        }
        if !(block.timestamp < Utc::now()) {
            return Err(Error::BadTimestamp("block timestamp is in the future".into()));
        }
        if idx > 0 {
            let prev_block = self.store.read_block(idx - 1)?;
            if !(prev_block.timestamp < block.timestamp) {
                return Err(Error::BadTimestamp("timestamps are not strictly increasing".into()));
            }
        }

        self.next_idx += 1;
        self.verify_block_body(block.timestamp, idx, &block.actions)
    }

    pub fn verify_block_body(&mut self, block_timestamp: chrono::DateTime<Utc>, block_idx: u64, actions: &[Action]) -> Result<()> {
        let value = serde_json::to_value(actions)?;
        fileref::check_all(&value, &self.locations())?;
        self.verify_block_actions(block_timestamp, block_idx, actions)
    }

    pub fn verify_block_actions(&mut self, block_timestamp: chrono::DateTime<Utc>, block_idx: u64, actions: &[Action]) -> Result<()> {
        for action in actions {
            self.verify_action(block_timestamp, block_idx, action)?;
        }
        Ok(())
    }

    fn verify_action(&mut self, block_timestamp: chrono::DateTime<Utc>, block_idx: u64, action: &Action) -> Result<()> {
        match action {
            Action::ImportGpgKey { .. } => {
                self.verify_import_gpg_key(action)?;
                Ok(())
            }
            Action::Ban { .. } => self.verify_ban(action),
            Action::RegisterTransaction { transaction, locations } => {
                self.verify_register_transaction(block_timestamp, block_idx, transaction, locations)
            }
            Action::SignTransaction { gpg, transaction, block, block_ref, block_sig } => {
                self.verify_sign_transaction(gpg, transaction, block, block_ref, block_sig)
            }
            Action::ConfirmTransaction { transaction } => self.verify_confirm_transaction(transaction),
            Action::CancelTransaction { gpg, transaction, blocks } => {
                self.verify_cancel_transaction(gpg, transaction, blocks)
            }
            Action::AnnulTransaction { transaction, explanation } => {
                self.verify_annul_transaction(transaction, explanation)
            }
            Action::ReinstateTransaction { transaction } => self.verify_reinstate_transaction(transaction),
            Action::AddExtraConnection { gpg, block_ref, block_sig } => {
                self.verify_add_extra_connection(gpg, block_ref, block_sig)
            }
            Action::RemoveExtraConnection { gpg } => {
                self.extra_connections.remove(gpg).ok_or_else(|| Error::NotFound(gpg.to_string()))?;
                Ok(())
            }
            Action::VerifySignedTag { gpg, git_repo } => self.verify_signed_tag(gpg, git_repo),
            Action::LinkFile { file } => {
                fileref::load(&self.locations(), file)?;
                Ok(())
            }
        }
    }

    fn verify_import_gpg_key(&mut self, action: &Action) -> Result<Fingerprint> {
        let Action::ImportGpgKey { gpg, keyfile, git_remote_urls } = action else { unreachable!() };
        let key_bytes = fileref::load(&self.locations(), keyfile)?;
        let imported = self.signer.import_key(&key_bytes)?;
        if &imported != gpg {
            return Err(Error::FprMismatch { declared: gpg.clone(), imported });
        }
        self.known_keys.insert(gpg.clone(), git_remote_urls.clone());
        Ok(gpg.clone())
    }

    fn verify_ban(&mut self, action: &Action) -> Result<()> {
        let Action::Ban { block_ref1, block_sig1, block_ref2, block_sig2, .. } = action else { unreachable!() };
        let fpr = self.verify_import_gpg_key(action)?;
        if self.is_banned(&fpr) {
            return Err(Error::AlreadyBanned(fpr));
        }
        let ref1_bytes = fileref::load(&self.locations(), block_ref1)?;
        let sig1_bytes = fileref::load(&self.locations(), block_sig1)?;
        let ref2_bytes = fileref::load(&self.locations(), block_ref2)?;
        let sig2_bytes = fileref::load(&self.locations(), block_sig2)?;
        let ref1 = self.check_blockref_sig(&fpr, &ref1_bytes, &sig1_bytes)?;
        let ref2 = self.check_blockref_sig(&fpr, &ref2_bytes, &sig2_bytes)?;
        if ref1.idx != ref2.idx {
            return Err(Error::Schema("ban: block idx mismatch between forks".into()));
        }
        if ref1.sha512 == ref2.sha512 {
            return Err(Error::Schema("ban: both forks have identical digest".into()));
        }
        self.banned.insert(fpr, action.clone());
        Ok(())
    }

    fn verify_transaction(
        &mut self,
        locations: &[PathBuf],
        block_timestamp: chrono::DateTime<Utc>,
        transaction: &Transaction,
    ) -> Result<()> {
        transaction.check_magic()?;
        let value = serde_json::to_value(transaction)?;
        fileref::check_all(&value, locations)?;
        transaction.check_window(block_timestamp)?;
        for participant in &transaction.participants {
            self.verify_fpr(&participant.gpg)?;
            if self.is_banned(&participant.gpg) {
                return Err(Error::InvalidParticipant(participant.gpg.clone()));
            }
        }
        for contract in &transaction.contracts {
            let contractdir = fileref::resolve_pathref(locations, &contract.path)?;
            let uuid_bytes = std::fs::read(contractdir.join("pyom_smart_contract_uuid.txt"))?;
            let uuid_digest = hash_bytes(&uuid_bytes);
            if uuid_digest != contract.uuid_hash.sha512 {
                return Err(Error::HashMismatch {
                    expected: contract.uuid_hash.sha512.to_string(),
                    found: uuid_digest.to_string(),
                });
            }
            let commit_id = self.vcs.current_commit(&contractdir)?;
            for author in &contract.authors {
                self.verify_fpr(&author.gpg)?;
                let signers = self.signer.list_signed_tags(&contractdir, &commit_id)?;
                if !signers.contains(&author.gpg) {
                    return Err(Error::NoSignedTag(author.gpg.clone()));
                }
            }
        }
        Ok(())
    }

    fn verify_register_transaction(
        &mut self,
        block_timestamp: chrono::DateTime<Utc>,
        block_idx: u64,
        transaction_ref: &FileRef,
        loc_refs: &[crate::fileref::PathRef],
    ) -> Result<()> {
        let transaction_bytes = fileref::load(&self.locations(), transaction_ref)?;
        let transaction_hash = transaction_ref.sha512.to_string();
        let transaction: Transaction = crate::block::from_canonical_json(&transaction_bytes)?;
        if transaction.numlocations != loc_refs.len() {
            return Err(Error::Schema("register_transaction: location count mismatch".into()));
        }
        let mut transaction_locations = Vec::with_capacity(loc_refs.len());
        for loc in loc_refs {
            transaction_locations.push(fileref::resolve_pathref(&self.locations(), loc)?);
        }
        if self.transactions.contains_key(&transaction_hash) {
            return Err(Error::DuplicateTransaction(transaction_hash));
        }
        self.verify_transaction(&transaction_locations, block_timestamp, &transaction)?;
        let mut state = TransactionState::new(transaction, block_idx);
        let own_fpr = self.fpr.clone();
        state.remove_pending_participant(&own_fpr)?;
        self.transactions.insert(transaction_hash, state);
        Ok(())
    }

    fn verify_sign_transaction(
        &mut self,
        gpg: &Fingerprint,
        transaction_ref: &crate::action::TransactionRef,
        block: &FileRef,
        block_ref: &FileRef,
        block_sig: &FileRef,
    ) -> Result<()> {
        self.verify_fpr(gpg)?;
        let transaction_hash = transaction_ref.sha512.to_string();
        let locations = self.locations();
        let block_bytes = fileref::load(&locations, block)?;
        let blockref_bytes = fileref::load(&locations, block_ref)?;
        let sig_bytes = fileref::load(&locations, block_sig)?;
        let peer_block = self.check_block_sig(gpg, &block_bytes, &blockref_bytes, &sig_bytes)?;
        let peer_blockref: BlockRef = crate::block::from_canonical_json(&blockref_bytes)?;

        let state = self.transactions.get(&transaction_hash).ok_or_else(|| Error::NotFound(transaction_hash.clone()))?;
        if state.status != TransactionStatus::Pending {
            return Err(Error::StateTransitionDenied { from: state.status, to: TransactionStatus::Pending });
        }
        state.transaction.check_window(peer_block.timestamp)?;
        if !block_registers_transaction(&transaction_hash, &peer_block) {
            return Err(Error::NotFound(format!("registration for {transaction_hash} in peer block")));
        }

        let state = self.transactions.get_mut(&transaction_hash).expect("checked above");
        state.remove_pending_participant(gpg)?;
        state.signatures.insert(gpg.clone(), peer_blockref);
        Ok(())
    }

    fn verify_confirm_transaction(&mut self, transaction_ref: &crate::action::TransactionRef) -> Result<()> {
        let transaction_hash = transaction_ref.sha512.to_string();
        let state = self
            .transactions
            .get_mut(&transaction_hash)
            .ok_or_else(|| Error::NotFound(transaction_hash.clone()))?;
        if !state.pending_participants.is_empty() {
            return Err(Error::StateTransitionDenied { from: state.status, to: TransactionStatus::Confirmed });
        }
        state.transition_to(TransactionStatus::Confirmed)
    }

    fn verify_cancel_transaction(
        &mut self,
        gpg: &Fingerprint,
        transaction_ref: &crate::action::TransactionRef,
        blocks: &[crate::action::SignedBlockRefs],
    ) -> Result<()> {
        self.verify_fpr(gpg)?;
        let transaction_hash = transaction_ref.sha512.to_string();
        {
            let state = self.transactions.get(&transaction_hash).ok_or_else(|| Error::NotFound(transaction_hash.clone()))?;
            if state.status != TransactionStatus::Pending {
                return Err(Error::StateTransitionDenied { from: state.status, to: TransactionStatus::Cancelled });
            }
            if !state.pending_participants.contains(gpg) {
                return Err(Error::InvalidParticipant(gpg.clone()));
            }
        }
        if blocks.len() < 2 {
            return Err(Error::Schema("cancel_transaction: at least 2 blocks required".into()));
        }
        let (transaction_timestamp, expiry_timestamp) = {
            let state = &self.transactions[&transaction_hash];
            (state.transaction.timestamp, state.transaction.expiry)
        };
        let locations = self.locations();
        let mut start_idx = None;
        for (i, triple) in blocks.iter().enumerate() {
            let block_bytes = fileref::load(&locations, &triple.block)?;
            let blockref_bytes = fileref::load(&locations, &triple.block_ref)?;
            let sig_bytes = fileref::load(&locations, &triple.block_sig)?;
            let block = self.check_block_sig(gpg, &block_bytes, &blockref_bytes, &sig_bytes)?;
            if block_registers_transaction(&transaction_hash, &block) {
                return Err(Error::Schema("cancel_transaction: transaction is registered".into()));
            }
            if i == 0 {
                start_idx = Some(block.idx);
                if transaction_timestamp < block.timestamp {
                    return Err(Error::BadTimestamp("cancel_transaction: first block is too recent".into()));
                }
            } else if block.idx != start_idx.unwrap() + i as u64 {
                return Err(Error::Schema("cancel_transaction: blocks are not in sequence".into()));
            }
            if i == blocks.len() - 1 && !(expiry_timestamp < block.timestamp) {
                return Err(Error::BadTimestamp("cancel_transaction: last block is too old".into()));
            }
        }
        self.transactions.get_mut(&transaction_hash).unwrap().transition_to(TransactionStatus::Cancelled)
    }

    fn verify_annul_transaction(&mut self, transaction_ref: &crate::action::TransactionRef, explanation: &str) -> Result<()> {
        if explanation.is_empty() {
            return Err(Error::Schema("annul_transaction: explanation required".into()));
        }
        let transaction_hash = transaction_ref.sha512.to_string();
        let state = self
            .transactions
            .get_mut(&transaction_hash)
            .ok_or_else(|| Error::NotFound(transaction_hash.clone()))?;
        state.transition_to(TransactionStatus::Annulled)
    }

    fn verify_reinstate_transaction(&mut self, transaction_ref: &crate::action::TransactionRef) -> Result<()> {
        let transaction_hash = transaction_ref.sha512.to_string();
        let state = self
            .transactions
            .get_mut(&transaction_hash)
            .ok_or_else(|| Error::NotFound(transaction_hash.clone()))?;
        state.transition_to(TransactionStatus::Confirmed)
    }

    fn verify_add_extra_connection(&mut self, gpg: &Fingerprint, block_ref: &FileRef, block_sig: &FileRef) -> Result<()> {
        self.verify_fpr(gpg)?;
        let locations = self.locations();
        let ref_bytes = fileref::load(&locations, block_ref)?;
        let sig_bytes = fileref::load(&locations, block_sig)?;
        let blockref = self.check_blockref_sig(gpg, &ref_bytes, &sig_bytes)?;
        self.extra_connections.insert(gpg.clone(), blockref);
        Ok(())
    }

    fn verify_signed_tag(&mut self, gpg: &Fingerprint, git_repo: &crate::fileref::PathRef) -> Result<()> {
        self.verify_fpr(gpg)?;
        let repodir = fileref::resolve_pathref(&self.locations(), git_repo)?;
        let commit_id = self.vcs.current_commit(&repodir)?;
        let signers = self.signer.list_signed_tags(&repodir, &commit_id)?;
        if !signers.contains(gpg) {
            return Err(Error::NoSignedTag(gpg.clone()));
        }
        Ok(())
    }
}

fn block_registers_transaction(transaction_hash: &str, block: &Block) -> bool {
    block.actions.iter().any(|action| match action {
        Action::RegisterTransaction { transaction, .. } => transaction.sha512.to_string() == transaction_hash,
        _ => false,
    })
}

/// Every `Annulled` state reached by a Verifier, by transaction hash - used
/// by the dependency checker's no-cherry-pick rule.
pub fn annulled_transactions<S: BlockStore, G: Signer, V: Vcs>(verifier: &Verifier<S, G, V>) -> BTreeSet<String> {
    verifier
        .transactions
        .iter()
        .filter(|(_, state)| state.status == TransactionStatus::Annulled)
        .map(|(hash, _)| hash.clone())
        .collect()
}

#[cfg(feature = "test-util")]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FakeSigner, FakeVcs, InMemoryStore};

    fn bootstrap_verifier() -> (Verifier<InMemoryStore, FakeSigner, FakeVcs>, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let signer = FakeSigner::new();
        let fpr = signer.generate_identity("owner");
        std::fs::write(dir.path().join(PUBKEY_FILENAME), fpr.as_str().as_bytes()).unwrap();
        let store = InMemoryStore::new();
        let vcs = FakeVcs::new();
        let verifier = Verifier::new(dir.path().to_path_buf(), store, signer, vcs).unwrap();
        (verifier, dir.path().to_path_buf())
    }

    #[test]
    fn new_verifier_knows_its_own_key() {
        let (verifier, _dir) = bootstrap_verifier();
        assert!(verifier.known_keys.contains_key(&verifier.fpr));
    }

    #[test]
    fn remove_extra_connection_without_entry_is_an_error() {
        let (mut verifier, _dir) = bootstrap_verifier();
        let fpr = Fingerprint::new("nobody");
        let err = verifier
            .verify_action(Utc::now(), 0, &Action::RemoveExtraConnection { gpg: fpr })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
