// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Multi-party transactions and the four-state machine that tracks each
//! one's progress through a single chain's Verifier.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::BlockRef;
use crate::error::{Error, Result};
use crate::fileref::{FileRef, PathRef};
use crate::fpr::Fingerprint;
use crate::magic::{TRANSACTION_MAGIC, VERSION};

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Participant {
    pub gpg: Fingerprint,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Contract {
    pub path: PathRef,
    pub uuid_hash: FileRef,
    pub authors: Vec<Participant>,
}

/// A multi-party agreement, stored as a standalone file and referenced from
/// a block by its digest.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub pyom_version: u32,
    pub pyom_transaction_magic: String,
    pub timestamp: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub participants: Vec<Participant>,
    pub contracts: Vec<Contract>,
    pub numlocations: usize,
}

impl Transaction {
    pub fn new(
        timestamp: DateTime<Utc>,
        expiry: DateTime<Utc>,
        participants: Vec<Participant>,
        contracts: Vec<Contract>,
        numlocations: usize,
    ) -> Self {
        Transaction {
            pyom_version: VERSION,
            pyom_transaction_magic: TRANSACTION_MAGIC.to_owned(),
            timestamp,
            expiry,
            participants,
            contracts,
            numlocations,
        }
    }

    pub fn check_magic(&self) -> Result<()> {
        if self.pyom_transaction_magic != TRANSACTION_MAGIC {
            return Err(Error::Schema(format!("bad transaction magic: {}", self.pyom_transaction_magic)));
        }
        if self.pyom_version != VERSION {
            return Err(Error::Schema(format!("bad transaction version: {}", self.pyom_version)));
        }
        Ok(())
    }

    /// `transaction.timestamp < block.timestamp < transaction.expiry`,
    /// compared on parsed instants rather than the underlying ISO-8601
    /// strings so a timezone-offset difference never produces a false
    /// rejection.
    pub fn check_window(&self, block_timestamp: DateTime<Utc>) -> Result<()> {
        if !(self.timestamp < block_timestamp) {
            return Err(Error::BadTimestamp("transaction registered before it was created".into()));
        }
        if !(block_timestamp < self.expiry) {
            return Err(Error::BadTimestamp("transaction registered after it expired".into()));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Cancelled,
    Annulled,
}

impl TransactionStatus {
    /// The four permitted transitions: Pending->Confirmed, Pending->Cancelled,
    /// Confirmed->Annulled, Annulled->Confirmed. Every other pair is denied.
    pub fn can_transition_to(self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!((self, to), (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Annulled) | (Annulled, Confirmed))
    }
}

/// In-memory bookkeeping a Verifier keeps per transaction it has registered.
#[derive(Clone, Debug)]
pub struct TransactionState {
    pub transaction: Transaction,
    pub block_idx: u64,
    pub pending_participants: BTreeSet<Fingerprint>,
    pub signatures: BTreeMap<Fingerprint, BlockRef>,
    pub status: TransactionStatus,
}

impl TransactionState {
    pub fn new(transaction: Transaction, block_idx: u64) -> Self {
        let pending_participants = transaction.participants.iter().map(|p| p.gpg.clone()).collect();
        TransactionState {
            transaction,
            block_idx,
            pending_participants,
            signatures: BTreeMap::new(),
            status: TransactionStatus::Pending,
        }
    }

    pub fn remove_pending_participant(&mut self, fpr: &Fingerprint) -> Result<()> {
        if !self.pending_participants.remove(fpr) {
            return Err(Error::InvalidParticipant(fpr.clone()));
        }
        Ok(())
    }

    pub fn transition_to(&mut self, to: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::StateTransitionDenied { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_only_the_four_specified_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Annulled));
        assert!(Annulled.can_transition_to(Confirmed));
        assert!(!Pending.can_transition_to(Annulled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn rejects_illegal_transition() {
        let transaction = Transaction::new(Utc::now(), Utc::now(), vec![], vec![], 0);
        let mut state = TransactionState::new(transaction, 0);
        let err = state.transition_to(TransactionStatus::Annulled).unwrap_err();
        assert!(matches!(err, Error::StateTransitionDenied { .. }));
    }

    #[test]
    fn removing_unknown_participant_is_an_error() {
        let transaction = Transaction::new(Utc::now(), Utc::now(), vec![], vec![], 0);
        let mut state = TransactionState::new(transaction, 0);
        assert!(state.remove_pending_participant(&Fingerprint::new("nope")).is_err());
    }
}
