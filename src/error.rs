// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The closed set of errors a Verifier, Builder, Coordinator or Dependency
//! Checker can raise. Every verification failure is fatal to the operation
//! that raised it; callers see it via `Result`, never a partial mutation of
//! in-memory state.

use std::io;

use crate::fpr::Fingerprint;
use crate::transaction::TransactionStatus;

/// Everything that can go wrong while verifying, building or coordinating a
/// chain.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// a record failed schema validation - {0}
    Schema(String),

    /// content digest mismatch: expected {expected}, found {found}
    HashMismatch { expected: String, found: String },

    /// signature does not verify under the claimed fingerprint
    SignatureInvalid,

    /// imported key fingerprint {imported} does not match the declared fingerprint {declared}
    FprMismatch { declared: Fingerprint, imported: Fingerprint },

    /// timestamp ordering violated - {0}
    BadTimestamp(String),

    /// transaction {0} is already registered
    DuplicateTransaction(String),

    /// fingerprint {0} is not a known key on this chain
    UnknownKey(Fingerprint),

    /// fingerprint {0} is already banned
    AlreadyBanned(Fingerprint),

    /// transaction cannot move from {from:?} to {to:?}
    StateTransitionDenied { from: TransactionStatus, to: TransactionStatus },

    /// {0} is not a valid participant of this transaction
    InvalidParticipant(Fingerprint),

    /// no signed tag under fingerprint {0} points at the current commit
    NoSignedTag(Fingerprint),

    /// block store layout is inconsistent at index {0}
    LayoutCorruption(u64),

    /// resolved path escapes its location root
    PathEscape,

    /// {0} was not found
    NotFound(String),

    /// {0}
    #[from]
    Io(io::Error),

    /// malformed JSON - {0}
    #[from]
    Json(serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
