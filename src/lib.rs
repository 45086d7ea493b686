// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

#![deny(dead_code, unused_variables, unused_mut, unused_imports, non_upper_case_globals, non_camel_case_types, non_snake_case)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Covenant maintains a per-user, cryptographically signed, append-only
//! ledger ("chain") that records identity imports, multi-party
//! transactions, bans, and dependency links between chains. Chains
//! reference each other by signed block digest, forming a directed graph of
//! trust.
//!
//! This crate covers the Verifier (the block/action state machine), the
//! Chain Builder (atomic block creation), the Transaction Coordinator
//! (cross-chain multi-party agreement), and the Dependency Checker
//! (consistency of a chain's transitive references). It has no filesystem
//! or subprocess code of its own beyond reading/writing files it has
//! already been handed a path to: signing and version control are injected
//! through the [`Signer`] and [`Vcs`] traits so a concrete backend, such as
//! one shelling out to `gpg` and `git`, lives entirely outside this crate.

#[macro_use]
extern crate amplify;

pub mod action;
pub mod block;
pub mod bootstrap;
pub mod builder;
pub mod coordinator;
pub mod dependency;
pub mod error;
pub mod fileref;
pub mod fpr;
pub mod hash;
pub mod magic;
pub mod signer;
pub mod store;
pub mod transaction;
pub mod vcs;
pub mod verifier;

#[cfg(feature = "test-util")]
pub mod test_util;

pub use action::Action;
pub use block::{Block, BlockRef};
pub use error::{Error, Result};
pub use fileref::{FileRef, PathRef};
pub use fpr::Fingerprint;
pub use hash::Digest;
pub use signer::Signer;
pub use store::BlockStore;
pub use transaction::{Transaction, TransactionStatus};
pub use vcs::Vcs;
pub use verifier::Verifier;
