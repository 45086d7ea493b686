// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Filesystem persistence for covenant chains: a `BlockStore` that lays
//! blocks out under `blockchain/`, a `Signer` backed by the `gpg` binary, a
//! `Vcs` backed by `git`, and `FsChain`, the concrete handle the CLI drives.

#[macro_use]
extern crate amplify;

pub mod chain;
pub mod config;
pub mod error;
pub mod git;
pub mod gpg;
pub mod store;

pub use chain::{create, open, open_lazy, FsVerifier};
pub use config::Config;
pub use error::{Error, Result};
pub use git::GitVcs;
pub use gpg::GpgSigner;
pub use store::FsBlockStore;
