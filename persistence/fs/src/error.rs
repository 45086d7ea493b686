// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Errors local to the filesystem backend: configuration loading and chain
//! setup, which sit outside the `covenant::Error` surface because they
//! happen before a `Verifier` exists to report into.

use std::io;

/// Failures opening or initializing a filesystem-backed chain.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// {0}
    #[from]
    Io(io::Error),

    /// malformed configuration - {0}
    #[from]
    Config(toml::de::Error),

    /// rootdir '{0}' already has a non-empty blockchain directory
    NotEmpty(String),
}

pub type Result<T> = std::result::Result<T, Error>;
