// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Magic constants embedded in every on-disk record: a fixed 36-character
//! UUID-shaped identifier per record kind. A one-byte change to any of these
//! fails schema validation, which lets a human grep an arbitrary file tree
//! for covenant records.

/// Current wire-format version. Bumped on any breaking change to canonical
/// encoding.
pub const VERSION: u32 = 1;

pub const BLOCK_MAGIC: &str = "7d1c9e2a-2f4b-4b8e-9a6d-1e7c4f0a8b31";
pub const BLOCKREF_MAGIC: &str = "c3a5f7d1-6e2b-4a9c-8d0f-2b6a9e1c4d57";
pub const TRANSACTION_MAGIC: &str = "9e4b2d6f-1a8c-4e3b-b5d7-3c9f6a2e0d14";
pub const FILEREF_MAGIC: &str = "2f8d6c4a-5b1e-4d9a-a3c7-6e2b8f4a1d90";
