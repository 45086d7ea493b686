// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The closed set of things a block can do. Dynamic dispatch on a `"type"`
//! string in the source record becomes a tagged enum here, so the
//! interpreter's `match` is exhaustive and a new variant is a compile error
//! everywhere it isn't handled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fileref::{FileRef, PathRef};
use crate::fpr::Fingerprint;
use crate::hash::Digest;

/// A transaction reference by content digest, as embedded in an action
/// payload (mirrors the `{"SHA-512": ...}` shape of a loaded transaction
/// fileref without repeating the whole fileref).
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct TransactionRef {
    #[serde(rename = "SHA-512")]
    pub sha512: Digest,
}

/// A signed-block triple: the block body, its blockref, and the detached
/// signature over the blockref.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct SignedBlockRefs {
    pub block: FileRef,
    pub block_ref: FileRef,
    pub block_sig: FileRef,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ContractAuthor {
    pub gpg: Fingerprint,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct SmartContractRef {
    pub path: PathRef,
    pub uuid_hash: FileRef,
    pub authors: Vec<ContractAuthor>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "import_gpg_key")]
    ImportGpgKey { gpg: Fingerprint, keyfile: FileRef, git_remote_urls: BTreeMap<String, String> },

    #[serde(rename = "ban")]
    Ban {
        gpg: Fingerprint,
        keyfile: FileRef,
        git_remote_urls: BTreeMap<String, String>,
        block_ref1: FileRef,
        block_sig1: FileRef,
        block_ref2: FileRef,
        block_sig2: FileRef,
    },

    #[serde(rename = "register_transaction")]
    RegisterTransaction { transaction: FileRef, locations: Vec<PathRef> },

    #[serde(rename = "sign_transaction")]
    SignTransaction {
        gpg: Fingerprint,
        transaction: TransactionRef,
        block: FileRef,
        block_ref: FileRef,
        block_sig: FileRef,
    },

    #[serde(rename = "confirm_transaction")]
    ConfirmTransaction { transaction: TransactionRef },

    #[serde(rename = "cancel_transaction")]
    CancelTransaction { gpg: Fingerprint, transaction: TransactionRef, blocks: Vec<SignedBlockRefs> },

    #[serde(rename = "annul_transaction")]
    AnnulTransaction { transaction: TransactionRef, explanation: String },

    #[serde(rename = "reinstate_transaction")]
    ReinstateTransaction { transaction: TransactionRef },

    #[serde(rename = "add_extra_connection")]
    AddExtraConnection { gpg: Fingerprint, block_ref: FileRef, block_sig: FileRef },

    #[serde(rename = "remove_extra_connection")]
    RemoveExtraConnection { gpg: Fingerprint },

    #[serde(rename = "verify_signed_tag")]
    VerifySignedTag { gpg: Fingerprint, git_repo: PathRef },

    #[serde(rename = "link_file")]
    LinkFile { file: FileRef },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn dummy_fileref() -> FileRef {
        FileRef {
            magic: crate::magic::FILEREF_MAGIC.to_owned(),
            locidx: 0,
            filename: "f".to_owned(),
            sha512: hash_bytes(b"x"),
        }
    }

    #[test]
    fn tag_roundtrips_through_json() {
        let action = Action::LinkFile { file: dummy_fileref() };
        let encoded = serde_json::to_string(&action).unwrap();
        assert!(encoded.contains("\"type\":\"link_file\""));
        let decoded: Action = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, action);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = r#"{"type":"not_a_real_action"}"#;
        assert!(serde_json::from_str::<Action>(raw).is_err());
    }
}
