// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

use covenant::store::BlockStore;
use covenant_fs::FsBlockStore;

#[test]
fn writes_and_reads_back_a_block_triple() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlockStore::new(dir.path().to_path_buf());
    assert_eq!(store.block_count().unwrap(), 0);
    assert_eq!(store.most_recent().unwrap(), None);

    store.write_block(0, b"block0", b"ref0", b"sig0").unwrap();
    assert_eq!(store.read_block_bytes(0).unwrap(), b"block0");
    assert_eq!(store.read_blockref_bytes(0).unwrap(), b"ref0");
    assert_eq!(store.read_sig_bytes(0).unwrap(), b"sig0");
    assert_eq!(store.block_count().unwrap(), 1);
    assert_eq!(store.most_recent().unwrap(), Some(0));

    store.write_block(1, b"block1", b"ref1", b"sig1").unwrap();
    assert_eq!(store.block_count().unwrap(), 2);
    assert_eq!(store.most_recent().unwrap(), Some(1));
}

#[test]
fn a_gap_in_indices_is_layout_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlockStore::new(dir.path().to_path_buf());
    store.write_block(0, b"block0", b"ref0", b"sig0").unwrap();
    store.write_block(2, b"block2", b"ref2", b"sig2").unwrap();
    assert!(store.block_count().is_err());
}
