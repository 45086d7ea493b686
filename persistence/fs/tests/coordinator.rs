// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Multi-party coordination against real on-disk block layout
//! (`FsBlockStore`) but fake signing/VCS (`covenant::test_util`), so a fork
//! ban can be staged and propagated without shelling out to `gpg`/`git`.

use covenant::bootstrap;
use covenant::coordinator;
use covenant::test_util::{FakeSigner, FakeVcs};
use covenant::verifier::Verifier;
use covenant_fs::FsBlockStore;

type TestVerifier = Verifier<FsBlockStore, FakeSigner, FakeVcs>;

fn init_identity(name: &str) -> (tempfile::TempDir, TestVerifier) {
    let dir = tempfile::tempdir().unwrap();
    let store = FsBlockStore::new(dir.path().to_path_buf());
    let verifier =
        bootstrap::initialize_blockchain(dir.path().to_path_buf(), store, FakeSigner::new(), FakeVcs::new(), name.as_bytes(), None)
            .unwrap();
    (dir, verifier)
}

#[test]
fn bans_a_forked_owner_and_propagates_the_ban_to_a_third_chain() {
    // Two independently-bootstrapped chains for the same nominal owner -
    // their genesis blocks necessarily carry different timestamps, which is
    // already a valid (if minimal) fork at block 0.
    let (_fork1_dir, fork1) = init_identity("forked-owner");
    let (_fork2_dir, fork2) = init_identity("forked-owner");
    assert_eq!(fork1.fpr, fork2.fpr);

    let (_main_dir, mut main) = init_identity("main-chain");
    assert!(!main.is_banned(&fork1.fpr));

    let idx = coordinator::create_ban(&mut main, &fork1, &fork2).unwrap();
    assert_eq!(idx, 1);
    assert!(main.is_banned(&fork1.fpr));

    let (_receiver_dir, mut receiver) = init_identity("receiver-chain");
    assert!(!receiver.is_banned(&fork1.fpr));

    let appended = coordinator::copy_bans(&mut receiver, std::slice::from_ref(&main)).unwrap();
    assert_eq!(appended, vec![1]);
    assert!(receiver.is_banned(&fork1.fpr));

    // Copying again is a no-op: the ban is already known.
    let appended_again = coordinator::copy_bans(&mut receiver, std::slice::from_ref(&main)).unwrap();
    assert!(appended_again.is_empty());
}

#[test]
fn create_ban_rejects_forks_from_different_owners() {
    let (_dir1, fork1) = init_identity("owner-a");
    let (_dir2, fork2) = init_identity("owner-b");
    let (_main_dir, mut main) = init_identity("main-chain");

    let err = coordinator::create_ban(&mut main, &fork1, &fork2).unwrap_err();
    assert!(matches!(err, covenant::error::Error::Schema(_)));
}
