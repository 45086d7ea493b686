// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! The multi-party transaction lifecycle - register, sign, confirm, annul,
//! reinstate, and expiry cancellation - plus the dependency checker's
//! no-cherry-pick rule on annulments. Same `FsBlockStore` + fake
//! signer/VCS harness as `tests/coordinator.rs`: real on-disk block layout
//! (`create_transaction`/`confirm_transactions` read raw block files
//! directly), deterministic signing.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::Duration;
use covenant::bootstrap;
use covenant::builder::{self, ProtoBlock};
use covenant::coordinator::{self, ParticipantSeed};
use covenant::dependency;
use covenant::error::Error;
use covenant::fileref::{create_fileref, create_pathref, FileRef};
use covenant::fpr::Fingerprint;
use covenant::signer::Signer;
use covenant::store::BlockStore;
use covenant::test_util::{FakeSigner, FakeVcs};
use covenant::vcs::Vcs;
use covenant::verifier::Verifier;
use covenant::action::Action;
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

fn transaction_reldir(fileref: &FileRef) -> String {
    fileref.filename.strip_suffix("/transaction.json").expect("transaction fileref under a dated directory").to_owned()
}

/// Mirrors what `create_transaction` does for each participant it doesn't
/// already know - imports the missing key from that peer's real rootdir -
/// then appends the shared `register_transaction` action. Every participant
/// runs this independently against their own chain, pointed at their own
/// copy of the transaction file at the same relative path.
fn register_transaction_for<S: BlockStore, G: Signer, V: Vcs>(
    verifier: &mut Verifier<S, G, V>,
    others: &[(Fingerprint, &Path)],
    reldir: &str,
    transaction_fileref: &FileRef,
) -> covenant::error::Result<u64> {
    let mut actions = Vec::new();
    for (i, (fpr, rootdir)) in others.iter().enumerate() {
        if verifier.known_keys.contains_key(fpr) {
            continue;
        }
        let key_relpath = format!("{reldir}/import_{i}.key");
        let key_bytes = std::fs::read(rootdir.join("public.key"))?;
        std::fs::write(verifier.rootdir.join(&key_relpath), &key_bytes)?;
        let keyfile = create_fileref(&verifier.rootdir, 0, &key_relpath)?;
        actions.push(Action::ImportGpgKey { gpg: fpr.clone(), keyfile, git_remote_urls: Default::default() });
    }
    let locations = vec![create_pathref(0, reldir)];
    actions.push(Action::RegisterTransaction { transaction: transaction_fileref.clone(), locations });
    builder::append_block(verifier, ProtoBlock::new(actions))
}

fn copy_transaction_file(from_rootdir: &Path, to_rootdir: &Path, reldir: &str) {
    let relpath = format!("{reldir}/transaction.json");
    std::fs::create_dir_all(to_rootdir.join(reldir)).unwrap();
    std::fs::copy(from_rootdir.join(&relpath), to_rootdir.join(&relpath)).unwrap();
}

/// Imports a peer's public key on its own, outside of any transaction -
/// needed before `this` can vouch for a peer it has never otherwise heard
/// of via `add_extra_connection`.
fn import_peer_key<S: BlockStore, G: Signer, V: Vcs>(
    verifier: &mut Verifier<S, G, V>,
    peer_fpr: &Fingerprint,
    peer_rootdir: &Path,
) -> covenant::error::Result<u64> {
    let key_relpath = format!("imported_{peer_fpr}.key");
    let key_bytes = std::fs::read(peer_rootdir.join("public.key"))?;
    std::fs::write(verifier.rootdir.join(&key_relpath), &key_bytes)?;
    let keyfile = create_fileref(&verifier.rootdir, 0, &key_relpath)?;
    let action = Action::ImportGpgKey { gpg: peer_fpr.clone(), keyfile, git_remote_urls: Default::default() };
    builder::append_block(verifier, ProtoBlock::new(vec![action]))
}

#[test]
fn confirms_annuls_reinstates_and_enforces_the_no_cherry_pick_rule() {
    let (alice_dir, mut alice) = init_identity("alice");
    let (bob_dir, mut bob) = init_identity("bob");
    let (carol_dir, mut carol) = init_identity("carol");

    let peers = vec![
        ParticipantSeed { rootdir: alice_dir.path().to_path_buf() },
        ParticipantSeed { rootdir: bob_dir.path().to_path_buf() },
        ParticipantSeed { rootdir: carol_dir.path().to_path_buf() },
    ];
    let (protoblock, transaction_fileref) =
        coordinator::create_transaction(&alice, &peers, Duration::hours(1), vec![]).unwrap();
    builder::append_block(&mut alice, protoblock).unwrap();
    let hash = alice.transactions.keys().next().unwrap().clone();

    let reldir = transaction_reldir(&transaction_fileref);
    copy_transaction_file(&alice.rootdir, &bob.rootdir, &reldir);
    copy_transaction_file(&alice.rootdir, &carol.rootdir, &reldir);
    register_transaction_for(
        &mut bob,
        &[(alice.fpr.clone(), alice_dir.path()), (carol.fpr.clone(), carol_dir.path())],
        &reldir,
        &transaction_fileref,
    )
    .unwrap();
    register_transaction_for(
        &mut carol,
        &[(alice.fpr.clone(), alice_dir.path()), (bob.fpr.clone(), bob_dir.path())],
        &reldir,
        &transaction_fileref,
    )
    .unwrap();

    // Two participants (bob, carol) are still pending: `confirm_only` must
    // refuse to close this out early rather than silently skip it.
    let err = coordinator::confirm_transactions(&mut alice, &mut bob, true).unwrap_err();
    assert!(matches!(err, Error::Schema(_)));

    // `sign_transactions` semantics: record bob's signature without forcing
    // confirmation, since carol is still outstanding.
    coordinator::confirm_transactions(&mut alice, &mut bob, false).unwrap();
    assert_eq!(alice.transactions[&hash].status, covenant::transaction::TransactionStatus::Pending);
    assert!(alice.transactions[&hash].pending_participants.contains(&carol.fpr));

    // Carol is the last pending participant: even `confirm_only=true` may
    // close it out now.
    coordinator::confirm_transactions(&mut alice, &mut carol, true).unwrap();
    assert_eq!(alice.transactions[&hash].status, covenant::transaction::TransactionStatus::Confirmed);
    assert!(alice.transactions[&hash].pending_participants.is_empty());

    coordinator::annul_transaction(&mut alice, &hash, "duplicate settlement").unwrap();
    assert_eq!(alice.transactions[&hash].status, covenant::transaction::TransactionStatus::Annulled);

    coordinator::reinstate_transaction(&mut alice, &hash).unwrap();
    assert_eq!(alice.transactions[&hash].status, covenant::transaction::TransactionStatus::Confirmed);

    coordinator::annul_transaction(&mut alice, &hash, "duplicate settlement, confirmed").unwrap();

    // Detached case: bob and carol are absent from the dependency closure
    // altogether, so the annulment gets the benefit of the doubt.
    let mut detached_view = BTreeMap::new();
    let alice_fpr = alice.fpr.clone();
    detached_view.insert(alice_fpr.clone(), alice);
    let detached_view = dependency::check_dependency_chain(detached_view, alice_fpr.clone()).unwrap();
    let alice = detached_view.into_values().next().unwrap();

    // Attached case: bob and carol are both present and have already
    // replayed past the block their signatures point to, so the annulment
    // is no longer detached - the no-cherry-pick rule must reject it.
    let mut attached_view = BTreeMap::new();
    attached_view.insert(alice.fpr.clone(), alice);
    attached_view.insert(bob.fpr.clone(), bob);
    attached_view.insert(carol.fpr.clone(), carol);
    let err = dependency::check_dependency_chain(attached_view, alice_fpr).unwrap_err();
    assert!(matches!(err, Error::Schema(_)));
}

#[test]
fn cancels_a_transaction_that_its_peer_never_registered_before_expiry() {
    let (alice_dir, mut alice) = init_identity("alice2");
    let (dave_dir, mut dave) = init_identity("dave");

    let peers =
        vec![ParticipantSeed { rootdir: alice_dir.path().to_path_buf() }, ParticipantSeed { rootdir: dave_dir.path().to_path_buf() }];
    let (protoblock, _transaction_fileref) =
        coordinator::create_transaction(&alice, &peers, Duration::milliseconds(200), vec![]).unwrap();
    builder::append_block(&mut alice, protoblock).unwrap();
    let hash = alice.transactions.keys().next().unwrap().clone();

    // Dave never sees (or never registers) the transaction. Wait for it to
    // expire, then have him do something else - proof he kept operating
    // past the deadline without ever registering it.
    std::thread::sleep(StdDuration::from_millis(400));
    import_peer_key(&mut dave, &alice.fpr.clone(), alice_dir.path()).unwrap();
    coordinator::add_extra_connection(&mut dave, &alice, 0).unwrap();

    coordinator::confirm_transactions(&mut alice, &mut dave, false).unwrap();
    assert_eq!(alice.transactions[&hash].status, covenant::transaction::TransactionStatus::Cancelled);
}
