// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end coverage against real `gpg`/`git` binaries: two independently
//! created chains exchanging an extra connection. Heavier multi-party
//! scenarios (confirmed transactions, forks, annulment) are covered at the
//! `covenant` level against `test_util`'s fakes; this file exists to prove
//! the subprocess-backed `Signer`/`Vcs` wiring itself is sound.

use std::path::Path;
use std::process::Command;

fn gpg(home: &Path, args: &[&str]) -> std::process::Output {
    Command::new("gpg").arg("--homedir").arg(home).arg("--batch").arg("--yes").args(args).output().expect("spawning gpg")
}

/// Generates a sign-only identity in a throwaway keyring (standing in for a
/// user's own `~/.gnupg`) and returns its armored secret-key export.
fn generate_identity(name: &str) -> (tempfile::TempDir, Vec<u8>) {
    let home = tempfile::tempdir().unwrap();
    let uid = format!("{name} <{name}@example.invalid>");
    let gen = gpg(
        home.path(),
        &["--pinentry-mode", "loopback", "--passphrase", "", "--quick-generate-key", &uid, "rsa2048", "sign", "0"],
    );
    assert!(gen.status.success(), "key generation failed: {}", String::from_utf8_lossy(&gen.stderr));

    let export =
        gpg(home.path(), &["--pinentry-mode", "loopback", "--passphrase", "", "--armor", "--export-secret-keys", &uid]);
    assert!(export.status.success(), "secret key export failed: {}", String::from_utf8_lossy(&export.stderr));
    (home, export.stdout)
}

#[test]
fn two_chains_exchange_an_extra_connection() {
    let (_op0, key0) = generate_identity("chain0");
    let (_op1, key1) = generate_identity("chain1");

    let dir0 = tempfile::tempdir().unwrap();
    let dir1 = tempfile::tempdir().unwrap();

    let v0 = covenant_fs::create(dir0.path().to_path_buf(), &key0, None).unwrap();
    let v1 = covenant_fs::create(dir1.path().to_path_buf(), &key1, None).unwrap();
    assert_eq!(v0.next_idx, 1);
    assert_eq!(v1.next_idx, 1);
    drop(v0);
    drop(v1);

    // Both chains persist their secret key in their own `gnupg/` directory,
    // so a fresh `open` can still sign without touching an operator keyring.
    let mut this = covenant_fs::open(dir0.path()).unwrap();
    let that = covenant_fs::open(dir1.path()).unwrap();
    let idx = covenant::coordinator::add_extra_connection(&mut this, &that, 0).unwrap();
    assert_eq!(idx, 1);

    let reopened = covenant_fs::open(dir0.path()).unwrap();
    assert!(reopened.extra_connections.contains_key(&that.fpr));

    let idx = covenant::coordinator::remove_extra_connection(&mut covenant_fs::open(dir0.path()).unwrap(), &that).unwrap();
    assert_eq!(idx, 2);
    let reopened = covenant_fs::open(dir0.path()).unwrap();
    assert!(!reopened.extra_connections.contains_key(&that.fpr));
}
