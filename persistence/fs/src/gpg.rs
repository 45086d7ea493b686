// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! `Signer` backed by the `gpg` binary, shelled out to with a chain-local
//! `GNUPGHOME` so importing a peer's key never touches the operator's own
//! keyring. Status parsing follows `[GNUPG:]` status-fd lines the same way
//! a signed git tag is verified for `verify_signed_tag`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use covenant::error::{Error, Result};
use covenant::fpr::Fingerprint;
use covenant::signer::Signer;
use regex::Regex;

static VALIDSIG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[GNUPG:\] VALIDSIG \S+ \S+ \S+ \S+ \S+ \S+ \S+ \S+ \S+ (\S+)").expect("static regex")
});
static IMPORT_OK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[GNUPG:\] IMPORT_OK \d+ ([0-9A-Fa-f]+)").expect("static regex"));

/// Extracts the fingerprint from a `[GNUPG:] VALIDSIG ...` status-fd line,
/// shared by signature verification and signed-tag lookup.
fn parse_validsig(text: &str) -> Option<Fingerprint> { VALIDSIG.captures(text).map(|c| Fingerprint::new(&c[1])) }

/// Extracts the fingerprint from a `[GNUPG:] IMPORT_OK ...` status-fd line.
fn parse_import_ok(text: &str) -> Option<Fingerprint> { IMPORT_OK.captures(text).map(|c| Fingerprint::new(&c[1])) }

pub struct GpgSigner {
    gnupg_home: PathBuf,
    gpg_binary: String,
    git_binary: String,
    own_fpr: Fingerprint,
}

impl GpgSigner {
    pub fn new(gnupg_home: PathBuf, gpg_binary: String, git_binary: String, own_fpr: Fingerprint) -> Self {
        GpgSigner { gnupg_home, gpg_binary, git_binary, own_fpr }
    }

    pub fn own_fpr(&self) -> &Fingerprint { &self.own_fpr }

    /// Exports `fpr`'s public key material only, even if this keyring also
    /// holds its secret key - the form meant for `public.key` and for
    /// sharing with other chains.
    pub fn export_public(&self, fpr: &Fingerprint) -> Result<Vec<u8>> {
        let (stdout, _) = self.run(&["--armor", "--export", fpr.as_str()], None)?;
        Ok(stdout)
    }

    fn run(&self, args: &[&str], stdin_data: Option<&[u8]>) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut child = Command::new(&self.gpg_binary)
            .arg("--homedir")
            .arg(&self.gnupg_home)
            .arg("--batch")
            .arg("--yes")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Schema(format!("spawning gpg: {e}")))?;
        if let Some(data) = stdin_data {
            child
                .stdin
                .take()
                .expect("stdin piped")
                .write_all(data)
                .map_err(|e| Error::Schema(format!("writing to gpg stdin: {e}")))?;
        }
        let output = child.wait_with_output().map_err(|e| Error::Schema(format!("waiting for gpg: {e}")))?;
        if !output.status.success() {
            return Err(Error::Schema(format!(
                "gpg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok((output.stdout, output.stderr))
    }
}

impl Signer for GpgSigner {
    fn sign_detached(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let (stdout, _) = self.run(
            &["--local-user", self.own_fpr.as_str(), "--detach-sign", "--armor", "-o", "-"],
            Some(bytes),
        )?;
        Ok(stdout)
    }

    fn verify_detached(&self, bytes: &[u8], sig: &[u8]) -> Result<Fingerprint> {
        let mut sig_file = tempfile::NamedTempFile::new()?;
        sig_file.write_all(sig)?;
        let mut data_file = tempfile::NamedTempFile::new()?;
        data_file.write_all(bytes)?;

        let (stdout, _) = self.run(
            &[
                "--status-fd",
                "1",
                "--verify",
                sig_file.path().to_str().expect("utf8 tmp path"),
                data_file.path().to_str().expect("utf8 tmp path"),
            ],
            None,
        )?;
        let text = String::from_utf8_lossy(&stdout);
        parse_validsig(&text).ok_or(Error::SignatureInvalid)
    }

    fn import_key(&self, key_bytes: &[u8]) -> Result<Fingerprint> {
        let (stdout, _) = self.run(&["--status-fd", "1", "--import"], Some(key_bytes))?;
        let text = String::from_utf8_lossy(&stdout);
        parse_import_ok(&text).ok_or_else(|| Error::Schema("import_key: no fingerprint found after import".into()))
    }

    fn list_signed_tags(&self, repo_dir: &Path, commit_id: &str) -> Result<Vec<Fingerprint>> {
        let list = Command::new(&self.git_binary)
            .args(["-C", &repo_dir.to_string_lossy(), "tag", "--points-at", commit_id])
            .output()
            .map_err(|e| Error::Schema(format!("spawning git: {e}")))?;
        if !list.status.success() {
            return Err(Error::Schema(format!("git tag --points-at failed: {}", String::from_utf8_lossy(&list.stderr))));
        }

        let mut fprs = Vec::new();
        for tagname in String::from_utf8_lossy(&list.stdout).lines() {
            let verify = Command::new(&self.git_binary)
                .args(["-C", &repo_dir.to_string_lossy(), "verify-tag", "--raw", tagname])
                .env("GNUPGHOME", &self.gnupg_home)
                .output()
                .map_err(|e| Error::Schema(format!("spawning git: {e}")))?;
            if !verify.status.success() {
                continue;
            }
            let stderr = String::from_utf8_lossy(&verify.stderr);
            if let Some(fpr) = parse_validsig(&stderr) {
                fprs.push(fpr);
            }
        }
        Ok(fprs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_validsig_status_line() {
        let text = "[GNUPG:] NEWSIG\n\
            [GNUPG:] VALIDSIG ABCDEF0123456789 2024-01-01 1704067200 0 4 0 1 10 00 ABCDEF0123456789\n\
            [GNUPG:] TRUST_ULTIMATE";
        assert_eq!(parse_validsig(text), Some(Fingerprint::new("ABCDEF0123456789")));
    }

    #[test]
    fn missing_validsig_is_none() {
        assert_eq!(parse_validsig("[GNUPG:] ERRSIG deadbeef"), None);
    }

    #[test]
    fn parses_import_ok_status_line() {
        let text = "[GNUPG:] IMPORTED deadbeef Alice <alice@example.com>\n\
            [GNUPG:] IMPORT_OK 1 0123456789ABCDEF0123456789ABCDEF01234567\n\
            [GNUPG:] IMPORT_RES 1 0 0 1 0 0 0 0 0 0 0 0 0 0";
        assert_eq!(parse_import_ok(text), Some(Fingerprint::new("0123456789ABCDEF0123456789ABCDEF01234567")));
    }
}
