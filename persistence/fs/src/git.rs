// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! `Vcs` backed by the `git` binary, shelled out to exactly the way
//! `git_repo_current_commit_id`/`git_repo_remote_urls` inspect a checkout.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use covenant::error::{Error, Result};
use covenant::vcs::Vcs;

pub struct GitVcs {
    git_binary: String,
}

impl GitVcs {
    pub fn new(git_binary: String) -> Self { GitVcs { git_binary } }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.git_binary)
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map_err(|e| Error::Schema(format!("spawning git: {e}")))?;
        if !output.status.success() {
            return Err(Error::Schema(format!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

impl Vcs for GitVcs {
    fn current_commit(&self, dir: &Path) -> Result<String> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.display().to_string()));
        }
        let commit_id = self.run(dir, &["rev-parse", "HEAD"])?;
        u64::from_str_radix(&commit_id[..commit_id.len().min(16)], 16)
            .map_err(|_| Error::Schema(format!("not a commit id: {commit_id}")))?;
        Ok(commit_id)
    }

    fn remote_urls(&self, dir: &Path) -> Result<BTreeMap<String, String>> {
        let names = self.run(dir, &["remote"])?;
        let mut urls = BTreeMap::new();
        for name in names.lines() {
            let url = self.run(dir, &["config", "--get", &format!("remote.{name}.url")])?;
            urls.insert(name.to_owned(), url);
        }
        Ok(urls)
    }

    fn init(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.run(dir, &["init"])?;
        Ok(())
    }
}
