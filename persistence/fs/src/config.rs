// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Rootdir-relative configuration: paths to the `gpg`/`git` binaries and the
//! signed-tag verification timeout. Not part of the ledger's on-chain data -
//! purely local operator knobs, loaded from `<rootdir>/covenant.toml` if
//! present.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const CONFIG_FILENAME: &str = "covenant.toml";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to (or bare name of, to resolve via `PATH`) the `gpg` binary.
    pub gpg_binary: String,
    /// Path to (or bare name of) the `git` binary.
    pub git_binary: String,
    /// Seconds to wait for a `git verify-tag` subprocess before giving up.
    pub signed_tag_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config { gpg_binary: "gpg".to_owned(), git_binary: "git".to_owned(), signed_tag_timeout_secs: 30 }
    }
}

impl Config {
    /// Loads `<rootdir>/covenant.toml`, or the default config if absent.
    pub fn load(rootdir: &Path) -> Result<Self> {
        let path = rootdir.join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_config_file_is_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.gpg_binary, "gpg");
        assert_eq!(config.signed_tag_timeout_secs, 30);
    }

    #[test]
    fn partial_config_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("covenant.toml"), "git_binary = \"/usr/bin/git\"\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.gpg_binary, "gpg");
        assert_eq!(config.git_binary, "/usr/bin/git");
    }
}
