// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Stable identifiers for public signing keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An OpenPGP fingerprint: an opaque, stable identifier for a public signing
/// key. Covenant never interprets the contents, only compares and stores it.
#[derive(Wrapper, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Serialize, Deserialize)]
#[wrapper(Deref)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(s: impl Into<String>) -> Self { Fingerprint(s.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl FromStr for Fingerprint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Fingerprint(s.to_owned())) }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self { Fingerprint(s.to_owned()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_its_raw_string() {
        let fpr = Fingerprint::new("ABCD1234");
        assert_eq!(fpr.to_string(), "ABCD1234");
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(Fingerprint::new("x"), Fingerprint::from("x"));
        assert_ne!(Fingerprint::new("x"), Fingerprint::new("y"));
    }
}
