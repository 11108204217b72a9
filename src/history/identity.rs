//! Contact identity derived from a transport address

use std::fmt;

use crate::{Error, Result};

/// Stable storage key for a conversational counterpart
///
/// Built from a transport address such as `15551234567@c.us` by dropping
/// everything from the first `@`. The result is used as a directory name,
/// so separators and parent references are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Normalize a transport address into an identity
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentity` if nothing usable remains after
    /// stripping, or if the result could escape the history directory
    pub fn from_address(address: &str) -> Result<Self> {
        let local = address
            .trim()
            .split_once('@')
            .map_or_else(|| address.trim(), |(local, _)| local)
            .trim();

        if local.is_empty() {
            return Err(Error::InvalidIdentity(format!("empty identity in {address:?}")));
        }
        if local == "." || local.contains("..") {
            return Err(Error::InvalidIdentity(format!("parent reference in {address:?}")));
        }
        if local
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(Error::InvalidIdentity(format!("illegal character in {address:?}")));
        }

        Ok(Self(local.to_string()))
    }

    /// The normalized key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
