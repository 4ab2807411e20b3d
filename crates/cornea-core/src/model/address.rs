use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Globally unique identifier of one remote entity:
/// `<scope>:<namespace>:<id>`, e.g. `DRIV:dev:1234` or `SERV:subs:1`.
///
/// The only join key between the cache, sources, and network requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap a raw string without validating it.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parse and validate an address. Scope and namespace must be
    /// non-empty; the id may be empty (service addresses).
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut parts = raw.splitn(3, ':');
        let scope = parts.next().unwrap_or_default();
        let namespace = parts.next().unwrap_or_default();
        match parts.next() {
            Some(_) if !scope.is_empty() && !namespace.is_empty() => Ok(Self(raw.to_owned())),
            _ => Err(CoreError::InvalidAddress {
                address: raw.to_owned(),
            }),
        }
    }

    /// Service address for a namespace, e.g. `SERV:subs:`.
    pub fn service(namespace: &str, id: &str) -> Self {
        Self(format!("SERV:{namespace}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scope(&self) -> &str {
        self.segment(0)
    }

    /// Second segment; selects the typed view (`dev`, `subs`, ...).
    pub fn namespace(&self) -> &str {
        self.segment(1)
    }

    pub fn id(&self) -> &str {
        self.segment(2)
    }

    fn segment(&self, index: usize) -> &str {
        self.0.splitn(3, ':').nth(index).unwrap_or_default()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
