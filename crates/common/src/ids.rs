//! Type-safe identifier newtypes for certpilot.
//!
//! These types provide compile-time safety for identifiers, preventing
//! accidental mixing of different ID types (e.g., passing a virtual host
//! identifier where a domain name is expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest host name accepted, in bytes.
pub const MAX_DOMAIN_LEN: usize = 253;

/// Rejected domain name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid domain name '{name}': {reason}")]
pub struct InvalidDomainName {
    pub name: String,
    pub reason: &'static str,
}

/// Domain name to be authenticated and covered by a certificate.
///
/// Names are trimmed and lower-cased on construction so that a request
/// for `Example.COM` and `example.com` resolves to the same set member.
/// A single leading `*.` wildcard label is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Parse and normalize a domain name
    pub fn new(name: impl AsRef<str>) -> Result<Self, InvalidDomainName> {
        let raw = name.as_ref();
        let normalized = raw.trim().trim_end_matches('.').to_ascii_lowercase();

        let reject = |reason| InvalidDomainName {
            name: raw.to_string(),
            reason,
        };

        if normalized.is_empty() {
            return Err(reject("empty"));
        }
        if normalized.len() > MAX_DOMAIN_LEN {
            return Err(reject("longer than 253 bytes"));
        }
        if normalized
            .chars()
            .any(|c| c == '/' || c == ':' || c.is_whitespace())
        {
            return Err(reject("contains '/', ':' or whitespace"));
        }

        let body = normalized.strip_prefix("*.").unwrap_or(&normalized);
        if body.split('.').any(|label| label.is_empty()) {
            return Err(reject("empty label"));
        }
        if body.contains('*') {
            return Err(reject("wildcard is only allowed as the first label"));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a `*.` wildcard name
    pub fn is_wildcard(&self) -> bool {
        self.0.starts_with("*.")
    }

    /// Check whether this name (possibly a wildcard) covers `other`.
    ///
    /// A wildcard covers exactly one additional label: `*.example.com`
    /// covers `www.example.com` but neither `example.com` nor
    /// `a.b.example.com`.
    pub fn covers(&self, other: &DomainName) -> bool {
        if self == other {
            return true;
        }
        match self.0.strip_prefix("*.") {
            Some(suffix) => other
                .0
                .strip_suffix(suffix)
                .and_then(|head| head.strip_suffix('.'))
                .is_some_and(|label| !label.is_empty() && !label.contains('.')),
            None => false,
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DomainName {
    type Err = InvalidDomainName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DomainName {
    type Error = InvalidDomainName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DomainName> for String {
    fn from(name: DomainName) -> Self {
        name.0
    }
}

/// Virtual host identifier.
///
/// Assigned by an installer; the orchestrator only passes it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VirtualHostId(String);

impl VirtualHostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VirtualHostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of one issuance-and-deploy cycle.
///
/// Cycle IDs are attached to every log event emitted while a cycle runs,
/// enabling log correlation across plugins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(String);

impl CycleId {
    /// Create a new random cycle ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checkpoint identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Create a new random checkpoint ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_name_normalized() {
        let name = DomainName::new("  WWW.Example.COM. ").unwrap();
        assert_eq!(name.as_str(), "www.example.com");
        assert_eq!(name, "www.example.com".parse().unwrap());
    }

    #[test]
    fn test_domain_name_rejects_invalid() {
        assert!(DomainName::new("").is_err());
        assert!(DomainName::new("example.com/path").is_err());
        assert!(DomainName::new("example.com:443").is_err());
        assert!(DomainName::new("exa mple.com").is_err());
        assert!(DomainName::new("a..b").is_err());
        assert!(DomainName::new("www.*.example.com").is_err());
        assert!(DomainName::new("a".repeat(254)).is_err());
    }

    #[test]
    fn test_wildcard_covers_one_label() {
        let wildcard = DomainName::new("*.example.com").unwrap();
        assert!(wildcard.is_wildcard());
        assert!(wildcard.covers(&DomainName::new("www.example.com").unwrap()));
        assert!(!wildcard.covers(&DomainName::new("example.com").unwrap()));
        assert!(!wildcard.covers(&DomainName::new("a.b.example.com").unwrap()));
        assert!(!wildcard.covers(&DomainName::new("www.example.org").unwrap()));
    }

    #[test]
    fn test_domain_name_serde() {
        let name: DomainName = serde_json::from_str("\"Example.com\"").unwrap();
        assert_eq!(name.as_str(), "example.com");
        assert!(serde_json::from_str::<DomainName>("\"bad/name\"").is_err());
    }

    #[test]
    fn test_cycle_ids_unique() {
        assert_ne!(CycleId::new(), CycleId::new());
    }

    #[test]
    fn test_virtual_host_id() {
        let id = VirtualHostId::new("example-site");
        assert_eq!(id.as_str(), "example-site");
        assert_eq!(id.to_string(), "example-site");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normalization_is_idempotent(name in "[A-Za-z0-9-]{1,20}(\\.[A-Za-z0-9-]{1,20}){0,3}") {
            let once = DomainName::new(&name).unwrap();
            let twice = DomainName::new(once.as_str()).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
