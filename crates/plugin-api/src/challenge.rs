//! Challenge contract and its lifecycle state machine.
//!
//! A challenge is one proof-of-control unit for one domain:
//!
//! ```text
//! Pending ──perform──> Performed ──cleanup──> CleanedUp
//!    │                     │                     ▲
//!    └──perform fails──> Failed ──cleanup────────┘
//! ```
//!
//! `cleanup` is accepted from every state, so an authenticator can always
//! release what it was asked to place.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use certpilot_common::DomainName;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::PluginError;

/// Proof-of-control mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeKind {
    /// Key authorization served at `/.well-known/acme-challenge/<token>`
    Http01,
    /// Digest of the key authorization published as a TXT record
    Dns01,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeKind::Http01 => write!(f, "http-01"),
            ChallengeKind::Dns01 => write!(f, "dns-01"),
        }
    }
}

/// Challenge parameters supplied by the certificate authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSpec {
    pub domain: DomainName,
    pub kind: ChallengeKind,
    /// Random token chosen by the authority
    pub token: String,
    /// Account key thumbprint bound into the key authorization
    pub thumbprint: String,
}

impl ChallengeSpec {
    /// `token.thumbprint`
    pub fn key_authorization(&self) -> String {
        format!("{}.{}", self.token, self.thumbprint)
    }

    /// The response a correctly performed challenge produces
    pub fn expected_response(&self) -> ChallengeResponse {
        ChallengeResponse {
            kind: self.kind,
            key_authorization: self.key_authorization(),
        }
    }
}

/// Response payload produced by a performed challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub kind: ChallengeKind,
    pub key_authorization: String,
}

impl ChallengeResponse {
    /// Value the authority expects to observe.
    ///
    /// HTTP-01 serves the key authorization verbatim; DNS-01 publishes the
    /// unpadded base64url SHA-256 digest of it.
    pub fn published_value(&self) -> String {
        match self.kind {
            ChallengeKind::Http01 => self.key_authorization.clone(),
            ChallengeKind::Dns01 => {
                URL_SAFE_NO_PAD.encode(Sha256::digest(self.key_authorization.as_bytes()))
            }
        }
    }
}

/// Lifecycle status of a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeStatus {
    Pending,
    Performed,
    Failed,
    CleanedUp,
}

impl ChallengeStatus {
    /// Whether `self -> next` is a legal transition
    pub fn can_advance(self, next: ChallengeStatus) -> bool {
        use ChallengeStatus::*;
        matches!(
            (self, next),
            (Pending, Performed)
                | (Pending, Failed)
                | (Performed, Failed)
                | (_, CleanedUp)
        )
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: ChallengeStatus) -> Result<(), PluginError> {
        if !self.can_advance(next) {
            return Err(PluginError::InvalidState {
                expected: next.required_predecessor(),
                actual: *self,
            });
        }
        *self = next;
        Ok(())
    }

    fn required_predecessor(self) -> ChallengeStatus {
        match self {
            ChallengeStatus::Failed => ChallengeStatus::Performed,
            _ => ChallengeStatus::Pending,
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Performed => "performed",
            ChallengeStatus::Failed => "failed",
            ChallengeStatus::CleanedUp => "cleaned-up",
        };
        write!(f, "{}", s)
    }
}

/// Challenge capability set.
///
/// Implementations must honour three rules:
///
/// - `perform` succeeds at most once; a second call returns
///   [`PluginError::InvalidState`].
/// - `generate_response` has no side effects and returns the same value on
///   every call after a successful `perform`.
/// - `cleanup` never fails because there is nothing to clean: it succeeds
///   after a failed or skipped `perform` and when called repeatedly.
#[async_trait]
pub trait Challenge: Send + Sync {
    fn spec(&self) -> &ChallengeSpec;

    fn status(&self) -> ChallengeStatus;

    /// Place whatever the authority needs to observe.
    ///
    /// `quiet` lowers the log level of progress messages.
    async fn perform(&mut self, quiet: bool) -> Result<(), PluginError>;

    fn generate_response(&self) -> Result<ChallengeResponse, PluginError>;

    async fn cleanup(&mut self) -> Result<(), PluginError>;
}

/// Check that a challenge is in `Performed` state before building its
/// response
pub fn ensure_performed(status: ChallengeStatus) -> Result<(), PluginError> {
    if status == ChallengeStatus::Performed {
        Ok(())
    } else {
        Err(PluginError::InvalidState {
            expected: ChallengeStatus::Performed,
            actual: status,
        })
    }
}
