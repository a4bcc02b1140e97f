//! Plugin error types.

use certpilot_common::{DomainName, VirtualHostId};
use thiserror::Error;

use crate::challenge::ChallengeStatus;
use crate::installer::Feature;

/// Errors reported by plugins and the checkpoint store.
///
/// Plugins never swallow these; the orchestrator alone decides whether an
/// error triggers a rollback or is handed straight to the caller.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configuration state could not be read or written
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A checkpoint in the rollback range could not be restored
    #[error("rollback stopped after {restored} checkpoint(s): {reason}")]
    Rollback { restored: usize, reason: String },

    /// Permanent save without a title under the `reject` policy
    #[error("permanent checkpoint requires a title")]
    UntitledCheckpoint,

    #[error("no virtual host serves '{0}'")]
    NoMatchingHost(DomainName),

    #[error("{feature} is not supported for virtual host '{vhost}'")]
    UnsupportedFeature { feature: Feature, vhost: VirtualHostId },

    /// Staged configuration rejected by `config_test`
    #[error("configuration test failed: {0}")]
    Config(String),

    #[error("server restart failed: {0}")]
    Restart(String),

    #[error("invalid challenge state: expected {expected}, found {actual}")]
    InvalidState {
        expected: ChallengeStatus,
        actual: ChallengeStatus,
    },

    /// Certificate authority collaborator failure
    #[error("certificate authority error: {0}")]
    Authority(String),
}

impl PluginError {
    /// Wrap an IO failure while reading or writing configuration state
    pub fn persistence(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        PluginError::Persistence(format!("{}: {}", context, err))
    }
}

/// One domain's challenge could not be performed or verified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("challenge for '{domain}' failed: {reason}")]
pub struct ChallengeFailure {
    pub domain: DomainName,
    pub reason: String,
}

impl ChallengeFailure {
    pub fn new(domain: DomainName, reason: impl Into<String>) -> Self {
        Self {
            domain,
            reason: reason.into(),
        }
    }
}
