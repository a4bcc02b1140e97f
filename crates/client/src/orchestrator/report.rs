//! Cycle outcomes.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use certpilot_common::{CycleId, DomainName};
use certpilot_plugin_api::{ChallengeFailure, CheckpointRef, PluginError, VirtualHost};
use thiserror::Error;

use super::state::CycleState;

/// Summary of a successful cycle
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub domains: BTreeSet<DomainName>,
    pub virtual_hosts: Vec<VirtualHost>,
    /// Durable checkpoint the cycle committed
    pub checkpoint: CheckpointRef,
    /// Every state the cycle passed through
    pub states: Vec<CycleState>,
    /// Authenticator cleanup failure; the deployment itself stands
    pub cleanup_error: Option<PluginError>,
}

/// Why a cycle stopped
#[derive(Error, Debug)]
pub enum CycleFailure {
    #[error("no domains to request")]
    NoDomains,

    #[error("{} challenge(s) failed: {}", .0.len(), join(.0))]
    Challenges(Vec<ChallengeFailure>),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("cycle timed out after {0:?}")]
    Timeout(Duration),
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What happened to the installer's configuration after a failure
#[derive(Debug, Default)]
pub enum Recovery {
    /// The cycle failed before touching the configuration
    #[default]
    NotRequired,
    /// Every checkpoint taken by the cycle was rolled back
    RolledBack { checkpoints: usize },
    /// Rollback or the recovery restart failed
    Incomplete(Vec<PluginError>),
}

impl Recovery {
    pub fn is_complete(&self) -> bool {
        !matches!(self, Recovery::Incomplete(_))
    }
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovery::NotRequired => write!(f, "configuration untouched"),
            Recovery::RolledBack { checkpoints } => {
                write!(f, "rolled back {} checkpoint(s)", checkpoints)
            }
            Recovery::Incomplete(errors) => write!(f, "recovery incomplete: {}", join(errors)),
        }
    }
}

/// A cycle that did not reach `Done`.
///
/// Carries the original cause alongside any secondary failures from
/// rollback, recovery restart or authenticator cleanup.
#[derive(Error, Debug)]
#[error("cycle {cycle_id} aborted during {stage}: {cause} ({recovery})")]
pub struct CycleAborted {
    pub cycle_id: CycleId,
    /// Last state before the failure
    pub stage: CycleState,
    #[source]
    pub cause: CycleFailure,
    pub recovery: Recovery,
    pub cleanup_error: Option<PluginError>,
}
