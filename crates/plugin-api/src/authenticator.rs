//! Authenticator contract.
//!
//! An authenticator receives every domain of one issuance request in a
//! single batch, so implementations can share setup work across names
//! (one webroot check, one DNS zone update, ...).

use std::collections::BTreeMap;

use async_trait::async_trait;
use certpilot_common::DomainName;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::challenge::{Challenge, ChallengeResponse, ChallengeSpec};
use crate::errors::{ChallengeFailure, PluginError};

/// Result of one domain's challenge
pub type ChallengeOutcome = Result<ChallengeResponse, ChallengeFailure>;

/// Authenticator capability set.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Short plugin name used in logs
    fn name(&self) -> &str;

    /// Perform one challenge per domain.
    ///
    /// Per-domain failures are reported in the returned map rather than
    /// aborting the batch. An `Err` means the batch could not start at all.
    /// Every challenge created here stays owned by the authenticator until
    /// [`Authenticator::cleanup`].
    async fn perform(
        &self,
        challenges: BTreeMap<DomainName, ChallengeSpec>,
    ) -> Result<BTreeMap<DomainName, ChallengeOutcome>, PluginError>;

    /// Release every challenge this authenticator was asked to perform,
    /// whatever its outcome.
    async fn cleanup(&self) -> Result<(), PluginError>;
}

/// Perform a batch of challenges concurrently and wait for all of them.
///
/// Each domain maps to its response or to the reason it failed.
pub async fn perform_all(
    challenges: &mut [Box<dyn Challenge>],
    quiet: bool,
) -> BTreeMap<DomainName, ChallengeOutcome> {
    let attempts = challenges.iter_mut().map(|challenge| async move {
        let domain = challenge.spec().domain.clone();
        let outcome = match challenge.perform(quiet).await {
            Ok(()) => challenge.generate_response(),
            Err(e) => Err(e),
        };
        let outcome = outcome.map_err(|e| ChallengeFailure::new(domain.clone(), e.to_string()));
        (domain, outcome)
    });

    join_all(attempts).await.into_iter().collect()
}

/// Clean up every challenge, continuing past failures.
///
/// The vector is drained; the last error encountered, if any, is returned
/// once all challenges have been visited.
pub async fn cleanup_all(challenges: &mut Vec<Box<dyn Challenge>>) -> Result<(), PluginError> {
    let mut last_error = None;
    let count = challenges.len();

    for mut challenge in challenges.drain(..) {
        if let Err(e) = challenge.cleanup().await {
            warn!(
                domain = %challenge.spec().domain,
                error = %e,
                "Challenge cleanup failed"
            );
            last_error = Some(e);
        }
    }

    debug!(count = count, "Cleaned up challenges");
    last_error.map_or(Ok(()), Err)
}
