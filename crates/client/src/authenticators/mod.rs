//! Reference authenticators.
//!
//! Both publish HTTP-01 key authorizations; they differ only in where:
//!
//! - [`StandaloneAuthenticator`]: a shared in-process [`ChallengeRegistry`]
//! - [`WebrootAuthenticator`]: files under `<webroot>/.well-known/acme-challenge/`

mod http01;
mod registry;

pub use http01::{Http01Challenge, Placement};
pub use registry::{ChallengeRegistry, ACME_CHALLENGE_PREFIX};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use certpilot_common::DomainName;
use certpilot_plugin_api::{
    cleanup_all, perform_all, Authenticator, Challenge, ChallengeFailure, ChallengeKind,
    ChallengeOutcome, ChallengeSpec, PluginError,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Challenges performed by one authenticator and not yet cleaned up
#[derive(Default)]
struct ChallengeBatch {
    challenges: Mutex<Vec<Box<dyn Challenge>>>,
}

impl ChallengeBatch {
    async fn perform(
        &self,
        specs: BTreeMap<DomainName, ChallengeSpec>,
        placement: &Placement,
        quiet: bool,
    ) -> BTreeMap<DomainName, ChallengeOutcome> {
        let mut outcomes = BTreeMap::new();
        let mut batch: Vec<Box<dyn Challenge>> = Vec::with_capacity(specs.len());

        for (domain, spec) in specs {
            if spec.kind != ChallengeKind::Http01 {
                let reason = format!("{} challenges are not supported", spec.kind);
                outcomes.insert(domain.clone(), Err(ChallengeFailure::new(domain, reason)));
                continue;
            }
            batch.push(Box::new(Http01Challenge::new(spec, placement.clone())));
        }

        // Owned before the first await so a dropped perform still gets
        // cleaned up; the lock keeps a concurrent cleanup out until then
        let mut owned = self.challenges.lock().await;
        let start = owned.len();
        owned.extend(batch);
        outcomes.extend(perform_all(&mut owned[start..], quiet).await);

        let failed = outcomes.values().filter(|o| o.is_err()).count();
        info!(
            domains = outcomes.len(),
            failed = failed,
            "Challenge batch performed"
        );
        outcomes
    }

    async fn cleanup(&self) -> Result<(), PluginError> {
        let mut owned = self.challenges.lock().await;
        cleanup_all(&mut owned).await
    }

    async fn pending(&self) -> usize {
        self.challenges.lock().await.len()
    }
}

// ============================================================================
// Standalone
// ============================================================================

/// Publishes key authorizations in a [`ChallengeRegistry`] served by an
/// embedding HTTP server.
pub struct StandaloneAuthenticator {
    registry: ChallengeRegistry,
    batch: ChallengeBatch,
    quiet: bool,
}

impl StandaloneAuthenticator {
    pub fn new(registry: ChallengeRegistry) -> Self {
        Self {
            registry,
            batch: ChallengeBatch::default(),
            quiet: false,
        }
    }

    /// Log per-challenge progress at debug level
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn registry(&self) -> &ChallengeRegistry {
        &self.registry
    }

    /// Challenges awaiting cleanup
    pub async fn pending(&self) -> usize {
        self.batch.pending().await
    }
}

#[async_trait]
impl Authenticator for StandaloneAuthenticator {
    fn name(&self) -> &str {
        "standalone"
    }

    async fn perform(
        &self,
        challenges: BTreeMap<DomainName, ChallengeSpec>,
    ) -> Result<BTreeMap<DomainName, ChallengeOutcome>, PluginError> {
        let placement = Placement::Registry(self.registry.clone());
        Ok(self.batch.perform(challenges, &placement, self.quiet).await)
    }

    async fn cleanup(&self) -> Result<(), PluginError> {
        let result = self.batch.cleanup().await;
        debug!(
            still_registered = self.registry.pending_count(),
            "Standalone challenges cleaned up"
        );
        result
    }
}

// ============================================================================
// Webroot
// ============================================================================

/// Writes key authorizations below a directory the web server already
/// serves.
pub struct WebrootAuthenticator {
    webroot: PathBuf,
    batch: ChallengeBatch,
    quiet: bool,
}

impl WebrootAuthenticator {
    pub fn new(webroot: impl Into<PathBuf>) -> Self {
        Self {
            webroot: webroot.into(),
            batch: ChallengeBatch::default(),
            quiet: false,
        }
    }

    /// Log per-challenge progress at debug level
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn webroot(&self) -> &Path {
        &self.webroot
    }

    /// Challenges awaiting cleanup
    pub async fn pending(&self) -> usize {
        self.batch.pending().await
    }
}

#[async_trait]
impl Authenticator for WebrootAuthenticator {
    fn name(&self) -> &str {
        "webroot"
    }

    async fn perform(
        &self,
        challenges: BTreeMap<DomainName, ChallengeSpec>,
    ) -> Result<BTreeMap<DomainName, ChallengeOutcome>, PluginError> {
        if !tokio::fs::metadata(&self.webroot)
            .await
            .is_ok_and(|meta| meta.is_dir())
        {
            return Err(PluginError::Config(format!(
                "webroot {} is not a directory",
                self.webroot.display()
            )));
        }
        debug!(webroot = %self.webroot.display(), "Using webroot");

        let placement = Placement::Webroot(self.webroot.clone());
        Ok(self.batch.perform(challenges, &placement, self.quiet).await)
    }

    async fn cleanup(&self) -> Result<(), PluginError> {
        self.batch.cleanup().await
    }
}
