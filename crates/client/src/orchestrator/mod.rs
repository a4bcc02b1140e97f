//! Issuance-and-deploy cycle.
//!
//! The [`Orchestrator`] drives one cycle through its [`CycleState`]s using
//! only the plugin traits. It alone decides whether a failure is rolled
//! back; plugins just report errors.
//!
//! Guarantees per cycle:
//!
//! - nothing is deployed unless every domain's challenge was verified
//! - a failure at or after `Deploying` rolls back every checkpoint the
//!   cycle took, the permanent one included
//! - authenticator cleanup runs on every path, including cancellation

mod options;
mod report;
mod state;

pub use options::CycleOptions;
pub use report::{CycleAborted, CycleFailure, CycleReport, Recovery};
pub use state::CycleState;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use certpilot_common::{CycleId, DomainName, VirtualHostId};
use certpilot_config::RedirectPolicy;
use certpilot_plugin_api::{
    Authenticator, CertificateAuthority, ChallengeFailure, CheckpointRef, Display, Feature,
    Installer, PluginError, Validator, VirtualHost,
};
use futures::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Installer shared between the orchestrator and CLI commands
pub type SharedInstaller = Arc<Mutex<Box<dyn Installer>>>;

/// Runs issuance-and-deploy cycles against one set of plugins.
pub struct Orchestrator {
    authority: Arc<dyn CertificateAuthority>,
    authenticator: Arc<dyn Authenticator>,
    installer: SharedInstaller,
    display: Arc<dyn Display>,
    validator: Option<Arc<dyn Validator>>,
    options: CycleOptions,
}

impl Orchestrator {
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        authenticator: Arc<dyn Authenticator>,
        installer: Box<dyn Installer>,
        display: Arc<dyn Display>,
        options: CycleOptions,
    ) -> Self {
        Self {
            authority,
            authenticator,
            installer: Arc::new(Mutex::new(installer)),
            display,
            validator: None,
            options,
        }
    }

    /// Check the deployment after a successful cycle
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn installer(&self) -> SharedInstaller {
        Arc::clone(&self.installer)
    }

    pub fn options(&self) -> &CycleOptions {
        &self.options
    }

    /// Run one cycle for `domains`, or for every name the installer serves
    /// when `None`.
    pub async fn run(
        &self,
        domains: Option<BTreeSet<DomainName>>,
    ) -> Result<CycleReport, CycleAborted> {
        let cycle_id = CycleId::new();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        self.run_cycle(cycle_id, domains).instrument(span).await
    }

    async fn run_cycle(
        &self,
        cycle_id: CycleId,
        requested: Option<BTreeSet<DomainName>>,
    ) -> Result<CycleReport, CycleAborted> {
        let mut cycle = Cycle::new(cycle_id);
        let cleanup = CleanupGuard::new(Arc::clone(&self.authenticator));

        let outcome = match self.options.cycle_timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, self.drive(&mut cycle, requested)).await;
                match timed {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(timeout = ?limit, state = %cycle.progress.state, "Cycle timed out");
                        Err(CycleFailure::Timeout(limit))
                    }
                }
            }
            None => self.drive(&mut cycle, requested).await,
        };

        match outcome {
            Ok(checkpoint) => {
                let cleanup_error = cleanup.run().await.err();
                self.display.success_installation(&cycle.domains);
                self.validate(&cycle.domains, &cycle.features).await;

                info!(
                    domains = cycle.domains.len(),
                    checkpoint = %checkpoint.title,
                    "Cycle completed"
                );

                Ok(CycleReport {
                    cycle_id: cycle.id,
                    domains: cycle.domains,
                    virtual_hosts: cycle.vhosts,
                    checkpoint,
                    states: cycle.progress.states,
                    cleanup_error,
                })
            }
            Err(cause) => {
                let stage = cycle.progress.state;
                error!(stage = %stage, error = %cause, "Cycle failed");

                let recovery = self.recover(&mut cycle).await;
                cycle.progress.enter(CycleState::Failed);
                // Release the installer before waiting on cleanup
                cycle.installer = None;
                let cleanup_error = cleanup.run().await.err();

                Err(CycleAborted {
                    cycle_id: cycle.id,
                    stage,
                    cause,
                    recovery,
                    cleanup_error,
                })
            }
        }
    }

    /// Forward path; returns the committed checkpoint.
    ///
    /// Everything recovery needs is recorded in `cycle` as it happens, so
    /// this future may be dropped at any await point.
    async fn drive(
        &self,
        cycle: &mut Cycle,
        requested: Option<BTreeSet<DomainName>>,
    ) -> Result<CheckpointRef, CycleFailure> {
        // ---------------------------------------------------------------
        // Resolve hosts
        // ---------------------------------------------------------------
        cycle.progress.enter(CycleState::ResolvingHosts);
        {
            let installer = self.installer.lock().await;
            let domains = match requested {
                Some(domains) => domains,
                None => self.display.filter_names(&installer.get_all_names()),
            };
            if domains.is_empty() {
                return Err(CycleFailure::NoDomains);
            }

            let mut vhosts: BTreeMap<VirtualHostId, VirtualHost> = BTreeMap::new();
            for domain in &domains {
                let vhost = installer.choose_virtual_host(domain)?;
                debug!(domain = %domain, vhost = %vhost.id, new = vhost.is_new, "Resolved virtual host");
                vhosts.entry(vhost.id.clone()).or_insert(vhost);
            }

            cycle.domains = domains;
            cycle.vhosts = vhosts.into_values().collect();
        }
        info!(
            domains = cycle.domains.len(),
            virtual_hosts = cycle.vhosts.len(),
            "Resolved virtual hosts"
        );

        // ---------------------------------------------------------------
        // Challenge
        // ---------------------------------------------------------------
        cycle.progress.enter(CycleState::Challenging);
        let specs = self.authority.challenges(&cycle.domains).await?;
        let outcomes = self.authenticator.perform(specs.clone()).await?;

        let mut failures = Vec::new();
        let mut responses = Vec::new();
        for domain in &cycle.domains {
            match (specs.get(domain), outcomes.get(domain)) {
                (Some(spec), Some(Ok(response))) => responses.push((spec, response)),
                (_, Some(Err(failure))) => failures.push(failure.clone()),
                (None, _) => failures.push(ChallengeFailure::new(
                    domain.clone(),
                    "authority issued no challenge",
                )),
                (Some(_), None) => failures.push(ChallengeFailure::new(
                    domain.clone(),
                    "authenticator reported no outcome",
                )),
            }
        }
        if !failures.is_empty() {
            return Err(CycleFailure::Challenges(failures));
        }

        // ---------------------------------------------------------------
        // Verify and issue
        // ---------------------------------------------------------------
        cycle.progress.enter(CycleState::Verifying);
        let limit = self.options.verify_timeout;
        let checks = responses.iter().map(|(spec, response)| async move {
            match tokio::time::timeout(limit, self.authority.verify(spec, response)).await {
                Ok(result) => result,
                Err(_) => Err(ChallengeFailure::new(
                    spec.domain.clone(),
                    format!("verification timed out after {:?}", limit),
                )),
            }
        });
        let failures: Vec<ChallengeFailure> = join_all(checks)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if !failures.is_empty() {
            return Err(CycleFailure::Challenges(failures));
        }
        info!(domains = responses.len(), "All challenges verified");

        let bundle = self.authority.issue(&cycle.domains).await?;
        cycle.features = self.features();

        // ---------------------------------------------------------------
        // Deploy
        // ---------------------------------------------------------------
        cycle.progress.enter(CycleState::Deploying);
        let installer = cycle
            .installer
            .insert(Arc::clone(&self.installer).lock_owned().await);

        let anchor = installer.save(None, true)?;
        debug!(seq = anchor.seq, "Anchor checkpoint taken");
        cycle.anchor = Some(anchor.clone());
        cycle.latest = Some(anchor);

        for vhost in &cycle.vhosts {
            installer.deploy_cert(vhost, &bundle)?;
            for feature in &cycle.features {
                installer.enable_feature(*feature, vhost)?;
            }
        }
        cycle.latest = Some(installer.save(None, true)?);

        // ---------------------------------------------------------------
        // Test and commit
        // ---------------------------------------------------------------
        cycle.progress.enter(CycleState::TestingConfig);
        installer.config_test().await?;

        cycle.progress.enter(CycleState::Committing);
        let committed = installer.save(self.options.checkpoint_title.as_deref(), false)?;
        cycle.latest = Some(committed.clone());

        cycle.restart_attempted = true;
        installer.restart().await?;

        cycle.installer = None;
        cycle.progress.enter(CycleState::Done);
        Ok(committed)
    }

    fn features(&self) -> Vec<Feature> {
        let mut features = Vec::new();
        if self.options.enable_site {
            features.push(Feature::Site);
        }
        let redirect = match self.options.redirect {
            RedirectPolicy::On => true,
            RedirectPolicy::Off => false,
            RedirectPolicy::Ask => self.display.redirect_by_default(),
        };
        if redirect {
            features.push(Feature::Redirect);
        }
        if self.options.hsts {
            features.push(Feature::Hsts);
        }
        if self.options.ocsp_stapling {
            features.push(Feature::OcspStapling);
        }
        features
    }

    /// Undo every checkpoint the cycle took and, if the server may have
    /// picked up the new configuration, restart it on the restored one.
    async fn recover(&self, cycle: &mut Cycle) -> Recovery {
        if !cycle.progress.state.mutates_configuration() {
            return Recovery::NotRequired;
        }
        cycle.progress.enter(CycleState::RollingBack);

        let (Some(anchor), Some(latest)) = (cycle.anchor.clone(), cycle.latest.clone()) else {
            debug!("Failed before the anchor checkpoint, nothing to roll back");
            return Recovery::NotRequired;
        };

        let mut installer = match cycle.installer.take() {
            Some(installer) => installer,
            None => Arc::clone(&self.installer).lock_owned().await,
        };

        let count = anchor.rollback_count_through(&latest);
        let mut errors = Vec::new();

        match installer.rollback_checkpoints(count) {
            Ok(()) => info!(checkpoints = count, "Rolled back cycle checkpoints"),
            Err(e) => {
                error!(checkpoints = count, error = %e, "Rollback failed");
                errors.push(e);
            }
        }

        if cycle.restart_attempted {
            // Never restart on an untested configuration
            match installer.config_test().await {
                Ok(()) => match installer.restart().await {
                    Ok(()) => info!("Restarted server on restored configuration"),
                    Err(e) => {
                        error!(error = %e, "Recovery restart failed");
                        errors.push(e);
                    }
                },
                Err(e) => {
                    error!(error = %e, "Restored configuration failed its test, not restarting");
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Recovery::RolledBack { checkpoints: count }
        } else {
            Recovery::Incomplete(errors)
        }
    }

    /// Post-deployment checks for the features the cycle deployed;
    /// mismatches are reported, never fatal
    async fn validate(&self, domains: &BTreeSet<DomainName>, features: &[Feature]) {
        let Some(validator) = &self.validator else {
            return;
        };

        if !validator.https(domains).await {
            warn!("HTTPS check failed after deployment");
        }
        for domain in domains {
            if features.contains(&Feature::Redirect) && !validator.redirect(domain).await {
                warn!(domain = %domain, "Redirect check failed");
            }
            if features.contains(&Feature::Hsts) && !validator.hsts(domain).await {
                warn!(domain = %domain, "HSTS check failed");
            }
            if features.contains(&Feature::OcspStapling) && !validator.ocsp_stapling(domain).await {
                warn!(domain = %domain, "OCSP stapling check failed");
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("authenticator", &self.authenticator.name())
            .field("has_validator", &self.validator.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// Cycle bookkeeping
// ============================================================================

/// States visited so far
#[derive(Debug)]
struct Progress {
    state: CycleState,
    states: Vec<CycleState>,
}

impl Progress {
    fn enter(&mut self, next: CycleState) {
        debug_assert!(
            self.state.can_advance(next),
            "illegal cycle transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Cycle transition");
        self.state = next;
        self.states.push(next);
    }
}

struct Cycle {
    id: CycleId,
    progress: Progress,
    domains: BTreeSet<DomainName>,
    vhosts: Vec<VirtualHost>,
    /// Features enabled on every virtual host, decided once per cycle
    features: Vec<Feature>,
    /// Held from `Deploying` until the cycle is committed or recovered
    installer: Option<OwnedMutexGuard<Box<dyn Installer>>>,
    /// First checkpoint taken by the cycle
    anchor: Option<CheckpointRef>,
    /// Most recent checkpoint taken by the cycle
    latest: Option<CheckpointRef>,
    restart_attempted: bool,
}

impl Cycle {
    fn new(id: CycleId) -> Self {
        Self {
            id,
            progress: Progress {
                state: CycleState::Start,
                states: vec![CycleState::Start],
            },
            domains: BTreeSet::new(),
            vhosts: Vec::new(),
            features: Vec::new(),
            installer: None,
            anchor: None,
            latest: None,
            restart_attempted: false,
        }
    }
}

/// Runs authenticator cleanup exactly when the cycle ends, even if the
/// cycle future is dropped first.
struct CleanupGuard {
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl CleanupGuard {
    fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator: Some(authenticator),
        }
    }

    async fn run(mut self) -> Result<(), PluginError> {
        let result = match &self.authenticator {
            Some(authenticator) => authenticator.cleanup().await,
            None => Ok(()),
        };
        self.authenticator = None;
        if let Err(e) = &result {
            warn!(error = %e, "Authenticator cleanup failed");
        }
        result
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(authenticator) = self.authenticator.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Cycle cancelled, cleaning up challenges in the background");
                handle.spawn(async move {
                    if let Err(e) = authenticator.cleanup().await {
                        error!(error = %e, "Background challenge cleanup failed");
                    }
                });
            }
            Err(_) => error!("Cycle cancelled outside a runtime, challenges were not cleaned up"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use certpilot_plugin_api::ChallengeOutcome;
    use certpilot_plugin_api::ChallengeSpec;

    struct CountingAuthenticator {
        cleanups: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        fn name(&self) -> &str {
            "counting"
        }

        async fn perform(
            &self,
            challenges: BTreeMap<DomainName, ChallengeSpec>,
        ) -> Result<BTreeMap<DomainName, ChallengeOutcome>, PluginError> {
            Ok(challenges
                .into_iter()
                .map(|(domain, spec)| (domain, Ok(spec.expected_response())))
                .collect())
        }

        async fn cleanup(&self) -> Result<(), PluginError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cleanup_guard_runs_once() {
        let authenticator = Arc::new(CountingAuthenticator {
            cleanups: AtomicUsize::new(0),
        });

        let guard = CleanupGuard::new(authenticator.clone());
        guard.run().await.unwrap();

        assert_eq!(authenticator.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_guard_spawns_on_drop() {
        let authenticator = Arc::new(CountingAuthenticator {
            cleanups: AtomicUsize::new(0),
        });

        drop(CleanupGuard::new(authenticator.clone()));
        for _ in 0..50 {
            if authenticator.cleanups.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(authenticator.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_progress_records_states() {
        let mut cycle = Cycle::new(CycleId::new());
        cycle.progress.enter(CycleState::ResolvingHosts);
        cycle.progress.enter(CycleState::Failed);

        assert_eq!(
            cycle.progress.states,
            vec![CycleState::Start, CycleState::ResolvingHosts, CycleState::Failed]
        );
    }
}
