//! Plugin wiring.
//!
//! Builds the concrete plugins named in a [`Config`] and hands them to the
//! orchestrator as trait objects.

use std::sync::Arc;

use certpilot_config::{AuthenticatorKind, Config};
use certpilot_plugin_api::{Authenticator, PluginError};
use tracing::info;

use crate::authenticators::{ChallengeRegistry, StandaloneAuthenticator, WebrootAuthenticator};
use crate::authority::{Observer, StaticAuthority};
use crate::display::LogDisplay;
use crate::installer::FileInstaller;
use crate::orchestrator::{CycleOptions, Orchestrator};

/// Open the configured installer
pub fn open_installer(config: &Config) -> Result<FileInstaller, PluginError> {
    FileInstaller::open(config.installer.clone(), &config.checkpoints)
}

/// Build the configured authenticator and where its responses can be
/// observed
pub fn build_authenticator(
    config: &Config,
) -> Result<(Arc<dyn Authenticator>, Observer), PluginError> {
    match config.authenticator.kind {
        AuthenticatorKind::Standalone => {
            let registry = ChallengeRegistry::new();
            let authenticator: Arc<dyn Authenticator> =
                Arc::new(StandaloneAuthenticator::new(registry.clone()));
            Ok((authenticator, Observer::Registry(registry)))
        }
        AuthenticatorKind::Webroot => {
            let webroot = config.authenticator.webroot.clone().ok_or_else(|| {
                PluginError::Config("webroot authenticator requires 'webroot'".to_string())
            })?;
            let authenticator: Arc<dyn Authenticator> =
                Arc::new(WebrootAuthenticator::new(webroot.clone()));
            Ok((authenticator, Observer::Webroot(webroot)))
        }
    }
}

/// Build an orchestrator for issuance cycles
pub fn build_orchestrator(config: &Config, display: LogDisplay) -> Result<Orchestrator, PluginError> {
    let authority_config = config.authority.clone().ok_or_else(|| {
        PluginError::Config("an [authority] section is required to run a cycle".to_string())
    })?;

    let installer = open_installer(config)?;
    let (authenticator, observer) = build_authenticator(config)?;
    let authority = StaticAuthority::new(authority_config).with_observer(observer);

    info!(
        authenticator = authenticator.name(),
        installer = "file",
        "Plugins ready"
    );

    Ok(Orchestrator::new(
        Arc::new(authority),
        authenticator,
        Box::new(installer),
        Arc::new(display),
        CycleOptions::from(&config.cycle),
    ))
}
