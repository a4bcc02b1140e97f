//! Configuration loading and validation for certpilot.
//!
//! Configuration is a single TOML file with kebab-case keys:
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [checkpoints]
//! dir = "/var/lib/certpilot/checkpoints"
//! untitled-save = "synthesize"
//!
//! [installer]
//! config-dir = "/etc/certpilot/server"
//! supported-features = ["redirect", "hsts", "site"]
//! test-command = ["nginx", "-t"]
//! reload-command = ["nginx", "-s", "reload"]
//!
//! [authenticator]
//! kind = "webroot"
//! webroot = "/var/www/html"
//!
//! [authority]
//! account-thumbprint = "..."
//! cert = "/var/lib/certpilot/issued/cert.pem"
//! key = "/var/lib/certpilot/issued/key.pem"
//!
//! [cycle]
//! domains = ["example.com", "www.example.com"]
//! redirect = "on"
//! ```

use std::path::{Path, PathBuf};

use certpilot_common::{DomainName, LogFormat};
use certpilot_plugin_api::Feature;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub mod validate;

pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "CERTPILOT_CONFIG";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("configuration is invalid:\n{0}")]
    Invalid(String),
}

// ============================================================================
// Top-level configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    pub installer: InstallerConfig,

    #[serde(default)]
    pub authenticator: AuthenticatorConfig,

    /// Needed only for issuance cycles
    #[serde(default)]
    pub authority: Option<AuthorityConfig>,

    #[serde(default)]
    pub cycle: CycleConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        debug!(
            domains = config.cycle.domains.len(),
            authenticator = ?config.authenticator.kind,
            "Parsed configuration"
        );
        Ok(config)
    }

    /// Run all validation checks
    pub fn validate(&self) -> ValidationResult {
        validate::validate_config(self)
    }

    /// Minimal configuration rooted at `base`, for tests and examples
    pub fn for_directory(base: &Path) -> Self {
        Self {
            logging: LoggingConfig::default(),
            checkpoints: CheckpointConfig {
                dir: base.join("checkpoints"),
                untitled_save: UntitledSavePolicy::default(),
            },
            installer: InstallerConfig {
                config_dir: base.join("server"),
                create_missing_hosts: true,
                supported_features: default_supported_features(),
                test_command: None,
                reload_command: None,
            },
            authenticator: AuthenticatorConfig::default(),
            authority: None,
            cycle: CycleConfig::default(),
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// What a permanent save without a title does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UntitledSavePolicy {
    /// Use a time-based title
    #[default]
    Synthesize,
    /// Fail the save
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub untitled_save: UntitledSavePolicy,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("/var/lib/certpilot/checkpoints")
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: default_checkpoint_dir(),
            untitled_save: UntitledSavePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstallerConfig {
    /// Directory holding the managed server configuration
    pub config_dir: PathBuf,

    /// Create a site for names no existing site serves
    #[serde(default)]
    pub create_missing_hosts: bool,

    #[serde(default = "default_supported_features")]
    pub supported_features: Vec<Feature>,

    /// Command validating the staged configuration, e.g. `["nginx", "-t"]`
    #[serde(default)]
    pub test_command: Option<Vec<String>>,

    /// Command reloading the server
    #[serde(default)]
    pub reload_command: Option<Vec<String>>,
}

fn default_supported_features() -> Vec<Feature> {
    Feature::ALL.to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorKind {
    /// In-process HTTP-01 registry served by an embedding server
    #[default]
    Standalone,
    /// HTTP-01 token files below a web root
    Webroot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthenticatorConfig {
    #[serde(default)]
    pub kind: AuthenticatorKind,

    /// Required for `webroot`
    #[serde(default)]
    pub webroot: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthorityConfig {
    pub account_thumbprint: String,

    /// PEM files of the issued certificate
    pub cert: PathBuf,
    pub key: PathBuf,
    #[serde(default)]
    pub chain: Option<PathBuf>,
}

/// Whether HTTP traffic is redirected to HTTPS after deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedirectPolicy {
    On,
    #[default]
    Off,
    /// Ask the display collaborator
    Ask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CycleConfig {
    /// Names to request; empty means every name the installer serves
    #[serde(default)]
    pub domains: Vec<DomainName>,

    #[serde(default)]
    pub redirect: RedirectPolicy,

    #[serde(default)]
    pub hsts: bool,

    #[serde(default)]
    pub ocsp_stapling: bool,

    #[serde(default = "default_true")]
    pub enable_site: bool,

    /// Per-domain verification timeout
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,

    /// Whole-cycle timeout; no limit when unset
    #[serde(default)]
    pub cycle_timeout_secs: Option<u64>,

    /// Title of the checkpoint a successful cycle leaves behind
    #[serde(default)]
    pub checkpoint_title: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_verify_timeout_secs() -> u64 {
    30
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            redirect: RedirectPolicy::default(),
            hsts: false,
            ocsp_stapling: false,
            enable_site: default_true(),
            verify_timeout_secs: default_verify_timeout_secs(),
            cycle_timeout_secs: None,
            checkpoint_title: None,
        }
    }
}

impl CycleConfig {
    /// Features that must be supported for this cycle configuration;
    /// `Ask` counts as a possible redirect
    pub fn requested_features(&self) -> Vec<Feature> {
        let mut features = Vec::new();
        if self.redirect != RedirectPolicy::Off {
            features.push(Feature::Redirect);
        }
        if self.hsts {
            features.push(Feature::Hsts);
        }
        if self.ocsp_stapling {
            features.push(Feature::OcspStapling);
        }
        if self.enable_site {
            features.push(Feature::Site);
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [logging]
        level = "debug"
        format = "json"

        [checkpoints]
        dir = "/tmp/cp"
        untitled-save = "reject"

        [installer]
        config-dir = "/tmp/server"
        create-missing-hosts = true
        supported-features = ["redirect", "site"]
        test-command = ["nginx", "-t"]

        [authenticator]
        kind = "webroot"
        webroot = "/var/www"

        [authority]
        account-thumbprint = "thumb"
        cert = "/tmp/cert.pem"
        key = "/tmp/key.pem"

        [cycle]
        domains = ["Example.com", "www.example.com"]
        redirect = "ask"
        verify-timeout-secs = 5
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(FULL).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.checkpoints.untitled_save, UntitledSavePolicy::Reject);
        assert_eq!(
            config.installer.supported_features,
            vec![Feature::Redirect, Feature::Site]
        );
        assert_eq!(config.authenticator.kind, AuthenticatorKind::Webroot);
        assert_eq!(config.cycle.domains[0].as_str(), "example.com");
        assert_eq!(config.cycle.redirect, RedirectPolicy::Ask);
        assert_eq!(config.cycle.verify_timeout_secs, 5);
        assert!(config.cycle.enable_site);
        assert!(config.authority.is_some());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("[installer]\nconfig-dir = \"/srv\"\n").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.checkpoints.untitled_save, UntitledSavePolicy::Synthesize);
        assert_eq!(config.installer.supported_features.len(), 4);
        assert_eq!(config.authenticator.kind, AuthenticatorKind::Standalone);
        assert_eq!(config.cycle.redirect, RedirectPolicy::Off);
        assert_eq!(config.cycle.verify_timeout_secs, 30);
        assert!(config.authority.is_none());
    }

    #[test]
    fn test_invalid_domain_rejected_at_parse() {
        let result = Config::from_toml(
            "[installer]\nconfig-dir = \"/srv\"\n[cycle]\ndomains = [\"bad/name\"]\n",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file("/nonexistent/certpilot.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certpilot.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.installer.config_dir, PathBuf::from("/tmp/server"));
    }

    #[test]
    fn test_requested_features() {
        let cycle = CycleConfig {
            redirect: RedirectPolicy::Ask,
            hsts: true,
            enable_site: false,
            ..Default::default()
        };
        assert_eq!(
            cycle.requested_features(),
            vec![Feature::Redirect, Feature::Hsts]
        );
    }
}
