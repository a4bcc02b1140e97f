//! Per-cycle options.

use std::time::Duration;

use certpilot_config::{CycleConfig, RedirectPolicy};

#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub redirect: RedirectPolicy,
    pub hsts: bool,
    pub ocsp_stapling: bool,
    pub enable_site: bool,
    /// Limit for each domain's verification
    pub verify_timeout: Duration,
    /// Limit for the whole cycle; `None` waits indefinitely
    pub cycle_timeout: Option<Duration>,
    /// Title of the checkpoint a successful cycle leaves behind
    pub checkpoint_title: Option<String>,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self::from(&CycleConfig::default())
    }
}

impl From<&CycleConfig> for CycleOptions {
    fn from(config: &CycleConfig) -> Self {
        Self {
            redirect: config.redirect,
            hsts: config.hsts,
            ocsp_stapling: config.ocsp_stapling,
            enable_site: config.enable_site,
            verify_timeout: Duration::from_secs(config.verify_timeout_secs),
            cycle_timeout: config.cycle_timeout_secs.map(Duration::from_secs),
            checkpoint_title: config.checkpoint_title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = CycleConfig {
            verify_timeout_secs: 5,
            cycle_timeout_secs: Some(60),
            checkpoint_title: Some("renewal".to_string()),
            ..CycleConfig::default()
        };

        let options = CycleOptions::from(&config);
        assert_eq!(options.verify_timeout, Duration::from_secs(5));
        assert_eq!(options.cycle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(options.checkpoint_title.as_deref(), Some("renewal"));
        assert!(options.enable_site);
    }
}
