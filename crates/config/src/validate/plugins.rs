//! Plugin selection validation
//!
//! Checks that the configured authenticator and installer have what they
//! need and that the cycle only asks for supported features.

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::{AuthenticatorKind, Config};

/// Validate authenticator settings
pub fn validate_authenticator(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.authenticator.kind == AuthenticatorKind::Webroot
        && config.authenticator.webroot.is_none()
    {
        result.add_error(ValidationError::new(
            ErrorCategory::Authenticator,
            "webroot authenticator requires 'webroot'",
        ));
    }

    result
}

/// Validate installer settings against the cycle configuration
pub fn validate_installer(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let installer = &config.installer;

    for (key, command) in [
        ("test-command", &installer.test_command),
        ("reload-command", &installer.reload_command),
    ] {
        if let Some(command) = command {
            if command.first().map_or(true, |program| program.trim().is_empty()) {
                result.add_error(ValidationError::new(
                    ErrorCategory::Installer,
                    format!("{} must name a program", key),
                ));
            }
        }
    }

    for feature in config.cycle.requested_features() {
        if !installer.supported_features.contains(&feature) {
            result.add_error(ValidationError::new(
                ErrorCategory::Installer,
                format!("cycle requests {} but the installer does not support it", feature),
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RedirectPolicy;
    use certpilot_plugin_api::Feature;
    use std::path::Path;

    fn config() -> Config {
        Config::for_directory(Path::new("/tmp/certpilot"))
    }

    #[test]
    fn test_webroot_required() {
        let mut config = config();
        config.authenticator.kind = AuthenticatorKind::Webroot;

        let result = validate_authenticator(&config);
        assert!(result.errors.iter().any(|e| e.message.contains("webroot")));
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut config = config();
        config.installer.reload_command = Some(vec![]);

        let result = validate_installer(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.message.contains("reload-command")));
    }

    #[test]
    fn test_unsupported_feature_rejected() {
        let mut config = config();
        config.installer.supported_features = vec![Feature::Site];
        config.cycle.redirect = RedirectPolicy::On;

        let result = validate_installer(&config);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("redirect"));
    }
}
