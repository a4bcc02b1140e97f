//! Configuration linting
//!
//! Flags settings that are legal but likely unintended.

use super::{ValidationResult, ValidationWarning};
use crate::{Config, RedirectPolicy};

/// Lint configuration for likely mistakes
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.cycle.hsts && config.cycle.redirect == RedirectPolicy::Off {
        result.add_warning(ValidationWarning::new(
            "HSTS is enabled but HTTP is not redirected to HTTPS",
        ));
    }

    if config.installer.reload_command.is_none() {
        result.add_warning(ValidationWarning::new(
            "No reload-command configured; deployed certificates take effect on the next manual reload",
        ));
    }

    if config.installer.test_command.is_none() {
        result.add_warning(ValidationWarning::new(
            "No test-command configured; only internal consistency is checked before commit",
        ));
    }

    if config.cycle.domains.is_empty() {
        result.add_warning(ValidationWarning::new(
            "No domains configured; every name the installer serves will be requested",
        ));
    }

    result
}
