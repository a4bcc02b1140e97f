//! Configuration validation
//!
//! Checks run after parsing. Errors make the configuration unusable;
//! warnings point at settings that work but are probably not intended.

use std::fmt;

use crate::{Config, ConfigError};

mod lint;
mod plugins;

pub use lint::lint_config;
pub use plugins::{validate_authenticator, validate_installer};

/// Area of the configuration an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authenticator,
    Authority,
    Installer,
    Cycle,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Authenticator => "authenticator",
            ErrorCategory::Authority => "authority",
            ErrorCategory::Installer => "installer",
            ErrorCategory::Cycle => "cycle",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Accumulated validation findings
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fail with every error message, or hand back the warnings
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        if self.errors.is_empty() {
            return Ok(self.warnings);
        }
        let messages: Vec<String> = self.errors.iter().map(|e| format!("  - {}", e)).collect();
        Err(ConfigError::Invalid(messages.join("\n")))
    }
}

/// Run every validation pass
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.merge(validate_authenticator(config));
    result.merge(validate_installer(config));
    result.merge(lint_config(config));

    if config.cycle.verify_timeout_secs == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Cycle,
            "verify-timeout-secs must be greater than zero",
        ));
    }
    if config.cycle.cycle_timeout_secs == Some(0) {
        result.add_error(ValidationError::new(
            ErrorCategory::Cycle,
            "cycle-timeout-secs must be greater than zero",
        ));
    }
    if let Some(authority) = &config.authority {
        if authority.account_thumbprint.trim().is_empty() {
            result.add_error(ValidationError::new(
                ErrorCategory::Authority,
                "account-thumbprint must not be empty",
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_directory_config_is_valid() {
        let config = Config::for_directory(Path::new("/tmp/certpilot"));
        let result = config.validate();
        assert!(result.is_ok(), "{:?}", result.errors);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::for_directory(Path::new("/tmp/certpilot"));
        config.cycle.verify_timeout_secs = 0;

        let err = config.validate().into_result().unwrap_err();
        assert!(err.to_string().contains("verify-timeout-secs"));
    }
}
