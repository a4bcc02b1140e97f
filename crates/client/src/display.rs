//! Non-interactive display.

use std::collections::BTreeSet;

use certpilot_common::DomainName;
use certpilot_plugin_api::{CertKeyEntry, CheckpointRef, Display};
use tracing::{info, warn};

/// Reports through `tracing` and answers every prompt with a fixed default.
///
/// Listings (`display_certs`, `display_checkpoints`) go to stdout since
/// they are the output of the CLI commands that request them.
#[derive(Debug, Clone, Default)]
pub struct LogDisplay {
    /// Answer yes/no questions with yes
    assume_yes: bool,
    redirect_default: bool,
}

impl LogDisplay {
    pub fn new(assume_yes: bool, redirect_default: bool) -> Self {
        Self {
            assume_yes,
            redirect_default,
        }
    }
}

impl Display for LogDisplay {
    fn notification(&self, message: &str) {
        info!(message = %message, "Notification");
    }

    fn menu(&self, message: &str, choices: &[String]) -> Option<usize> {
        info!(message = %message, choices = choices.len(), "Menu answered with first choice");
        if choices.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn input(&self, message: &str) -> Option<String> {
        warn!(message = %message, "Input requested in non-interactive mode");
        None
    }

    fn yesno(&self, message: &str) -> bool {
        info!(message = %message, answer = self.assume_yes, "Question answered");
        self.assume_yes
    }

    fn filter_names(&self, names: &BTreeSet<DomainName>) -> BTreeSet<DomainName> {
        names.clone()
    }

    fn success_installation(&self, domains: &BTreeSet<DomainName>) {
        let names: Vec<&str> = domains.iter().map(DomainName::as_str).collect();
        info!(domains = %names.join(", "), "Certificate installed");
    }

    fn display_certs(&self, certs: &[CertKeyEntry]) {
        if certs.is_empty() {
            println!("No certificates deployed");
        }
        for entry in certs {
            println!(
                "{}\n  cert: {}\n  key:  {}",
                entry.path.display(),
                entry.cert.display(),
                entry.key.display()
            );
        }
    }

    fn display_checkpoints(&self, checkpoints: &[CheckpointRef]) {
        if checkpoints.is_empty() {
            println!("No checkpoints");
        }
        for checkpoint in checkpoints {
            println!(
                "{:>4}  {}  {}",
                checkpoint.seq,
                checkpoint.created.format("%Y-%m-%d %H:%M:%S UTC"),
                checkpoint.title
            );
        }
    }

    fn confirm_revocation(&self, cert: &CertKeyEntry) -> bool {
        self.yesno(&format!("Revoke {}?", cert.cert.display()))
    }

    fn more_info_cert(&self, cert: &CertKeyEntry) {
        info!(
            cert = %cert.cert.display(),
            key = %cert.key.display(),
            config = %cert.path.display(),
            "Certificate details"
        );
    }

    fn redirect_by_default(&self) -> bool {
        self.redirect_default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_answer_prompts() {
        let display = LogDisplay::new(false, true);
        assert!(!display.yesno("continue?"));
        assert!(display.redirect_by_default());
        assert_eq!(display.menu("pick", &["a".to_string(), "b".to_string()]), Some(0));
        assert_eq!(display.menu("pick", &[]), None);
        assert_eq!(display.input("name?"), None);
    }

    #[test]
    fn test_filter_names_keeps_everything() {
        let names: BTreeSet<_> = ["a.example.com", "b.example.com"]
            .iter()
            .map(|n| DomainName::new(n).unwrap())
            .collect();
        assert_eq!(LogDisplay::default().filter_names(&names), names);
    }
}
