//! Display collaborator: notifications, prompts and listings.
//!
//! Implementations only present information and collect answers; they
//! never mutate orchestrator or installer state.

use std::collections::BTreeSet;

use certpilot_common::DomainName;

use crate::checkpoint::CheckpointRef;
use crate::installer::CertKeyEntry;

pub trait Display: Send + Sync {
    fn notification(&self, message: &str);

    /// Returns the index of the chosen entry, `None` when cancelled
    fn menu(&self, message: &str, choices: &[String]) -> Option<usize>;

    fn input(&self, message: &str) -> Option<String>;

    fn yesno(&self, message: &str) -> bool;

    /// Let the user narrow the set of names to request
    fn filter_names(&self, names: &BTreeSet<DomainName>) -> BTreeSet<DomainName>;

    fn success_installation(&self, domains: &BTreeSet<DomainName>);

    fn display_certs(&self, certs: &[CertKeyEntry]);

    fn display_checkpoints(&self, checkpoints: &[CheckpointRef]);

    fn confirm_revocation(&self, cert: &CertKeyEntry) -> bool;

    fn more_info_cert(&self, cert: &CertKeyEntry);

    /// Whether HTTP should redirect to HTTPS when configuration leaves it
    /// to the user
    fn redirect_by_default(&self) -> bool;
}
