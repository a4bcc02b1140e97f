//! Certificate authority collaborator.
//!
//! The wire protocol is out of scope here; implementations may speak ACME,
//! talk to an internal CA, or issue from local files.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use certpilot_common::{CertificateBundle, DomainName};

use crate::challenge::{ChallengeResponse, ChallengeSpec};
use crate::errors::{ChallengeFailure, PluginError};

#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Challenge specification for every requested domain
    async fn challenges(
        &self,
        domains: &BTreeSet<DomainName>,
    ) -> Result<BTreeMap<DomainName, ChallengeSpec>, PluginError>;

    /// Check one domain's response. Timeouts are the caller's policy.
    async fn verify(
        &self,
        spec: &ChallengeSpec,
        response: &ChallengeResponse,
    ) -> Result<(), ChallengeFailure>;

    /// Issue a certificate covering `domains` once all are verified
    async fn issue(&self, domains: &BTreeSet<DomainName>)
        -> Result<CertificateBundle, PluginError>;
}
