//! Installer contract: a server whose configuration can carry a certificate.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use certpilot_common::{CertificateBundle, DomainName, VirtualHostId};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointRef;
use crate::errors::PluginError;

/// Optional security features an installer may toggle per virtual host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// Redirect plain HTTP to HTTPS
    Redirect,
    /// Strict-Transport-Security header
    Hsts,
    OcspStapling,
    /// Mark the site as enabled/served
    Site,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Redirect,
        Feature::Hsts,
        Feature::OcspStapling,
        Feature::Site,
    ];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Feature::Redirect => "redirect",
            Feature::Hsts => "hsts",
            Feature::OcspStapling => "ocsp-stapling",
            Feature::Site => "site",
        };
        write!(f, "{}", s)
    }
}

/// Installer-owned handle for one logical site.
///
/// The orchestrator only passes handles back to the installer that issued
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    pub id: VirtualHostId,
    /// Names the host serves (or will serve once created)
    pub names: BTreeSet<DomainName>,
    /// Proposed by `choose_virtual_host`, materialised by `deploy_cert`
    pub is_new: bool,
}

/// Certificate/key pair found in the installer's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertKeyEntry {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// Configuration file referencing the pair
    pub path: PathBuf,
}

/// Installer capability set.
///
/// Mutating operations change in-memory configuration only; `save` persists
/// it through the installer's checkpoint history. Callers serialise access
/// (at most one deploy/commit section at a time).
#[async_trait]
pub trait Installer: Send + Sync {
    /// Short plugin name used in logs
    fn name(&self) -> &str;

    /// Every name the installer serves. No side effects.
    fn get_all_names(&self) -> BTreeSet<DomainName>;

    /// Resolve the virtual host that should carry `name`.
    fn choose_virtual_host(&self, name: &DomainName) -> Result<VirtualHost, PluginError>;

    /// Associate `bundle` with `vhost`. Repeating the call with the same
    /// arguments leaves the same final state.
    fn deploy_cert(
        &mut self,
        vhost: &VirtualHost,
        bundle: &CertificateBundle,
    ) -> Result<(), PluginError>;

    fn enable_redirect(&mut self, vhost: &VirtualHost) -> Result<(), PluginError>;

    fn enable_hsts(&mut self, vhost: &VirtualHost) -> Result<(), PluginError>;

    fn enable_ocsp_stapling(&mut self, vhost: &VirtualHost) -> Result<(), PluginError>;

    fn enable_site(&mut self, vhost: &VirtualHost) -> Result<(), PluginError>;

    /// Read-only introspection for display and validation collaborators
    fn get_all_certs_keys(&self) -> Vec<CertKeyEntry>;

    /// Persist in-memory changes as a checkpoint.
    ///
    /// `title` is ignored for temporary checkpoints.
    fn save(&mut self, title: Option<&str>, temporary: bool) -> Result<CheckpointRef, PluginError>;

    /// Revert the `count` most recent checkpoints and reload in-memory
    /// state from the restored configuration.
    fn rollback_checkpoints(&mut self, count: usize) -> Result<(), PluginError>;

    /// Durable checkpoints, most recent first
    fn display_checkpoints(&self) -> Box<dyn Iterator<Item = CheckpointRef> + '_>;

    /// Validate the staged configuration before it is committed
    async fn config_test(&self) -> Result<(), PluginError>;

    /// Apply the tested configuration to the running server
    async fn restart(&self) -> Result<(), PluginError>;

    /// Dispatch to the `enable_*` operation for `feature`
    fn enable_feature(&mut self, feature: Feature, vhost: &VirtualHost) -> Result<(), PluginError> {
        match feature {
            Feature::Redirect => self.enable_redirect(vhost),
            Feature::Hsts => self.enable_hsts(vhost),
            Feature::OcspStapling => self.enable_ocsp_stapling(vhost),
            Feature::Site => self.enable_site(vhost),
        }
    }
}
