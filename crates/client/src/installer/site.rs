//! Site file format.
//!
//! ```toml
//! server-names = ["example.com", "www.example.com"]
//! enabled = true
//! redirect = true
//! hsts = false
//! ocsp-stapling = false
//!
//! [tls]
//! cert = "certs/example.com/cert.pem"
//! key = "certs/example.com/key.pem"
//! chain = "certs/example.com/chain.pem"
//! ```
//!
//! Paths are relative to the installer's configuration directory.

use std::collections::BTreeSet;
use std::path::PathBuf;

use certpilot_common::DomainName;
use serde::{Deserialize, Serialize};

/// One virtual host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    pub server_names: BTreeSet<DomainName>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub redirect: bool,

    #[serde(default)]
    pub hsts: bool,

    #[serde(default)]
    pub ocsp_stapling: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<SiteTls>,
}

impl SiteConfig {
    pub fn new(server_names: BTreeSet<DomainName>) -> Self {
        Self {
            server_names,
            enabled: false,
            redirect: false,
            hsts: false,
            ocsp_stapling: false,
            tls: None,
        }
    }

    /// Exact name match
    pub fn serves(&self, name: &DomainName) -> bool {
        self.server_names.contains(name)
    }

    /// Match through one of the site's wildcard names
    pub fn covers(&self, name: &DomainName) -> bool {
        self.server_names.iter().any(|served| served.covers(name))
    }
}

/// Certificate material referenced by a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTls {
    pub cert: PathBuf,
    pub key: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<DomainName> {
        list.iter().map(|n| DomainName::new(n).unwrap()).collect()
    }

    #[test]
    fn test_parse_minimal_site() {
        let site: SiteConfig = toml::from_str(r#"server-names = ["example.com"]"#).unwrap();
        assert!(!site.enabled);
        assert!(site.tls.is_none());
        assert!(site.serves(&DomainName::new("example.com").unwrap()));
    }

    #[test]
    fn test_serialized_site_parses_back() {
        let mut site = SiteConfig::new(names(&["example.com"]));
        site.enabled = true;
        site.tls = Some(SiteTls {
            cert: PathBuf::from("certs/example.com/cert.pem"),
            key: PathBuf::from("certs/example.com/key.pem"),
            chain: None,
        });

        let text = toml::to_string(&site).unwrap();
        assert!(text.contains("server-names"));
        assert!(!text.contains("chain"));
        assert_eq!(toml::from_str::<SiteConfig>(&text).unwrap(), site);
    }

    #[test]
    fn test_wildcard_cover() {
        let site = SiteConfig::new(names(&["*.example.com"]));
        assert!(site.covers(&DomainName::new("www.example.com").unwrap()));
        assert!(!site.covers(&DomainName::new("a.b.example.com").unwrap()));
        assert!(!site.serves(&DomainName::new("www.example.com").unwrap()));
    }
}
