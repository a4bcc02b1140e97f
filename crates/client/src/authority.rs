//! Offline certificate authority.
//!
//! [`StaticAuthority`] drives a full cycle without a network transport: it
//! mints HTTP-01 challenges for a configured account, checks responses
//! locally (optionally by looking where the authenticator published them)
//! and "issues" a certificate read from PEM files on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use certpilot_common::types::PEM_CERTIFICATE_MARKER;
use certpilot_common::{CertificateBundle, DomainName};
use certpilot_config::AuthorityConfig;
use certpilot_plugin_api::{
    CertificateAuthority, ChallengeFailure, ChallengeKind, ChallengeResponse, ChallengeSpec,
    PluginError,
};
use dashmap::DashMap;
use rand::RngCore;
use tracing::{debug, info, trace};

use crate::authenticators::{ChallengeRegistry, ACME_CHALLENGE_PREFIX};

/// Random bytes per challenge token
const TOKEN_BYTES: usize = 32;

/// Where [`StaticAuthority::verify`] looks for published responses
#[derive(Debug, Clone)]
pub enum Observer {
    Registry(ChallengeRegistry),
    Webroot(PathBuf),
}

#[derive(Debug)]
pub struct StaticAuthority {
    config: AuthorityConfig,
    observer: Option<Observer>,
    /// Outstanding tokens and the domain each was minted for
    tokens: DashMap<String, DomainName>,
}

impl StaticAuthority {
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            observer: None,
            tokens: DashMap::new(),
        }
    }

    /// Also require the response to be observable where it was published
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    fn mint_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    async fn observe(&self, spec: &ChallengeSpec) -> Result<Option<String>, String> {
        match &self.observer {
            None => Ok(None),
            Some(Observer::Registry(registry)) => {
                Ok(registry.respond(&format!("{}{}", ACME_CHALLENGE_PREFIX, spec.token)))
            }
            Some(Observer::Webroot(root)) => {
                let path = root
                    .join(ACME_CHALLENGE_PREFIX.trim_matches('/'))
                    .join(&spec.token);
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => Ok(Some(contents.trim_end().to_string())),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(format!("reading {}: {}", path.display(), e)),
                }
            }
        }
    }
}

async fn read_pem(path: &Path) -> Result<String, PluginError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PluginError::Authority(format!("reading {}: {}", path.display(), e)))
}

#[async_trait]
impl CertificateAuthority for StaticAuthority {
    async fn challenges(
        &self,
        domains: &BTreeSet<DomainName>,
    ) -> Result<BTreeMap<DomainName, ChallengeSpec>, PluginError> {
        let specs: BTreeMap<_, _> = domains
            .iter()
            .map(|domain| {
                let token = Self::mint_token();
                self.tokens.insert(token.clone(), domain.clone());
                let spec = ChallengeSpec {
                    domain: domain.clone(),
                    kind: ChallengeKind::Http01,
                    token,
                    thumbprint: self.config.account_thumbprint.clone(),
                };
                (domain.clone(), spec)
            })
            .collect();

        debug!(domains = specs.len(), "Minted challenges");
        Ok(specs)
    }

    async fn verify(
        &self,
        spec: &ChallengeSpec,
        response: &ChallengeResponse,
    ) -> Result<(), ChallengeFailure> {
        let fail = |reason: String| ChallengeFailure::new(spec.domain.clone(), reason);

        match self.tokens.get(&spec.token) {
            Some(domain) if *domain == spec.domain => {}
            _ => return Err(fail("unknown challenge token".to_string())),
        }

        let expected = spec.expected_response();
        if *response != expected {
            return Err(fail("key authorization mismatch".to_string()));
        }

        if let Some(found) = self.observe(spec).await.map_err(fail)? {
            if found != expected.published_value() {
                return Err(fail("published response does not match".to_string()));
            }
        } else if self.observer.is_some() {
            return Err(fail("response not published".to_string()));
        }

        self.tokens.remove(&spec.token);
        trace!(domain = %spec.domain, "Challenge verified");
        Ok(())
    }

    async fn issue(&self, domains: &BTreeSet<DomainName>) -> Result<CertificateBundle, PluginError> {
        let cert = read_pem(&self.config.cert).await?;
        if !cert.contains(PEM_CERTIFICATE_MARKER) {
            return Err(PluginError::Authority(format!(
                "{} does not contain a PEM certificate",
                self.config.cert.display()
            )));
        }
        let key = read_pem(&self.config.key).await?;

        let mut bundle = CertificateBundle::new(cert, key);
        if let Some(chain) = &self.config.chain {
            bundle = bundle.with_chain(read_pem(chain).await?);
        }

        info!(domains = domains.len(), "Certificate issued");
        Ok(bundle)
    }
}
