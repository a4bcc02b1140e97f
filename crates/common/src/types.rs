//! Certificate material shared between the authority, the orchestrator and
//! installers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// PEM marker every certificate block starts with
pub const PEM_CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// Issued certificate, its private key and the optional issuer chain.
///
/// Produced by the certificate authority collaborator and deployed at most
/// once per successful cycle. Fields are private so a bundle cannot be
/// altered after issuance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle {
    cert_pem: String,
    key_pem: String,
    chain_pem: Option<String>,
}

impl CertificateBundle {
    pub fn new(cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
            chain_pem: None,
        }
    }

    /// Attach the issuer chain
    pub fn with_chain(mut self, chain_pem: impl Into<String>) -> Self {
        self.chain_pem = Some(chain_pem.into());
        self
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn chain_pem(&self) -> Option<&str> {
        self.chain_pem.as_deref()
    }
}

// Never print key material
impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("cert_len", &self.cert_pem.len())
            .field("has_chain", &self.chain_pem.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_is_optional() {
        let bundle = CertificateBundle::new("CERT\n", "KEY\n");
        assert_eq!(bundle.chain_pem(), None);

        let bundle = bundle.with_chain("CHAIN\n");
        assert_eq!(bundle.chain_pem(), Some("CHAIN\n"));
    }

    #[test]
    fn test_debug_hides_key() {
        let bundle = CertificateBundle::new("CERT", "SECRET-KEY");
        let rendered = format!("{:?}", bundle);
        assert!(!rendered.contains("SECRET-KEY"));
    }
}
