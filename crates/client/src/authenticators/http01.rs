//! HTTP-01 challenge.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use certpilot_plugin_api::{
    ensure_performed, Challenge, ChallengeKind, ChallengeResponse, ChallengeSpec,
    ChallengeStatus, PluginError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::registry::{ChallengeRegistry, ACME_CHALLENGE_PREFIX};

/// Where the key authorization is published
#[derive(Debug, Clone)]
pub enum Placement {
    /// Shared in-process registry
    Registry(ChallengeRegistry),
    /// Token files below a web root
    Webroot(PathBuf),
}

/// One HTTP-01 challenge for one domain.
#[derive(Debug)]
pub struct Http01Challenge {
    spec: ChallengeSpec,
    placement: Placement,
    status: ChallengeStatus,
    /// Set before anything is written so a half-finished perform still
    /// gets cleaned up
    placed: bool,
    /// Token file write still running; outlives a dropped `perform`
    write: Option<JoinHandle<io::Result<()>>>,
}

impl Http01Challenge {
    pub fn new(spec: ChallengeSpec, placement: Placement) -> Self {
        Self {
            spec,
            placement,
            status: ChallengeStatus::Pending,
            placed: false,
            write: None,
        }
    }

    /// Path the key authorization is written to under [`Placement::Webroot`]
    pub fn token_path(&self) -> Option<PathBuf> {
        match &self.placement {
            Placement::Webroot(root) => Some(
                root.join(ACME_CHALLENGE_PREFIX.trim_matches('/'))
                    .join(&self.spec.token),
            ),
            Placement::Registry(_) => None,
        }
    }

    fn check_spec(&self) -> Result<(), PluginError> {
        if self.spec.kind != ChallengeKind::Http01 {
            return Err(PluginError::Config(format!(
                "{} challenge handed to an HTTP-01 authenticator",
                self.spec.kind
            )));
        }
        if !valid_token(&self.spec.token) {
            return Err(PluginError::Config(format!(
                "invalid challenge token for '{}'",
                self.spec.domain
            )));
        }
        Ok(())
    }

    async fn place(&mut self) -> Result<(), PluginError> {
        let key_authorization = self.spec.key_authorization();
        self.placed = true;
        match &self.placement {
            Placement::Registry(registry) => {
                registry.add_challenge(&self.spec.token, &key_authorization);
            }
            Placement::Webroot(_) => {
                let Some(path) = self.token_path() else {
                    return Ok(());
                };
                let target = path.clone();
                let write = self.write.insert(tokio::task::spawn_blocking(move || {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, key_authorization)
                }));
                let written = write.await;
                self.write = None;
                match written {
                    Ok(result) => result.map_err(|e| PluginError::persistence(path.display(), e))?,
                    Err(e) => return Err(PluginError::persistence(path.display(), e)),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Challenge for Http01Challenge {
    fn spec(&self) -> &ChallengeSpec {
        &self.spec
    }

    fn status(&self) -> ChallengeStatus {
        self.status
    }

    async fn perform(&mut self, quiet: bool) -> Result<(), PluginError> {
        if self.status != ChallengeStatus::Pending {
            return Err(PluginError::InvalidState {
                expected: ChallengeStatus::Pending,
                actual: self.status,
            });
        }

        let placed = match self.check_spec() {
            Ok(()) => self.place().await,
            Err(e) => Err(e),
        };
        if let Err(e) = placed {
            self.status.advance(ChallengeStatus::Failed)?;
            return Err(e);
        }

        self.status.advance(ChallengeStatus::Performed)?;
        if quiet {
            debug!(domain = %self.spec.domain, token = %self.spec.token, "HTTP-01 challenge placed");
        } else {
            info!(domain = %self.spec.domain, "HTTP-01 challenge placed");
        }
        Ok(())
    }

    fn generate_response(&self) -> Result<ChallengeResponse, PluginError> {
        ensure_performed(self.status)?;
        Ok(self.spec.expected_response())
    }

    async fn cleanup(&mut self) -> Result<(), PluginError> {
        // A cancelled perform may still be writing the token file
        if let Some(write) = self.write.take() {
            let _ = write.await;
        }
        if self.placed {
            match &self.placement {
                Placement::Registry(registry) => registry.remove_challenge(&self.spec.token),
                Placement::Webroot(_) => {
                    if let Some(path) = self.token_path() {
                        match tokio::fs::remove_file(&path).await {
                            Ok(()) => {}
                            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                            Err(e) => return Err(PluginError::persistence(path.display(), e)),
                        }
                    }
                }
            }
            self.placed = false;
            debug!(domain = %self.spec.domain, "HTTP-01 challenge removed");
        }
        self.status.advance(ChallengeStatus::CleanedUp)
    }
}

/// Tokens are base64url; anything else could escape the challenge directory
fn valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use certpilot_common::DomainName;
    use tempfile::TempDir;

    fn spec(token: &str) -> ChallengeSpec {
        ChallengeSpec {
            domain: DomainName::new("example.com").unwrap(),
            kind: ChallengeKind::Http01,
            token: token.to_string(),
            thumbprint: "thumb".to_string(),
        }
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = ChallengeRegistry::new();
        let mut challenge = Http01Challenge::new(spec("tok"), Placement::Registry(registry.clone()));

        challenge.perform(true).await.unwrap();
        assert_eq!(registry.get_response("tok"), Some("tok.thumb".to_string()));
        assert_eq!(challenge.status(), ChallengeStatus::Performed);

        challenge.cleanup().await.unwrap();
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(challenge.status(), ChallengeStatus::CleanedUp);
    }

    #[tokio::test]
    async fn test_second_perform_rejected() {
        let mut challenge =
            Http01Challenge::new(spec("tok"), Placement::Registry(ChallengeRegistry::new()));
        challenge.perform(true).await.unwrap();

        let result = challenge.perform(true).await;
        assert!(matches!(result, Err(PluginError::InvalidState { .. })));
        assert_eq!(challenge.status(), ChallengeStatus::Performed);
    }

    #[tokio::test]
    async fn test_response_is_deterministic() {
        let mut challenge =
            Http01Challenge::new(spec("tok"), Placement::Registry(ChallengeRegistry::new()));
        assert!(challenge.generate_response().is_err());

        challenge.perform(true).await.unwrap();
        let first = challenge.generate_response().unwrap();
        assert_eq!(first, challenge.generate_response().unwrap());
        assert_eq!(first.key_authorization, "tok.thumb");
    }

    #[tokio::test]
    async fn test_webroot_file_written_and_removed() {
        let dir = TempDir::new().unwrap();
        let mut challenge =
            Http01Challenge::new(spec("abc_-1"), Placement::Webroot(dir.path().to_path_buf()));

        challenge.perform(false).await.unwrap();
        let path = dir.path().join(".well-known/acme-challenge/abc_-1");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abc_-1.thumb");

        challenge.cleanup().await.unwrap();
        assert!(!path.exists());
        // Repeat cleanup is harmless
        challenge.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_token_fails_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let mut challenge =
            Http01Challenge::new(spec("../escape"), Placement::Webroot(dir.path().to_path_buf()));

        assert!(challenge.perform(true).await.is_err());
        assert_eq!(challenge.status(), ChallengeStatus::Failed);
        challenge.cleanup().await.unwrap();
        assert_eq!(challenge.status(), ChallengeStatus::CleanedUp);
    }

    #[tokio::test]
    async fn test_cleanup_without_perform() {
        let mut challenge =
            Http01Challenge::new(spec("tok"), Placement::Registry(ChallengeRegistry::new()));
        challenge.cleanup().await.unwrap();
    }
}
