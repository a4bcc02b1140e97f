//! In-process HTTP-01 challenge registry.
//!
//! Holds pending key authorizations so an embedding HTTP server can answer
//! `/.well-known/acme-challenge/<token>` without touching the filesystem.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Token to key authorization map shared between the standalone
/// authenticator and whatever serves the challenge path.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ChallengeRegistry {
    challenges: Arc<DashMap<String, String>>,
}

impl ChallengeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `key_authorization` under `token`
    pub fn add_challenge(&self, token: &str, key_authorization: &str) {
        debug!(token = %token, "Registering HTTP-01 challenge");
        self.challenges
            .insert(token.to_string(), key_authorization.to_string());
    }

    /// Withdraw a token; unknown tokens are ignored
    pub fn remove_challenge(&self, token: &str) {
        if self.challenges.remove(token).is_some() {
            debug!(token = %token, "Removed HTTP-01 challenge");
        }
    }

    /// Response to serve for `token`, if one is registered
    pub fn get_response(&self, token: &str) -> Option<String> {
        let result = self.challenges.get(token).map(|v| v.clone());
        trace!(token = %token, found = result.is_some(), "HTTP-01 challenge lookup");
        result
    }

    /// Token part of a challenge request path
    pub fn extract_token(path: &str) -> Option<&str> {
        path.strip_prefix(ACME_CHALLENGE_PREFIX)
    }

    /// Response for a full request path
    pub fn respond(&self, path: &str) -> Option<String> {
        Self::extract_token(path).and_then(|token| self.get_response(token))
    }

    pub fn pending_count(&self) -> usize {
        self.challenges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_challenge() {
        let registry = ChallengeRegistry::new();
        registry.add_challenge("test-token", "test-key-auth");

        assert_eq!(
            registry.get_response("test-token"),
            Some("test-key-auth".to_string())
        );
        assert_eq!(registry.get_response("nonexistent"), None);
    }

    #[test]
    fn test_remove_challenge() {
        let registry = ChallengeRegistry::new();
        registry.add_challenge("test-token", "test-key-auth");
        assert_eq!(registry.pending_count(), 1);

        registry.remove_challenge("test-token");
        registry.remove_challenge("test-token");
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            ChallengeRegistry::extract_token("/.well-known/acme-challenge/abc123"),
            Some("abc123")
        );
        assert_eq!(ChallengeRegistry::extract_token("/other/path"), None);
        assert_eq!(
            ChallengeRegistry::extract_token("/.well-known/acme-challenge"),
            None
        );
    }

    #[test]
    fn test_respond_to_path() {
        let registry = ChallengeRegistry::new();
        registry.add_challenge("abc", "abc.thumb");

        assert_eq!(
            registry.respond("/.well-known/acme-challenge/abc"),
            Some("abc.thumb".to_string())
        );
        assert_eq!(registry.respond("/index.html"), None);
    }

    #[test]
    fn test_clone_shares_state() {
        let registry = ChallengeRegistry::new();
        let other = registry.clone();

        registry.add_challenge("token", "auth");
        assert_eq!(other.get_response("token"), Some("auth".to_string()));

        other.remove_challenge("token");
        assert_eq!(registry.pending_count(), 0);
    }
}
