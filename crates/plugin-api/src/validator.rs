//! Post-deployment validator collaborator.
//!
//! Validators observe the running server from outside; they only read
//! installer introspection and never change configuration.

use std::collections::BTreeSet;

use async_trait::async_trait;
use certpilot_common::DomainName;

#[async_trait]
pub trait Validator: Send + Sync {
    /// Plain HTTP requests for `name` redirect to HTTPS
    async fn redirect(&self, name: &DomainName) -> bool;

    async fn ocsp_stapling(&self, name: &DomainName) -> bool;

    /// Every name answers over HTTPS with a valid certificate
    async fn https(&self, names: &BTreeSet<DomainName>) -> bool;

    async fn hsts(&self, name: &DomainName) -> bool;
}
