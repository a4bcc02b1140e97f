//! Shared building blocks for certpilot crates.
//!
//! - [`ids`]: validated domain names and identifier newtypes
//! - [`types`]: certificate bundle handed from the authority to installers
//! - [`observability`]: log format selection and subscriber setup

pub mod ids;
pub mod observability;
pub mod types;

pub use ids::{CheckpointId, CycleId, DomainName, InvalidDomainName, VirtualHostId};
pub use observability::LogFormat;
pub use types::CertificateBundle;
