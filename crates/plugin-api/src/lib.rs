//! Plugin contracts for certpilot.
//!
//! This crate defines the capability sets that independently written
//! plugins implement and the orchestrator depends on:
//!
//! - [`Challenge`]: one proof-of-control unit with a checked lifecycle
//! - [`Authenticator`]: performs a batch of challenges and cleans them up
//! - [`Installer`]: deploys certificates and manages a checkpointed
//!   server configuration
//! - [`CertificateAuthority`], [`Display`], [`Validator`]: external
//!   collaborators
//!
//! All plugin-local failures are reported as [`PluginError`]; per-domain
//! challenge failures as [`ChallengeFailure`].

pub mod authenticator;
pub mod authority;
pub mod challenge;
pub mod checkpoint;
pub mod display;
pub mod errors;
pub mod installer;
pub mod validator;

pub use authenticator::{cleanup_all, perform_all, Authenticator, ChallengeOutcome};
pub use authority::CertificateAuthority;
pub use challenge::{
    ensure_performed, Challenge, ChallengeKind, ChallengeResponse, ChallengeSpec, ChallengeStatus,
};
pub use checkpoint::CheckpointRef;
pub use display::Display;
pub use errors::{ChallengeFailure, PluginError};
pub use installer::{CertKeyEntry, Feature, Installer, VirtualHost};
pub use validator::Validator;
