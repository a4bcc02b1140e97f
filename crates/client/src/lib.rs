//! certpilot client library
//!
//! Drives automated certificate issuance and deployment through
//! independently written plugins:
//!
//! - **Checkpoints**: append-only, digest-verified configuration history
//! - **Installer**: file-backed reference installer with rollback
//! - **Authenticators**: HTTP-01 via an in-process registry or a webroot
//! - **Orchestrator**: the cycle state machine tying them together
//!
//! # Example
//!
//! ```ignore
//! use certpilot_client::app::build_orchestrator;
//! use certpilot_client::LogDisplay;
//! use certpilot_config::Config;
//!
//! let config = Config::from_file("/etc/certpilot/certpilot.toml")?;
//! let orchestrator = build_orchestrator(&config, LogDisplay::default())?;
//! let report = orchestrator.run(None).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod app;
pub mod authenticators;
pub mod authority;
pub mod checkpoint;
pub mod display;
pub mod installer;
pub mod orchestrator;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Checkpoints
pub use checkpoint::{CheckpointStore, ConfigTree};

// Plugins
pub use authenticators::{ChallengeRegistry, StandaloneAuthenticator, WebrootAuthenticator};
pub use authority::StaticAuthority;
pub use display::LogDisplay;
pub use installer::FileInstaller;

// Orchestration
pub use orchestrator::{
    CycleAborted, CycleFailure, CycleOptions, CycleReport, CycleState, Orchestrator, Recovery,
};
