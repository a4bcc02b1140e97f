//! certpilot - Main entry point
//!
//! Issues certificates and deploys them through checkpointed installer
//! configuration.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use certpilot_client::app::{build_orchestrator, open_installer};
use certpilot_client::LogDisplay;
use certpilot_common::observability::init_logging;
use certpilot_common::DomainName;
use certpilot_config::{Config, CONFIG_ENV_VAR};
use certpilot_plugin_api::{CheckpointRef, Display, Installer};

/// certpilot - checkpointed certificate issuance and deployment
#[derive(Parser, Debug)]
#[command(name = "certpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = CONFIG_ENV_VAR, global = true)]
    config: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Answer yes to every question
    #[arg(short = 'y', long = "assume-yes", global = true)]
    assume_yes: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Obtain and deploy a certificate (default)
    Run {
        /// Domain to request; repeat for several. Defaults to [cycle] domains,
        /// then to every name the installer serves
        #[arg(short = 'd', long = "domain")]
        domains: Vec<DomainName>,
    },
    /// List names served by the installer
    Names,
    /// List deployed certificates and keys
    Certs,
    /// List durable checkpoints, most recent first
    Checkpoints,
    /// Roll back the most recent checkpoints and restart the server
    Rollback {
        /// Number of checkpoints to roll back
        #[arg(long = "count", default_value_t = 1)]
        count: usize,
    },
    /// Test the installer's current configuration
    ConfigTest,
    /// Validate the configuration file and exit
    Test,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Run {
        domains: Vec::new(),
    });
    if cli.test || matches!(command, Commands::Test) {
        return test_config(cli.config.as_deref());
    }

    let config = load_config(cli.config.as_deref())?;
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_logging(log_level, config.logging.format);

    for warning in config
        .validate()
        .into_result()
        .context("Configuration validation failed")?
    {
        warn!("{}", warning);
    }

    let display = LogDisplay::new(cli.assume_yes, cli.assume_yes);

    // Create runtime for plugin I/O
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        match command {
            Commands::Run { domains } => run_cycle(&config, display, domains).await,
            Commands::Names => {
                let installer = open_installer(&config)?;
                for name in installer.get_all_names() {
                    println!("{}", name);
                }
                Ok(())
            }
            Commands::Certs => {
                let installer = open_installer(&config)?;
                display.display_certs(&installer.get_all_certs_keys());
                Ok(())
            }
            Commands::Checkpoints => {
                let installer = open_installer(&config)?;
                let checkpoints: Vec<CheckpointRef> = installer.display_checkpoints().collect();
                display.display_checkpoints(&checkpoints);
                Ok(())
            }
            Commands::Rollback { count } => {
                let mut installer = open_installer(&config)?;
                installer
                    .rollback_checkpoints(count)
                    .context("Rollback failed")?;
                installer
                    .config_test()
                    .await
                    .context("Restored configuration failed its test, not restarting")?;
                installer
                    .restart()
                    .await
                    .context("Restart after rollback failed")?;
                info!(count = count, "Rollback complete");
                Ok(())
            }
            Commands::ConfigTest => {
                let installer = open_installer(&config)?;
                installer.config_test().await?;
                println!("certpilot: installer configuration test is successful");
                Ok(())
            }
            // Handled before the configuration is loaded
            Commands::Test => Ok(()),
        }
    })
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else {
        bail!(
            "no configuration file given; use --config or set {}",
            CONFIG_ENV_VAR
        );
    };
    Config::from_file(path).context("Failed to load configuration file")
}

/// Test configuration file and exit
fn test_config(config_path: Option<&str>) -> Result<()> {
    init_logging("info", Default::default());

    let config = load_config(config_path)?;
    let warnings = config
        .validate()
        .into_result()
        .context("Configuration validation failed")?;

    info!("Configuration test successful:");
    info!("  - authenticator: {:?}", config.authenticator.kind);
    info!("  - installer directory: {}", config.installer.config_dir.display());
    info!("  - {} domain(s) configured", config.cycle.domains.len());
    for warning in &warnings {
        warn!("{}", warning);
    }

    println!(
        "certpilot: configuration file {} test is successful",
        config_path.unwrap_or_default()
    );
    Ok(())
}

async fn run_cycle(config: &Config, display: LogDisplay, domains: Vec<DomainName>) -> Result<()> {
    let orchestrator = build_orchestrator(config, display)?;

    let requested: BTreeSet<DomainName> = if domains.is_empty() {
        config.cycle.domains.iter().cloned().collect()
    } else {
        domains.into_iter().collect()
    };
    let requested = (!requested.is_empty()).then_some(requested);

    let report = orchestrator.run(requested).await?;
    if let Some(e) = &report.cleanup_error {
        warn!(error = %e, "Certificate deployed but challenge cleanup failed");
    }

    println!(
        "certpilot: deployed certificate for {} name(s), checkpoint '{}'",
        report.domains.len(),
        report.checkpoint.title
    );
    Ok(())
}
