//! Reference installer.
//!
//! [`FileInstaller`] manages a directory of TOML site files and deployed
//! PEM material, checkpointed through a [`CheckpointStore`].
//!
//! [`CheckpointStore`]: crate::checkpoint::CheckpointStore

mod file;
mod site;

pub use file::FileInstaller;
pub use site::{SiteConfig, SiteTls};

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, trace};

/// Run an external command in `dir`, returning its stderr (or stdout when
/// stderr is empty) as the error on a non-zero exit.
pub(crate) async fn run_command(argv: &[String], dir: &Path) -> Result<(), String> {
    let Some((program, args)) = argv.split_first() else {
        return Err("empty command".to_string());
    };

    trace!(program = %program, args = ?args, dir = %dir.display(), "Running command");

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run '{}': {}", program, e))?;

    if output.status.success() {
        debug!(program = %program, "Command succeeded");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };

    Err(format!("'{}' exited with {}: {}", program, output.status, detail))
}
