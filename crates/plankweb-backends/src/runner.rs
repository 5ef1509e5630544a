//! External tool execution.

use plankweb_dispatch::BackendError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

/// Wrapper for one command-line tool.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    name: String,
    executable_path: PathBuf,
}

impl ToolRunner {
    /// Create a new ToolRunner; `name` is used in logs and error messages.
    pub fn new<P: AsRef<Path>>(name: &str, executable_path: P) -> Self {
        Self {
            name: name.to_string(),
            executable_path: executable_path.as_ref().to_path_buf(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the tool, failing with its stderr on a non-zero exit.
    pub async fn run<I, S>(&self, args: I, cwd: Option<&Path>) -> Result<Output, BackendError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.executable_path);
        command.args(args).kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        info!("Running {} ({:?})", self.name, self.executable_path);

        let output = command.output().await.map_err(|e| BackendError::Process {
            tool: self.name.clone(),
            code: None,
            stderr: format!("failed to start {:?}: {}", self.executable_path, e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Process {
                tool: self.name.clone(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!("{} completed successfully", self.name);
        Ok(output)
    }
}
