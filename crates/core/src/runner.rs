//! Blocking execution of external programs (`git`, `npm`, `yarn`).

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::errors::CommandError;

/// Runs a program to completion in a working directory and returns stdout.
pub trait CommandRunner {
    fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<String, CommandError> {
        debug!(dir = %dir.display(), cmd = ?format!("{} {}", program, args.join(" ")), "running command");

        let output = Command::new(program)
            .current_dir(dir)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CommandError::BinaryNotFound(program.to_string())
                } else {
                    CommandError::IoError(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(program, exit_code, %stderr, "command failed");
            return Err(CommandError::Failed {
                program: program.to_string(),
                exit_code,
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
