//! Shell Command Execution
//!
//! Runs the command lines this crate builds. Used directly for index
//! building and filter/sort, and by the local scheduler for jobs.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::{debug, error};

use crate::error::{PipelineError, Result};

/// Runs a shell command line to completion.
pub trait CommandRunner {
    fn run(&mut self, command: &str) -> Result<()>;
}

/// Runs commands with `bash -c`, optionally inside a working directory.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    working_dir: Option<PathBuf>,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str) -> Result<()> {
        let mut cmd = Command::new("bash");
        cmd.arg("-o").arg("pipefail").arg("-c").arg(command);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!("Running: {}", command);
        check_output(command, cmd.output()?)
    }
}

/// Writes a bash script running `command` and returns its path.
pub fn write_job_script(script_dir: &Path, name: &str, command: &str) -> Result<PathBuf> {
    fs::create_dir_all(script_dir)?;

    let script_path = script_dir.join(format!("{}.sh", name));
    let mut file = File::create(&script_path)?;

    writeln!(file, "#!/bin/bash")?;
    writeln!(file, "set -e -o pipefail")?;
    writeln!(file, "{}", command)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}

/// Runs a script with bash in `working_dir`.
pub fn run_script(script_path: &Path, working_dir: &Path) -> Result<()> {
    let output = Command::new("bash")
        .arg(script_path)
        .current_dir(working_dir)
        .output()?;

    check_output(&script_path.display().to_string(), output)
}

fn check_output(command: &str, output: Output) -> Result<()> {
    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("Output of '{}':\n{}", command, stdout);
        }
        return Ok(());
    }

    error!(
        "'{}' failed with exit code: {:?}",
        command,
        output.status.code()
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        error!("stderr:\n{}", stderr);
    }

    Err(PipelineError::Command {
        command: command.to_string(),
        code: output.status.code(),
    })
}
