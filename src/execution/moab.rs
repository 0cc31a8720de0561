//! Moab Backend
//!
//! Jobs are written to scripts and submitted with `msub`; held jobs are
//! released with `mjobctl -u`. The scheduler client programs are run
//! through [`ClientProgram`] so tests can stand in for the cluster.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, error, info};

use crate::environment::ToolPaths;
use crate::error::{PipelineError, Result};
use crate::workflow::model::JobHandle;

use super::runner::write_job_script;
use super::scheduler::{script_dir, JobRequest, Scheduler};

/// Runs a scheduler client program and returns its stdout.
pub trait ClientProgram {
    fn call(&mut self, program: &str, args: &[String]) -> Result<String>;
}

/// Runs client programs as child processes.
#[derive(Debug, Default)]
pub struct ProcessClient;

impl ClientProgram for ProcessClient {
    fn call(&mut self, program: &str, args: &[String]) -> Result<String> {
        let command = format!("{} {}", program, args.join(" "));
        debug!("Running: {}", command);

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| PipelineError::Scheduler {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("'{}' failed: {}", command, stderr);
            return Err(PipelineError::Scheduler {
                command,
                message: format!("exit code {:?}: {}", output.status.code(), stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Submits jobs to a Moab cluster.
pub struct MoabScheduler {
    msub: String,
    mjobctl: String,
    working_dir: PathBuf,
    script_dir: PathBuf,
    client: Box<dyn ClientProgram>,
    submitted: usize,
}

impl MoabScheduler {
    pub fn new(tools: &ToolPaths, working_dir: &Path) -> Self {
        Self::with_client(tools, working_dir, Box::new(ProcessClient))
    }

    pub fn with_client(
        tools: &ToolPaths,
        working_dir: &Path,
        client: Box<dyn ClientProgram>,
    ) -> Self {
        Self {
            msub: tools.scheduler_tool("msub"),
            mjobctl: tools.scheduler_tool("mjobctl"),
            working_dir: working_dir.to_path_buf(),
            script_dir: script_dir(working_dir),
            client,
            submitted: 0,
        }
    }

    /// `msub` arguments for `request`, whose script is at `script`.
    fn submit_args(&self, request: &JobRequest, script: &Path) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(),
            self.working_dir.display().to_string(),
            "-N".to_string(),
            request.name.clone(),
            "-q".to_string(),
            request.queue.clone(),
            "-l".to_string(),
            request.resources.to_string(),
        ];

        if request.hold {
            args.push("-h".to_string());
        }

        if !request.depends_on.is_empty() {
            let ids: Vec<&str> = request.depends_on.iter().map(JobHandle::as_str).collect();
            args.push("-W".to_string());
            args.push(format!("x=depend:{}:{}", request.condition, ids.join(":")));
        }

        args.push(script.display().to_string());
        args
    }
}

impl Scheduler for MoabScheduler {
    fn submit(&mut self, request: &JobRequest) -> Result<JobHandle> {
        self.submitted += 1;
        let script_name = format!("{}.{}", request.name, self.submitted);
        let script = write_job_script(&self.script_dir, &script_name, &request.command)?;

        let args = self.submit_args(request, &script);
        let stdout = self.client.call(&self.msub, &args)?;

        let handle = parse_job_id(&stdout).ok_or_else(|| PipelineError::Scheduler {
            command: format!("{} {}", self.msub, args.join(" ")),
            message: format!("no job id in output '{}'", stdout.trim()),
        })?;

        debug!("Submitted {} as {}", request.name, handle);
        Ok(handle)
    }

    fn release(&mut self, handles: &[JobHandle]) -> Result<()> {
        for handle in handles {
            let args = vec!["-u".to_string(), handle.to_string()];
            self.client.call(&self.mjobctl, &args)?;
        }
        if !handles.is_empty() {
            info!("Released {} held jobs", handles.len());
        }
        Ok(())
    }
}

/// Extracts the job id `msub` prints: its last non-empty output line.
pub fn parse_job_id(stdout: &str) -> Option<JobHandle> {
    let line = stdout.lines().map(str::trim).rev().find(|l| !l.is_empty())?;
    if line.contains(char::is_whitespace) {
        return None;
    }
    Some(JobHandle::new(line))
}
