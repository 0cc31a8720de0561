//! Local Backend
//!
//! Runs jobs on this machine, one at a time, in the working directory.
//! Unheld jobs run during `submit`; held jobs run when released, in the
//! order they were submitted. Dependency conditions are honoured: a job
//! whose `afterok` upstream did not succeed is skipped and counts as
//! failed.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::workflow::model::{DependencyCondition, JobHandle};

use super::runner::{run_script, write_job_script};
use super::scheduler::{script_dir, JobRequest, Scheduler};

/// Where a local job stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Held,
    Succeeded,
    Failed,
    /// Not run because an upstream job failed
    Skipped,
}

impl JobState {
    fn finished(self) -> bool {
        !matches!(self, Self::Held)
    }
}

#[derive(Debug)]
struct LocalJob {
    handle: JobHandle,
    request: JobRequest,
    script: PathBuf,
    state: JobState,
}

/// Runs jobs synchronously with bash.
#[derive(Debug)]
pub struct LocalScheduler {
    working_dir: PathBuf,
    script_dir: PathBuf,
    jobs: Vec<LocalJob>,
}

impl LocalScheduler {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
            script_dir: script_dir(working_dir),
            jobs: Vec::new(),
        }
    }

    /// Submitted requests, in submission order.
    pub fn requests(&self) -> Vec<&JobRequest> {
        self.jobs.iter().map(|job| &job.request).collect()
    }

    pub fn state(&self, handle: &JobHandle) -> Option<JobState> {
        self.position(handle).map(|i| self.jobs[i].state)
    }

    fn position(&self, handle: &JobHandle) -> Option<usize> {
        self.jobs.iter().position(|job| &job.handle == handle)
    }

    /// Runs job `index` once everything it depends on has finished.
    fn run_job(&mut self, index: usize) -> Result<()> {
        let mut upstream_failed = false;
        for dependency in &self.jobs[index].request.depends_on {
            let state = self
                .state(dependency)
                .ok_or_else(|| PipelineError::Scheduler {
                    command: self.jobs[index].handle.to_string(),
                    message: format!("unknown upstream job {}", dependency),
                })?;
            if !state.finished() {
                return Err(PipelineError::Scheduler {
                    command: self.jobs[index].handle.to_string(),
                    message: format!("upstream job {} is still held", dependency),
                });
            }
            upstream_failed |= state != JobState::Succeeded;
        }

        let job = &mut self.jobs[index];
        if upstream_failed && job.request.condition == DependencyCondition::AfterOk {
            warn!("Skipping {} ({}): upstream job failed", job.handle, job.request.name);
            job.state = JobState::Skipped;
            return Ok(());
        }

        info!("Running {} ({})", job.handle, job.request.name);
        job.state = match run_script(&job.script, &self.working_dir) {
            Ok(()) => JobState::Succeeded,
            Err(e) => {
                error!("Job {} failed: {}", job.handle, e);
                JobState::Failed
            }
        };
        Ok(())
    }
}

impl Scheduler for LocalScheduler {
    fn submit(&mut self, request: &JobRequest) -> Result<JobHandle> {
        let handle = JobHandle::new(format!("local.{}", self.jobs.len() + 1));
        let script_name = format!("{}.{}", request.name, self.jobs.len() + 1);
        let script = write_job_script(&self.script_dir, &script_name, &request.command)?;

        self.jobs.push(LocalJob {
            handle: handle.clone(),
            request: request.clone(),
            script,
            state: JobState::Held,
        });

        if !request.hold {
            self.run_job(self.jobs.len() - 1)?;
        }
        Ok(handle)
    }

    fn release(&mut self, handles: &[JobHandle]) -> Result<()> {
        let mut indices = Vec::with_capacity(handles.len());
        for handle in handles {
            let index = self.position(handle).ok_or_else(|| PipelineError::Scheduler {
                command: format!("release {}", handle),
                message: "unknown job".to_string(),
            })?;
            indices.push(index);
        }
        indices.sort_unstable();
        indices.dedup();

        for index in indices {
            if self.jobs[index].state == JobState::Held {
                self.run_job(index)?;
            }
        }
        Ok(())
    }
}
