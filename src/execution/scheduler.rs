//! Scheduler Abstraction
//!
//! The pipeline only ever talks to a batch scheduler through
//! [`Scheduler`]: submit one job, release held jobs. The cluster backend
//! lives in [`super::moab`], the local one in [`super::local`]; the
//! dry-run backend below only prints what would be submitted.

use std::path::{Path, PathBuf};

use colored::Colorize;
use log::info;

use crate::environment::{Backend, Settings};
use crate::error::Result;
use crate::workflow::model::{DependencyCondition, JobHandle, ResourceSpec};

use super::local::LocalScheduler;
use super::moab::MoabScheduler;

/// One job as handed to a scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Job-name prefix of the batch this job belongs to
    pub name: String,
    pub command: String,
    pub queue: String,
    pub resources: ResourceSpec,
    /// Submit in held state; the job starts only once released
    pub hold: bool,
    pub condition: DependencyCondition,
    pub depends_on: Vec<JobHandle>,
}

/// A batch scheduler accepting jobs.
///
/// Submission returns as soon as the scheduler has accepted the job; it
/// says nothing about whether the command will succeed.
pub trait Scheduler {
    fn submit(&mut self, request: &JobRequest) -> Result<JobHandle>;

    /// Releases jobs submitted with `hold`.
    fn release(&mut self, handles: &[JobHandle]) -> Result<()>;
}

/// Prints requests instead of submitting them.
#[derive(Debug, Default)]
pub struct DryRunScheduler {
    submitted: Vec<JobRequest>,
}

impl DryRunScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[JobRequest] {
        &self.submitted
    }
}

impl Scheduler for DryRunScheduler {
    fn submit(&mut self, request: &JobRequest) -> Result<JobHandle> {
        let handle = JobHandle::new(format!("dryrun.{}", self.submitted.len() + 1));

        println!();
        println!("{} Job: {} ({})", "[DRY RUN]".cyan(), request.name, handle);
        println!("  Command: {}", request.command);
        println!("  Queue: {}  Resources: {}", request.queue, request.resources);
        if request.hold {
            println!("  Held until released");
        }
        if !request.depends_on.is_empty() {
            let ids: Vec<&str> = request.depends_on.iter().map(JobHandle::as_str).collect();
            println!("  Depends ({}): {}", request.condition, ids.join(", "));
        }

        self.submitted.push(request.clone());
        Ok(handle)
    }

    fn release(&mut self, handles: &[JobHandle]) -> Result<()> {
        if !handles.is_empty() {
            println!("{} Release {} held jobs", "[DRY RUN]".cyan(), handles.len());
        }
        Ok(())
    }
}

/// Directory job scripts are written to.
pub fn script_dir(working_dir: &Path) -> PathBuf {
    working_dir
        .join(crate::workflow::state::STATE_DIR)
        .join("scripts")
}

/// Builds the scheduler backend `settings` selects.
pub fn scheduler_for(
    settings: &Settings,
    working_dir: &Path,
    dry_run: bool,
) -> Box<dyn Scheduler> {
    if dry_run {
        info!("Dry run: jobs are printed, not submitted");
        return Box::new(DryRunScheduler::new());
    }

    match settings.scheduler.backend {
        Backend::Moab => {
            info!("Submitting through Moab (queue: {})", settings.scheduler.queue);
            Box::new(MoabScheduler::new(&settings.tools, working_dir))
        }
        Backend::Local => {
            info!("Running jobs locally in {}", working_dir.display());
            Box::new(LocalScheduler::new(working_dir))
        }
    }
}
