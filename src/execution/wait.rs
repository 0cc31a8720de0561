//! Completion Wait
//!
//! A run blocks once, at its end, until every job it submitted has
//! finished. One extra job that only touches a semaphore file is
//! submitted depending on all of them (`afterany`); the orchestrator then
//! polls for that file. The file only says the jobs ended, not that they
//! succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{PipelineError, Result};
use crate::workflow::model::{
    CommandBatch, Dependency, DependencyCondition, DependencyKind, ResourceSpec, SemaphoreGroup,
};
use crate::workflow::state::STATE_DIR;

use super::scheduler::Scheduler;
use super::submit::submit_batch;

/// Job-name prefix of the semaphore job.
pub const SEMAPHORE_JOB: &str = "run_genobox_semaphore";

/// File the semaphore job of `label` creates.
pub fn semaphore_path(working_dir: &Path, label: &str) -> PathBuf {
    working_dir
        .join(STATE_DIR)
        .join(format!("semaphore.{}", label))
}

/// Waits until every job of `group` has finished.
///
/// Returns how long the wait took. Fails with a timeout once `timeout`
/// has passed without the semaphore file appearing.
pub fn wait_semaphore(
    scheduler: &mut dyn Scheduler,
    group: &SemaphoreGroup,
    working_dir: &Path,
    queue: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Duration> {
    if group.is_empty() {
        debug!("No jobs to wait for in group '{}'", group.label);
        return Ok(Duration::ZERO);
    }

    let semaphore = semaphore_path(working_dir, &group.label);
    if let Some(dir) = semaphore.parent() {
        fs::create_dir_all(dir)?;
    }
    if semaphore.exists() {
        fs::remove_file(&semaphore)?;
    }

    let mut batch = CommandBatch::new(SEMAPHORE_JOB, ResourceSpec::light());
    batch.push(format!("touch {}", semaphore.display()));
    let dependency = Dependency::new(DependencyKind::AllToOne, group.handles.clone())
        .with_condition(DependencyCondition::AfterAny);
    submit_batch(scheduler, &batch, queue, false, &dependency)?;

    info!(
        "Waiting on {} jobs of group '{}' (timeout {:?})",
        group.handles.len(),
        group.label,
        timeout
    );

    let start = Instant::now();
    loop {
        if semaphore.exists() {
            fs::remove_file(&semaphore)?;
            let waited = start.elapsed();
            info!("Group '{}' finished after {:.2?}", group.label, waited);
            return Ok(waited);
        }

        let waited = start.elapsed();
        if waited >= timeout {
            return Err(PipelineError::Timeout {
                label: group.label.clone(),
                waited,
            });
        }
        thread::sleep(poll_interval.min(timeout - waited));
    }
}
