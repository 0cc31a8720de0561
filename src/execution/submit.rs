//! Batch Submission
//!
//! Submits command batches through a [`Scheduler`], wiring each job onto
//! its upstream handles as the batch's [`Dependency`] describes.

use log::{debug, info};

use crate::error::Result;
use crate::workflow::model::{CommandBatch, Dependency, JobHandle, StagePlan};

use super::scheduler::{JobRequest, Scheduler};

/// Handles one batch received, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBatch {
    pub name: String,
    pub handles: Vec<JobHandle>,
}

/// Submits every command of `batch` as one job.
///
/// The dependency is validated against the batch size before anything
/// is submitted.
pub fn submit_batch(
    scheduler: &mut dyn Scheduler,
    batch: &CommandBatch,
    queue: &str,
    hold: bool,
    dependency: &Dependency,
) -> Result<Vec<JobHandle>> {
    dependency.validate(batch.len())?;

    let mut handles = Vec::with_capacity(batch.len());
    for (index, command) in batch.commands.iter().enumerate() {
        let request = JobRequest {
            name: batch.name.clone(),
            command: command.clone(),
            queue: queue.to_string(),
            resources: batch.resources.clone(),
            hold,
            condition: dependency.condition,
            depends_on: dependency.upstream_for(index).to_vec(),
        };
        handles.push(scheduler.submit(&request)?);
    }

    debug!(
        "Submitted {} {} jobs ({}, held: {})",
        handles.len(),
        batch.name,
        dependency.kind,
        hold
    );
    Ok(handles)
}

/// Interleaves per-batch handles: job 0 of every batch, then job 1, ...
pub fn interleave(batches: &[Vec<JobHandle>]) -> Vec<JobHandle> {
    let longest = batches.iter().map(Vec::len).max().unwrap_or(0);
    let mut merged = Vec::with_capacity(batches.iter().map(Vec::len).sum());
    for index in 0..longest {
        merged.extend(batches.iter().filter_map(|b| b.get(index)).cloned());
    }
    merged
}

/// Submits a whole stage.
///
/// Upstream batches go in unheld, the downstream batch held and wired
/// onto the interleaved upstream handles; the downstream jobs are then
/// released. Returns every batch's handles, downstream last.
pub fn submit_stage(
    scheduler: &mut dyn Scheduler,
    plan: &StagePlan,
    queue: &str,
) -> Result<Vec<SubmittedBatch>> {
    let mut submitted = Vec::with_capacity(plan.upstream.len() + 1);

    for batch in &plan.upstream {
        let handles = submit_batch(scheduler, batch, queue, false, &Dependency::none())?;
        submitted.push(SubmittedBatch {
            name: batch.name.clone(),
            handles,
        });
    }

    let upstream: Vec<Vec<JobHandle>> = submitted.iter().map(|b| b.handles.clone()).collect();
    let dependency = Dependency::new(plan.wiring, interleave(&upstream));

    let held = submit_batch(scheduler, &plan.downstream, queue, true, &dependency)?;
    scheduler.release(&held)?;

    info!(
        "Submitted {} {} jobs depending on {} upstream jobs",
        held.len(),
        plan.downstream.name,
        dependency.upstream.len()
    );

    submitted.push(SubmittedBatch {
        name: plan.downstream.name.clone(),
        handles: held,
    });
    Ok(submitted)
}
