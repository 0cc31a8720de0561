//! Job Data Model
//!
//! Batches of independent commands, the handles the scheduler returns
//! for them, and the typed dependency descriptor wiring one batch onto
//! the handles of another.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Opaque identifier the scheduler returned for one submitted job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduler resource request, e.g. `nodes=1:ppn=4,mem=5gb`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub nodes: u32,
    pub ppn: u32,
    pub mem_gb: u32,
}

impl ResourceSpec {
    pub fn new(ppn: u32, mem_gb: u32) -> Self {
        Self {
            nodes: 1,
            ppn: ppn.max(1),
            mem_gb,
        }
    }

    /// One core, 5 GB: finish and merge jobs.
    pub fn single() -> Self {
        Self::new(1, 5)
    }

    /// `threads` cores, 5 GB: align jobs.
    pub fn threaded(threads: u32) -> Self {
        Self::new(threads, 5)
    }

    /// One core, 2 GB: bookkeeping jobs.
    pub fn light() -> Self {
        Self::new(1, 2)
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes={}:ppn={},mem={}gb",
            self.nodes, self.ppn, self.mem_gb
        )
    }
}

/// Mutually independent commands submitted together as one stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    /// Job-name prefix the scheduler tags each job with
    pub name: String,
    pub commands: Vec<String>,
    pub resources: ResourceSpec,
}

impl CommandBatch {
    pub fn new(name: impl Into<String>, resources: ResourceSpec) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            resources,
        }
    }

    pub fn push(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// How the jobs of a batch map onto upstream handles.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// No upstream jobs
    None,
    /// Job i waits on upstream i ("one2one")
    OneToOne,
    /// Job i waits on the i-th contiguous run of n upstream jobs ("conc")
    FanIn(usize),
    /// Every job waits on every upstream job
    AllToOne,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::OneToOne => f.write_str("one2one"),
            Self::FanIn(n) => write!(f, "conc({})", n),
            Self::AllToOne => f.write_str("all2one"),
        }
    }
}

/// When a dependent job may start.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyCondition {
    /// Upstream jobs finished successfully
    #[default]
    AfterOk,
    /// Upstream jobs finished, whatever their exit status
    AfterAny,
}

impl fmt::Display for DependencyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AfterOk => f.write_str("afterok"),
            Self::AfterAny => f.write_str("afterany"),
        }
    }
}

/// Typed dependency of a batch on previously submitted jobs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub condition: DependencyCondition,
    pub upstream: Vec<JobHandle>,
}

impl Dependency {
    pub fn none() -> Self {
        Self {
            kind: DependencyKind::None,
            condition: DependencyCondition::AfterOk,
            upstream: Vec::new(),
        }
    }

    pub fn new(kind: DependencyKind, upstream: Vec<JobHandle>) -> Self {
        Self {
            kind,
            condition: DependencyCondition::AfterOk,
            upstream,
        }
    }

    pub fn with_condition(mut self, condition: DependencyCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Checks that this dependency can be wired onto `jobs` jobs.
    pub fn validate(&self, jobs: usize) -> Result<()> {
        let upstream = self.upstream.len();
        let fits = match self.kind {
            DependencyKind::None => upstream == 0,
            DependencyKind::OneToOne => upstream == jobs,
            DependencyKind::FanIn(n) => n > 0 && upstream == n * jobs,
            DependencyKind::AllToOne => upstream > 0 || jobs == 0,
        };

        if fits {
            Ok(())
        } else {
            Err(PipelineError::DependencyWiring {
                kind: self.kind.to_string(),
                jobs,
                upstream,
            })
        }
    }

    /// Upstream handles job `index` of the batch waits on.
    ///
    /// Callers validate first; an out-of-range index yields no handles.
    pub fn upstream_for(&self, index: usize) -> &[JobHandle] {
        let range = match self.kind {
            DependencyKind::None => 0..0,
            DependencyKind::OneToOne => index..index + 1,
            DependencyKind::FanIn(n) => index * n..(index + 1) * n,
            DependencyKind::AllToOne => 0..self.upstream.len(),
        };
        self.upstream.get(range).unwrap_or(&[])
    }
}

/// Everything one stage of the pipeline submits.
///
/// The upstream batches are submitted first and their handles
/// interleaved (job 0 of every batch, then job 1, ...); the downstream
/// batch is wired onto that sequence with `wiring`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub upstream: Vec<CommandBatch>,
    pub downstream: CommandBatch,
    pub wiring: DependencyKind,
    /// Read file -> alignment produced from it
    pub artifacts: BTreeMap<PathBuf, PathBuf>,
}

impl StagePlan {
    pub fn is_empty(&self) -> bool {
        self.downstream.is_empty() && self.upstream.iter().all(CommandBatch::is_empty)
    }
}

/// All jobs of one pipeline run, waited on together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SemaphoreGroup {
    pub label: String,
    pub handles: Vec<JobHandle>,
}

impl SemaphoreGroup {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            handles: Vec::new(),
        }
    }

    pub fn extend(&mut self, handles: impl IntoIterator<Item = JobHandle>) {
        self.handles.extend(handles);
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
