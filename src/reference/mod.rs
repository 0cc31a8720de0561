//! Reference Index Preparation
//!
//! bwa needs eight auxiliary files next to the reference FASTA. When any
//! is missing the index is rebuilt, first with the `is` algorithm (small
//! genomes) and, only if that fails, with `bwtsw` (large genomes).

use std::fmt;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::environment::ToolPaths;
use crate::error::{PipelineError, Result};
use crate::execution::runner::CommandRunner;

/// Suffixes of the files `bwa index` produces.
pub const INDEX_SUFFIXES: [&str; 8] = [
    ".amb", ".ann", ".bwt", ".pac", ".rbwt", ".rpac", ".rsa", ".sa",
];

/// Algorithm passed to `bwa index -a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStrategy {
    /// Suffix-array construction for small genomes
    Is,
    /// BWT-SW for genomes too large for `is`
    Bwtsw,
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Is => f.write_str("is"),
            Self::Bwtsw => f.write_str("bwtsw"),
        }
    }
}

impl IndexStrategy {
    pub fn command(&self, tools: &ToolPaths, reference: &Path) -> String {
        format!("{} index -a {} {}", tools.bwa(), self, reference.display())
    }
}

/// Ordered index strategies and how many of them may be tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub strategies: Vec<IndexStrategy>,
    pub max_attempts: usize,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            strategies: vec![IndexStrategy::Is, IndexStrategy::Bwtsw],
            max_attempts: 2,
        }
    }
}

/// State of a reference index, as found by [`index_status`] or left by
/// [`ensure_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    /// All index files were already present
    Present,
    /// Built by the given strategy
    Built(IndexStrategy),
    /// These index files do not exist yet
    Missing(Vec<PathBuf>),
}

/// Returns the index files of `reference` that do not exist.
pub fn missing_index_files(reference: &Path) -> Vec<PathBuf> {
    INDEX_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut name = reference.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        })
        .filter(|path| !path.exists())
        .collect()
}

/// Checks the index of `reference` without building anything.
pub fn index_status(reference: &Path) -> IndexStatus {
    let missing = missing_index_files(reference);
    if missing.is_empty() {
        IndexStatus::Present
    } else {
        IndexStatus::Missing(missing)
    }
}

/// Makes sure the bwa index of `reference` exists, building it if needed.
///
/// Strategies are tried in policy order, stopping at the first success
/// and after `max_attempts` tries.
pub fn ensure_index(
    reference: &Path,
    tools: &ToolPaths,
    policy: &FallbackPolicy,
    runner: &mut dyn CommandRunner,
) -> Result<IndexStatus> {
    let missing = match index_status(reference) {
        IndexStatus::Missing(missing) => missing,
        status => {
            info!("bwa index present for {}", reference.display());
            return Ok(status);
        }
    };

    warn!(
        "{} not found, creating bwa index",
        missing[0].display()
    );

    let mut attempted = Vec::new();
    for strategy in policy.strategies.iter().take(policy.max_attempts) {
        let command = strategy.command(tools, reference);
        info!("Building index: {}", command);

        match runner.run(&command) {
            Ok(()) => return Ok(IndexStatus::Built(*strategy)),
            Err(e) => {
                warn!("bwa index -a {} failed: {}", strategy, e);
                attempted.push(command);
            }
        }
    }

    error!("No index strategy succeeded for {}", reference.display());
    Err(PipelineError::IndexBuild {
        reference: reference.to_path_buf(),
        attempted,
    })
}
