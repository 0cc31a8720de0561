//! BAM Filter and Sort
//!
//! Drops alignments below a mapping-quality cutoff and coordinate-sorts
//! the rest, as one `samtools view | samtools sort` pipeline.

use std::path::PathBuf;

use log::info;

use crate::environment::ToolPaths;
use crate::error::Result;
use crate::workflow::commands::sam_filter_sort;

use super::runner::CommandRunner;

/// Default mapping-quality cutoff.
pub const DEFAULT_MIN_MAPQ: u32 = 30;

/// Default `samtools sort -m` memory, in bytes.
pub const DEFAULT_SORT_MEMORY: u64 = 500_000_000;

/// One filter/sort invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSortJob {
    pub input: PathBuf,
    pub min_mapq: u32,
    pub sort_memory: u64,
    /// Output prefix; samtools appends `.bam`
    pub output_prefix: PathBuf,
}

impl FilterSortJob {
    pub fn new(input: impl Into<PathBuf>, output_prefix: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            min_mapq: DEFAULT_MIN_MAPQ,
            sort_memory: DEFAULT_SORT_MEMORY,
            output_prefix: output_prefix.into(),
        }
    }

    pub fn command(&self, tools: &ToolPaths) -> String {
        sam_filter_sort(
            tools,
            &self.input,
            self.min_mapq,
            self.sort_memory,
            &self.output_prefix,
        )
    }

    /// Logs the exact command line, runs it and returns it.
    pub fn run(&self, tools: &ToolPaths, runner: &mut dyn CommandRunner) -> Result<String> {
        let command = self.command(tools);
        info!("{}", command);
        runner.run(&command)?;
        Ok(command)
    }
}
