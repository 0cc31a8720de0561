//! Alignment Stage Builder
//!
//! Turns classified read files into the two-batch stage plans submitted
//! to the scheduler:
//!
//! - single end: `aln` per file, then `samse` per file (one-to-one)
//! - paired end: `aln` per mate, then `sampe` per pair (fan-in of two)
//!
//! Every input is validated before any command is produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::environment::ToolPaths;
use crate::error::{PipelineError, Result};
use crate::input::{LibraryFile, ReadFile};

use super::commands::{bwa_aln, bwa_samse, bwa_sampe};
use super::model::{CommandBatch, DependencyKind, ResourceSpec, StagePlan};

/// Job-name prefix of single-end align jobs.
pub const JOB_ALIGN: &str = "run_genobox_bwaalign";
/// Job-name prefix of single-end finish jobs.
pub const JOB_SAMSE: &str = "run_genobox_bwasamse";
/// Job-name prefix of mate-1 align jobs.
pub const JOB_ALIGN_MATE1: &str = "run_genobox_bwaalign1";
/// Job-name prefix of mate-2 align jobs.
pub const JOB_ALIGN_MATE2: &str = "run_genobox_bwaalign2";
/// Job-name prefix of pair-merge jobs.
pub const JOB_SAMPE: &str = "run_genobox_bwasampe";

/// Settings shared by every command of an alignment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentParams {
    pub reference: PathBuf,
    /// Read-trimming quality threshold (`bwa aln -q`)
    pub qtrim: u32,
    /// Maximum insert size for paired reads (`bwa sampe -a`)
    pub max_insert: u32,
    pub threads: u32,
    /// Directory receiving `.sai` and `.bam` files
    pub output_dir: PathBuf,
}

impl AlignmentParams {
    fn artifact(&self, read: &ReadFile, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", read.file_name(), extension))
    }
}

/// Builds the single-end stage for `reads`.
pub fn build_single_end(
    reads: &[ReadFile],
    params: &AlignmentParams,
    tools: &ToolPaths,
    library: &LibraryFile,
) -> Result<StagePlan> {
    let read_groups = reads
        .iter()
        .map(|read| library.read_group(&read.path))
        .collect::<Result<Vec<_>>>()?;

    let mut align = CommandBatch::new(JOB_ALIGN, ResourceSpec::threaded(params.threads));
    let mut samse = CommandBatch::new(JOB_SAMSE, ResourceSpec::single());
    let mut artifacts = BTreeMap::new();

    for (read, read_group) in reads.iter().zip(&read_groups) {
        let sai = params.artifact(read, "sai");
        let bam = params.artifact(read, "bam");

        align.push(bwa_aln(
            tools,
            read.encoding,
            params.threads,
            params.qtrim,
            &params.reference,
            &read.path,
            &sai,
        ));
        samse.push(bwa_samse(
            tools,
            read_group,
            &params.reference,
            &sai,
            &read.path,
            &bam,
        ));

        debug!("{} -> {}", read.path.display(), bam.display());
        artifacts.insert(read.path.clone(), bam);
    }

    info!("Built {} single end alignments", reads.len());

    Ok(StagePlan {
        upstream: vec![align],
        downstream: samse,
        wiring: DependencyKind::OneToOne,
        artifacts,
    })
}

/// Builds the paired-end stage for mates `mate1[i]` / `mate2[i]`.
///
/// Mates must be equally many and share their quality encoding. The read
/// group of a pair is taken from its mate-1 file.
pub fn build_paired_end(
    mate1: &[ReadFile],
    mate2: &[ReadFile],
    params: &AlignmentParams,
    tools: &ToolPaths,
    library: &LibraryFile,
) -> Result<StagePlan> {
    check_pairs(mate1, mate2)?;

    let read_groups = mate1
        .iter()
        .map(|read| library.read_group(&read.path))
        .collect::<Result<Vec<_>>>()?;

    let align_resources = ResourceSpec::threaded(params.threads);
    let mut align1 = CommandBatch::new(JOB_ALIGN_MATE1, align_resources.clone());
    let mut align2 = CommandBatch::new(JOB_ALIGN_MATE2, align_resources);
    let mut sampe = CommandBatch::new(JOB_SAMPE, ResourceSpec::single());
    let mut artifacts = BTreeMap::new();

    for ((first, second), read_group) in mate1.iter().zip(mate2).zip(&read_groups) {
        let sai1 = params.artifact(first, "sai");
        let sai2 = params.artifact(second, "sai");
        let bam = params.artifact(first, "bam");

        align1.push(bwa_aln(
            tools,
            first.encoding,
            params.threads,
            params.qtrim,
            &params.reference,
            &first.path,
            &sai1,
        ));
        align2.push(bwa_aln(
            tools,
            second.encoding,
            params.threads,
            params.qtrim,
            &params.reference,
            &second.path,
            &sai2,
        ));
        sampe.push(bwa_sampe(
            tools,
            params.max_insert,
            read_group,
            &params.reference,
            (&sai1, &sai2),
            (&first.path, &second.path),
            &bam,
        ));

        artifacts.insert(first.path.clone(), bam.clone());
        artifacts.insert(second.path.clone(), bam);
    }

    info!("Built {} paired end alignments", mate1.len());

    Ok(StagePlan {
        upstream: vec![align1, align2],
        downstream: sampe,
        wiring: DependencyKind::FanIn(2),
        artifacts,
    })
}

/// Rejects unequal mate lists before anything is classified.
pub fn check_pair_counts(mate1: &[PathBuf], mate2: &[PathBuf]) -> Result<()> {
    if mate1.len() != mate2.len() {
        return Err(PipelineError::Mismatch(format!(
            "Same number of files must be given to --pe1 and --pe2 ({} vs {})",
            mate1.len(),
            mate2.len()
        )));
    }
    Ok(())
}

fn check_pairs(mate1: &[ReadFile], mate2: &[ReadFile]) -> Result<()> {
    if mate1.len() != mate2.len() {
        return Err(PipelineError::Mismatch(format!(
            "{} first mates but {} second mates",
            mate1.len(),
            mate2.len()
        )));
    }

    for (first, second) in mate1.iter().zip(mate2) {
        if first.encoding != second.encoding {
            return Err(PipelineError::Mismatch(format!(
                "Fastq formats are not the same for {} ({}) and {} ({})",
                display(&first.path),
                first.encoding,
                display(&second.path),
                second.encoding
            )));
        }
    }
    Ok(())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
