//! Tool Command Lines
//!
//! Templates for the bwa and samtools invocations the pipeline submits.

use std::path::Path;

use crate::environment::ToolPaths;
use crate::input::{QualityEncoding, ReadGroup};

/// `bwa aln`: align one read file into a `.sai` file.
pub fn bwa_aln(
    tools: &ToolPaths,
    encoding: QualityEncoding,
    threads: u32,
    qtrim: u32,
    reference: &Path,
    reads: &Path,
    sai: &Path,
) -> String {
    let illumina_flag = match encoding {
        QualityEncoding::Illumina => " -I",
        QualityEncoding::Sanger => "",
    };

    format!(
        "{} aln{} -t {} -q {} -f {} {} {}",
        tools.bwa(),
        illumina_flag,
        threads,
        qtrim,
        sai.display(),
        reference.display(),
        reads.display()
    )
}

/// `bwa samse | samtools view`: single-end `.sai` to BAM.
pub fn bwa_samse(
    tools: &ToolPaths,
    read_group: &ReadGroup,
    reference: &Path,
    sai: &Path,
    reads: &Path,
    bam: &Path,
) -> String {
    format!(
        "{} samse -r \"{}\" {} {} {} | {} view -Sb - > {}",
        tools.bwa(),
        read_group,
        reference.display(),
        sai.display(),
        reads.display(),
        tools.samtools(),
        bam.display()
    )
}

/// `bwa sampe | samtools view`: merge both mates' `.sai` files into BAM.
pub fn bwa_sampe(
    tools: &ToolPaths,
    max_insert: u32,
    read_group: &ReadGroup,
    reference: &Path,
    sai: (&Path, &Path),
    reads: (&Path, &Path),
    bam: &Path,
) -> String {
    format!(
        "{} sampe -a {} -r \"{}\" {} {} {} {} {} | {} view -Sb - > {}",
        tools.bwa(),
        max_insert,
        read_group,
        reference.display(),
        sai.0.display(),
        sai.1.display(),
        reads.0.display(),
        reads.1.display(),
        tools.samtools(),
        bam.display()
    )
}

/// `samtools view -q | samtools sort`: drop low-MAPQ reads and sort.
pub fn sam_filter_sort(
    tools: &ToolPaths,
    input: &Path,
    min_mapq: u32,
    sort_memory: u64,
    output_prefix: &Path,
) -> String {
    let samtools = tools.samtools_svn();
    format!(
        "{} view -u -q {} {} | {} sort -m {} - {}",
        samtools,
        min_mapq,
        input.display(),
        samtools,
        sort_memory,
        output_prefix.display()
    )
}
