//! Alignment Engine
//!
//! Drives one alignment run from start to finish:
//! - load or synthesize the library file
//! - make sure the reference index exists
//! - classify every read file
//! - submit single-end and paired-end stages
//! - wait for the whole run, check every BAM was written, then record
//!   BAM paths in the library file

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use colored::Colorize;
use log::{info, warn};

use crate::environment::Settings;
use crate::error::{PipelineError, Result};
use crate::input::{LibraryFile, PairRole, ReadFile};
use crate::reference::{ensure_index, index_status, FallbackPolicy, IndexStatus};
use crate::workflow::builder::{build_paired_end, build_single_end, check_pair_counts, AlignmentParams};
use crate::workflow::model::{SemaphoreGroup, StagePlan};
use crate::workflow::state::RunRecord;

use super::runner::{CommandRunner, ShellRunner};
use super::scheduler::{scheduler_for, Scheduler};
use super::submit::submit_stage;
use super::wait::wait_semaphore;

/// Label of the job group every alignment run waits on.
pub const ALIGNMENT_LABEL: &str = "bwa_alignment";

/// Directory under the working directory receiving alignments.
pub const ALIGNMENT_DIR: &str = "alignment";

/// Library file written when none is given.
pub const DEFAULT_LIBFILE: &str = "libs.txt";

/// What to align and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRequest {
    pub single_end: Vec<PathBuf>,
    pub mate1: Vec<PathBuf>,
    pub mate2: Vec<PathBuf>,
    pub reference: PathBuf,
    pub qtrim: u32,
    pub max_insert: u32,
    pub threads: u32,
    /// Existing library file; synthesized from the inputs when absent
    pub libfile: Option<PathBuf>,
    pub sample: String,
    pub mapq: Vec<u32>,
    pub libs: Vec<String>,
}

impl AlignmentRequest {
    /// Copy with every relative file path joined onto `base`.
    ///
    /// Jobs run in the working directory, so they must never see a path
    /// relative to the directory the run was started from.
    pub fn resolved(&self, base: &Path) -> Self {
        let resolve = |path: &PathBuf| absolute(base, path);
        Self {
            single_end: self.single_end.iter().map(resolve).collect(),
            mate1: self.mate1.iter().map(resolve).collect(),
            mate2: self.mate2.iter().map(resolve).collect(),
            reference: resolve(&self.reference),
            libfile: self.libfile.as_ref().map(resolve),
            ..self.clone()
        }
    }

    fn inputs(&self) -> Vec<PathBuf> {
        self.single_end
            .iter()
            .chain(&self.mate1)
            .chain(&self.mate2)
            .cloned()
            .collect()
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct AlignmentOutcome {
    pub record: RunRecord,
    pub index: IndexStatus,
    /// Read file -> BAM path
    pub artifacts: BTreeMap<PathBuf, PathBuf>,
    pub libfile: PathBuf,
}

/// Alignment run engine.
///
/// # Example
///
/// ```rust,no_run
/// use genobox::environment::Settings;
/// use genobox::execution::{AlignmentRequest, Engine};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let request = AlignmentRequest {
///         single_end: vec!["reads.fq".into()],
///         mate1: vec![],
///         mate2: vec![],
///         reference: "/ref/hg19.fa".into(),
///         qtrim: 20,
///         max_insert: 500,
///         threads: 4,
///         libfile: None,
///         sample: "patient1".to_string(),
///         mapq: vec![],
///         libs: vec![],
///     };
///
///     let mut engine = Engine::new(Settings::resolve(None)?);
///     engine.set_working_dir("/data/analysis");
///     engine.run(&request)?;
///     Ok(())
/// }
/// ```
pub struct Engine {
    settings: Settings,
    working_dir: Option<PathBuf>,
    dry_run: bool,
    policy: FallbackPolicy,
    label: String,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            working_dir: None,
            dry_run: false,
            policy: FallbackPolicy::default(),
            label: ALIGNMENT_LABEL.to_string(),
        }
    }

    /// Enables or disables dry run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Sets the directory jobs run in and artifacts are written to.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = Some(dir.into());
    }

    pub fn set_fallback_policy(&mut self, policy: FallbackPolicy) {
        self.policy = policy;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Absolute working directory (current directory when unset).
    pub fn working_dir(&self) -> Result<PathBuf> {
        let cwd = env::current_dir()?;
        Ok(match &self.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd,
        })
    }

    /// Runs `request` with the backend and shell the settings select.
    pub fn run(&mut self, request: &AlignmentRequest) -> Result<AlignmentOutcome> {
        let working_dir = self.working_dir()?;
        let mut scheduler = scheduler_for(&self.settings, &working_dir, self.dry_run);
        let mut runner = ShellRunner::in_dir(&working_dir);
        self.start_alignment(request, scheduler.as_mut(), &mut runner)
    }

    /// Runs one alignment, submitting through `scheduler` and building
    /// the index with `runner`.
    pub fn start_alignment(
        &mut self,
        request: &AlignmentRequest,
        scheduler: &mut dyn Scheduler,
        runner: &mut dyn CommandRunner,
    ) -> Result<AlignmentOutcome> {
        let start_time = Instant::now();

        let cwd = env::current_dir()?;
        let request = &request.resolved(&cwd);
        let inputs = request.inputs();
        if inputs.is_empty() {
            return Err(PipelineError::NoInput);
        }
        check_pair_counts(&request.mate1, &request.mate2)?;

        let working_dir = self.working_dir()?;
        let output_dir = working_dir.join(ALIGNMENT_DIR);
        if !self.dry_run {
            fs::create_dir_all(&output_dir)?;
        }

        let mut library = match &request.libfile {
            Some(path) => {
                let mut library = LibraryFile::load(path)?;
                library.resolve_data_paths(&cwd);
                library
            }
            None => LibraryFile::from_inputs(
                working_dir.join(DEFAULT_LIBFILE),
                &inputs,
                &request.sample,
                &request.mapq,
                &request.libs,
            )?,
        };

        let index = self.prepare_reference(&request.reference, runner)?;

        let single_end = classify_all(&request.single_end, PairRole::Unpaired)?;
        let mate1 = classify_all(&request.mate1, PairRole::FirstOfPair)?;
        let mate2 = classify_all(&request.mate2, PairRole::SecondOfPair)?;

        let params = AlignmentParams {
            reference: request.reference.clone(),
            qtrim: request.qtrim,
            max_insert: request.max_insert,
            threads: request.threads,
            output_dir,
        };
        let tools = &self.settings.tools;
        let queue = self.settings.scheduler.queue.clone();

        let mut group = SemaphoreGroup::new(&self.label);
        let mut record = RunRecord::new(&self.label);

        if !single_end.is_empty() {
            println!("{}", "Submitting single end alignments".bold());
            let plan = build_single_end(&single_end, &params, tools, &library)?;
            submit_plan(scheduler, &plan, &queue, &mut group, &mut record)?;
        }

        if !mate1.is_empty() {
            println!("{}", "Submitting paired end alignments".bold());
            let plan = build_paired_end(&mate1, &mate2, &params, tools, &library)?;
            submit_plan(scheduler, &plan, &queue, &mut group, &mut record)?;
        }

        let artifacts = record.artifacts.clone();
        if self.dry_run {
            info!(
                "Dry run: {} jobs planned, nothing submitted",
                record.job_count()
            );
            return Ok(AlignmentOutcome {
                record,
                index,
                artifacts,
                libfile: library.path().to_path_buf(),
            });
        }

        println!("{}", "Waiting for jobs to finish ...".bold());
        wait_semaphore(
            scheduler,
            &group,
            &working_dir,
            &queue,
            self.settings.scheduler.poll_interval(),
            self.settings.scheduler.timeout(),
        )?;
        println!("--------------------------------------");
        record.save(&working_dir)?;

        // Paired mates share one BAM
        let mut missing: Vec<PathBuf> = artifacts
            .values()
            .filter(|bam| !bam.exists())
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        if !missing.is_empty() {
            return Err(PipelineError::MissingArtifacts {
                label: self.label.clone(),
                missing,
            });
        }

        let updated = library.update_artifacts(&artifacts, true);
        library.save()?;
        info!(
            "Recorded {} BAM paths in {}",
            updated,
            library.path().display()
        );

        println!();
        println!("{}", "Alignment completed".green());
        println!("Total time: {:.2?}", start_time.elapsed());

        Ok(AlignmentOutcome {
            record,
            index,
            artifacts,
            libfile: library.path().to_path_buf(),
        })
    }

    fn prepare_reference(
        &self,
        reference: &Path,
        runner: &mut dyn CommandRunner,
    ) -> Result<IndexStatus> {
        if self.dry_run {
            let status = index_status(reference);
            if let IndexStatus::Missing(missing) = &status {
                warn!(
                    "Dry run: {} index files missing for {}, index would be built",
                    missing.len(),
                    reference.display()
                );
            }
            return Ok(status);
        }

        let status = ensure_index(reference, &self.settings.tools, &self.policy, runner)?;
        if let IndexStatus::Built(strategy) = &status {
            info!("Built bwa index ({}) for {}", strategy, reference.display());
        }
        Ok(status)
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn classify_all(paths: &[PathBuf], role: PairRole) -> Result<Vec<ReadFile>> {
    paths
        .iter()
        .map(|path| ReadFile::classify(path.clone(), role))
        .collect()
}

fn submit_plan(
    scheduler: &mut dyn Scheduler,
    plan: &StagePlan,
    queue: &str,
    group: &mut SemaphoreGroup,
    record: &mut RunRecord,
) -> Result<()> {
    let submitted = submit_stage(scheduler, plan, queue)?;
    for batch in &submitted {
        record.record_batch(&batch.name, &batch.handles);
        group.extend(batch.handles.iter().cloned());
    }
    record.record_artifacts(&plan.artifacts);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Backend, ToolPaths};
    use crate::execution::local::{JobState, LocalScheduler};
    use crate::execution::scheduler::DryRunScheduler;
    use crate::reference::INDEX_SUFFIXES;
    use crate::workflow::builder::{JOB_ALIGN, JOB_SAMPE, JOB_SAMSE};
    use crate::workflow::model::JobHandle;
    use tempfile::{tempdir, TempDir};

    /// Counts commands; every index build fails.
    #[derive(Default)]
    struct CountingRunner {
        calls: Vec<String>,
    }

    impl CommandRunner for CountingRunner {
        fn run(&mut self, command: &str) -> Result<()> {
            self.calls.push(command.to_string());
            Err(PipelineError::Command {
                command: command.to_string(),
                code: Some(1),
            })
        }
    }

    const SANGER_FASTQ: &str = "@r1\nACGT\n+\n!!II\n@r2\nACGT\n+\n#5II\n";
    const ILLUMINA_FASTQ: &str = "@r1\nACGT\n+\nhhhh\n@r2\nACGT\n+\nBBhh\n";

    fn write_stub(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/bash\n{}\n", body)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    /// Work dir with an indexed reference and stub tools logging their
    /// arguments to `calls.log`.
    fn fixture() -> (TempDir, Settings) {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();

        let bin = root.join("bin");
        fs::create_dir_all(&bin).unwrap();
        let log = root.join("calls.log");
        write_stub(&bin, "bwa", &format!("echo \"bwa $*\" >> {}", log.display()));
        write_stub(
            &bin,
            "samtools",
            &format!("cat > /dev/null\necho \"samtools $*\" >> {}", log.display()),
        );

        fs::write(root.join("ref.fa"), ">chr1\nACGT\n").unwrap();
        for suffix in INDEX_SUFFIXES {
            fs::write(root.join(format!("ref.fa{}", suffix)), "").unwrap();
        }

        let mut settings = Settings::default();
        settings.tools = ToolPaths {
            bwa_home: Some(bin.clone()),
            samtools_home: Some(bin),
            ..Default::default()
        };
        settings.scheduler.backend = Backend::Local;
        settings.scheduler.poll_interval_secs = 1;
        settings.scheduler.timeout_secs = 30;

        (temp_dir, settings)
    }

    fn request(root: &Path) -> AlignmentRequest {
        AlignmentRequest {
            single_end: vec![],
            mate1: vec![],
            mate2: vec![],
            reference: root.join("ref.fa"),
            qtrim: 20,
            max_insert: 500,
            threads: 1,
            libfile: None,
            sample: "S1".to_string(),
            mapq: vec![],
            libs: vec![],
        }
    }

    fn fastq(root: &Path, name: &str, content: &str) -> PathBuf {
        let path = root.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn engine(root: &Path, settings: Settings) -> Engine {
        let mut engine = Engine::new(settings);
        engine.set_working_dir(root);
        engine
    }

    #[test]
    fn test_engine_working_directory() {
        let mut engine = Engine::new(Settings::default());
        engine.set_working_dir("/data/analysis");
        assert_eq!(engine.working_dir().unwrap(), PathBuf::from("/data/analysis"));
    }

    #[test]
    fn test_no_input_fails() {
        let (temp_dir, settings) = fixture();
        let mut engine = engine(temp_dir.path(), settings);
        let mut scheduler = DryRunScheduler::new();

        let result = engine.start_alignment(&request(temp_dir.path()), &mut scheduler, &mut CountingRunner::default());
        assert!(matches!(result, Err(PipelineError::NoInput)));
    }

    #[test]
    fn test_pair_count_mismatch_fails_before_submission() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        let mut req = request(root);
        req.mate1 = vec![fastq(root, "a_1.fq", SANGER_FASTQ), fastq(root, "b_1.fq", SANGER_FASTQ)];
        req.mate2 = vec![fastq(root, "a_2.fq", SANGER_FASTQ)];

        let mut engine = engine(root, settings);
        let mut scheduler = DryRunScheduler::new();
        let result = engine.start_alignment(&req, &mut scheduler, &mut CountingRunner::default());

        assert!(matches!(result, Err(PipelineError::Mismatch(_))));
        assert!(scheduler.requests().is_empty());
    }

    #[test]
    fn test_two_single_end_files_end_to_end() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        let mut req = request(root);
        req.single_end = vec![fastq(root, "a.fq", SANGER_FASTQ), fastq(root, "b.fq", SANGER_FASTQ)];

        let mut engine = engine(root, settings);
        let mut scheduler = LocalScheduler::new(root);
        let mut runner = CountingRunner::default();
        let outcome = engine.start_alignment(&req, &mut scheduler, &mut runner).unwrap();

        // Index present: nothing rebuilt
        assert!(runner.calls.is_empty());
        assert_eq!(outcome.index, IndexStatus::Present);

        let requests = scheduler.requests();
        let aligns: Vec<_> = requests.iter().filter(|r| r.name == JOB_ALIGN).collect();
        let samses: Vec<_> = requests.iter().filter(|r| r.name == JOB_SAMSE).collect();
        assert_eq!(aligns.len(), 2);
        assert_eq!(samses.len(), 2);

        let align_handles = &outcome.record.batches[JOB_ALIGN];
        let samse_handles = &outcome.record.batches[JOB_SAMSE];
        for (i, samse) in samses.iter().enumerate() {
            assert_eq!(samse.depends_on, vec![align_handles[i].clone()]);
            assert_eq!(scheduler.state(&samse_handles[i]), Some(JobState::Succeeded));
        }

        let calls = fs::read_to_string(root.join("calls.log")).unwrap();
        assert!(!calls.contains("index"));
        assert_eq!(calls.matches("bwa aln").count(), 2);
        assert_eq!(calls.matches("bwa samse").count(), 2);

        let library = LibraryFile::load(root.join(DEFAULT_LIBFILE)).unwrap();
        let a = library.entry(&root.join("a.fq")).unwrap();
        let b = library.entry(&root.join("b.fq")).unwrap();
        assert_eq!(a.bam.as_deref(), Some(root.join("alignment/a.fq.bam").as_path()));
        assert_eq!(b.bam.as_deref(), Some(root.join("alignment/b.fq.bam").as_path()));

        assert!(RunRecord::record_path(root, ALIGNMENT_LABEL).exists());
        assert!(root.join("alignment").is_dir());
    }

    #[test]
    fn test_paired_end_end_to_end() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        let mut req = request(root);
        req.mate1 = vec![fastq(root, "p_1.fq", ILLUMINA_FASTQ)];
        req.mate2 = vec![fastq(root, "p_2.fq", ILLUMINA_FASTQ)];

        let mut engine = engine(root, settings);
        let mut scheduler = LocalScheduler::new(root);
        let outcome = engine
            .start_alignment(&req, &mut scheduler, &mut CountingRunner::default())
            .unwrap();

        let merges = &outcome.record.batches[JOB_SAMPE];
        assert_eq!(merges.len(), 1);
        let merge = scheduler
            .requests()
            .into_iter()
            .find(|r| r.name == JOB_SAMPE)
            .unwrap()
            .clone();
        assert_eq!(merge.depends_on.len(), 2);
        assert!(merge.command.contains("sampe -a 500"));

        let calls = fs::read_to_string(root.join("calls.log")).unwrap();
        assert_eq!(calls.matches("bwa aln -I").count(), 2);

        let bam = root.join("alignment/p_1.fq.bam");
        assert_eq!(outcome.artifacts[&root.join("p_2.fq")], bam);
        let library = LibraryFile::load(root.join(DEFAULT_LIBFILE)).unwrap();
        assert_eq!(library.entry(&root.join("p_2.fq")).unwrap().bam.as_deref(), Some(bam.as_path()));
    }

    #[test]
    fn test_mate_encoding_mismatch_submits_nothing() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        let mut req = request(root);
        req.mate1 = vec![fastq(root, "p_1.fq", SANGER_FASTQ)];
        req.mate2 = vec![fastq(root, "p_2.fq", ILLUMINA_FASTQ)];

        let mut engine = engine(root, settings);
        let mut scheduler = DryRunScheduler::new();
        let result = engine.start_alignment(&req, &mut scheduler, &mut CountingRunner::default());

        assert!(matches!(result, Err(PipelineError::Mismatch(_))));
        assert!(scheduler.requests().is_empty());
    }

    #[test]
    fn test_non_fastq_input_fails() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        let mut req = request(root);
        req.single_end = vec![fastq(root, "reads.fa", ">chr1\nACGT\n")];

        let mut engine = engine(root, settings);
        let result = engine.start_alignment(&req, &mut DryRunScheduler::new(), &mut CountingRunner::default());
        assert!(matches!(result, Err(PipelineError::Format { .. })));
    }

    #[test]
    fn test_index_build_failure_is_fatal() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        fs::remove_file(root.join("ref.fa.sa")).unwrap();
        let mut req = request(root);
        req.single_end = vec![fastq(root, "a.fq", SANGER_FASTQ)];

        let mut engine = engine(root, settings);
        let mut runner = CountingRunner::default();
        let result = engine.start_alignment(&req, &mut DryRunScheduler::new(), &mut runner);

        assert!(matches!(result, Err(PipelineError::IndexBuild { .. })));
        assert_eq!(runner.calls.len(), 2);
    }

    #[test]
    fn test_dry_run_leaves_no_trace() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        fs::remove_file(root.join("ref.fa.bwt")).unwrap();
        let mut req = request(root);
        req.single_end = vec![fastq(root, "a.fq", SANGER_FASTQ)];

        let mut engine = engine(root, settings);
        engine.set_dry_run(true);
        let mut scheduler = DryRunScheduler::new();
        let mut runner = CountingRunner::default();
        let outcome = engine.start_alignment(&req, &mut scheduler, &mut runner).unwrap();

        assert!(runner.calls.is_empty());
        assert_eq!(scheduler.requests().len(), 2);
        assert_eq!(outcome.index, IndexStatus::Missing(vec![root.join("ref.fa.bwt")]));
        assert!(!root.join(DEFAULT_LIBFILE).exists());
        assert!(!root.join("alignment").exists());
        assert_eq!(outcome.record.batches[JOB_SAMSE], vec![JobHandle::new("dryrun.2")]);
    }

    #[test]
    fn test_existing_library_file_is_used() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        let reads = fastq(root, "a.fq", SANGER_FASTQ);
        let libfile = root.join("mylibs.txt");
        fs::write(
            &libfile,
            format!("#ID\tData\tLibrary\tSample\tMAPQ\nrun7\t{}\tLIB9\tP1\t25\n", reads.display()),
        )
        .unwrap();

        let mut req = request(root);
        req.single_end = vec![reads];
        req.libfile = Some(libfile.clone());

        let mut engine = engine(root, settings);
        engine.set_dry_run(true);
        let mut scheduler = DryRunScheduler::new();
        let outcome = engine
            .start_alignment(&req, &mut scheduler, &mut CountingRunner::default())
            .unwrap();

        assert_eq!(outcome.libfile, libfile);
        let samse = &scheduler.requests()[1];
        assert!(samse.command.contains("ID:run7\\tSM:P1\\tLB:LIB9"));
    }

    #[test]
    fn test_request_resolved_against_base() {
        let mut req = request(Path::new("/abs"));
        req.reference = PathBuf::from("refs/ref.fa");
        req.single_end = vec![PathBuf::from("reads/a.fq"), PathBuf::from("/data/b.fq")];
        req.libfile = Some(PathBuf::from("libs.txt"));

        let resolved = req.resolved(Path::new("/launch"));
        assert_eq!(resolved.reference, PathBuf::from("/launch/refs/ref.fa"));
        assert_eq!(
            resolved.single_end,
            vec![PathBuf::from("/launch/reads/a.fq"), PathBuf::from("/data/b.fq")]
        );
        assert_eq!(resolved.libfile, Some(PathBuf::from("/launch/libs.txt")));
        assert_eq!(resolved.sample, req.sample);
    }

    #[test]
    fn test_relative_inputs_with_separate_working_dir() {
        let (temp_dir, settings) = fixture();
        let work = temp_dir.path();
        // bwa fails unless every read and reference argument exists where the job runs
        write_stub(
            &work.join("bin"),
            "bwa",
            &format!(
                "for arg in \"$@\"; do case \"$arg\" in *.fq|*.fa) [ -e \"$arg\" ] || exit 1;; esac; done\necho \"bwa $*\" >> {}",
                work.join("calls.log").display()
            ),
        );

        let cwd = env::current_dir().unwrap();
        let inputs_dir = tempfile::Builder::new().prefix("genobox-inputs").tempdir_in(&cwd).unwrap();
        let inputs = inputs_dir.path();
        fs::write(inputs.join("ref.fa"), ">chr1\nACGT\n").unwrap();
        for suffix in INDEX_SUFFIXES {
            fs::write(inputs.join(format!("ref.fa{}", suffix)), "").unwrap();
        }
        fastq(inputs, "a.fq", SANGER_FASTQ);
        let relative = inputs.strip_prefix(&cwd).unwrap();

        let mut req = request(work);
        req.reference = relative.join("ref.fa");
        req.single_end = vec![relative.join("a.fq")];

        let mut engine = engine(work, settings);
        let mut scheduler = LocalScheduler::new(work);
        let outcome = engine
            .start_alignment(&req, &mut scheduler, &mut CountingRunner::default())
            .unwrap();

        let reads = inputs.join("a.fq");
        let bam = work.join("alignment/a.fq.bam");
        assert_eq!(outcome.artifacts[&reads], bam);
        assert!(bam.exists());
        for handle in &outcome.record.batches[JOB_ALIGN] {
            assert_eq!(scheduler.state(handle), Some(JobState::Succeeded));
        }

        let calls = fs::read_to_string(work.join("calls.log")).unwrap();
        assert!(calls.contains(&reads.display().to_string()));
        let library = LibraryFile::load(work.join(DEFAULT_LIBFILE)).unwrap();
        assert_eq!(library.entry(&reads).unwrap().bam.as_deref(), Some(bam.as_path()));
    }

    #[test]
    fn test_failed_alignment_is_reported() {
        let (temp_dir, settings) = fixture();
        let root = temp_dir.path();
        write_stub(&root.join("bin"), "bwa", "exit 1");
        let mut req = request(root);
        req.single_end = vec![fastq(root, "a.fq", SANGER_FASTQ)];

        let mut engine = engine(root, settings);
        let mut scheduler = LocalScheduler::new(root);
        let result = engine.start_alignment(&req, &mut scheduler, &mut CountingRunner::default());

        match result {
            Err(PipelineError::MissingArtifacts { missing, .. }) => {
                assert_eq!(missing, vec![root.join("alignment/a.fq.bam")])
            }
            other => panic!("Expected missing artifacts, got {:?}", other),
        }
        assert!(!root.join(DEFAULT_LIBFILE).exists());
        assert!(RunRecord::record_path(root, ALIGNMENT_LABEL).exists());
    }
}
