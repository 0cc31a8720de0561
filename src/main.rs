//! genobox-align CLI Entry Point
//!
//! Aligns single-end and/or paired-end FASTQ files against a reference
//! with bwa, one cluster job per file.
//!
//! # Usage
//!
//! ```bash
//! # Single end
//! genobox-align --se a.fq b.fq --fa /ref/hg19.fa --sample P1
//!
//! # Paired end, existing library file
//! genobox-align --pe1 x_1.fq --pe2 x_2.fq --fa /ref/hg19.fa --libfile libs.txt
//!
//! # Preview the jobs without submitting
//! genobox-align --se a.fq --fa /ref/hg19.fa --dry-run
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::info;

use genobox::environment::{Backend, Settings};
use genobox::error::{PipelineError, Result};
use genobox::execution::{AlignmentRequest, Engine};
use genobox::{APP_NAME, VERSION};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchedulerArg {
    Moab,
    Local,
}

impl From<SchedulerArg> for Backend {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::Moab => Backend::Moab,
            SchedulerArg::Local => Backend::Local,
        }
    }
}

/// Align reads with bwa on a Moab cluster
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[clap(rename_all = "kebab_case")]
struct Cli {
    /// Single end read files
    #[arg(long, value_name = "FILE", num_args = 1..)]
    se: Vec<PathBuf>,

    /// First mates of paired end read files
    #[arg(long, value_name = "FILE", num_args = 1..)]
    pe1: Vec<PathBuf>,

    /// Second mates, in the same order as --pe1
    #[arg(long, value_name = "FILE", num_args = 1..)]
    pe2: Vec<PathBuf>,

    /// Reference FASTA
    #[arg(long, value_name = "FILE")]
    fa: PathBuf,

    /// Quality threshold for read trimming
    #[arg(long, default_value_t = 20)]
    qtrim: u32,

    /// Maximum insert size for paired end reads
    #[arg(short = 'a', default_value_t = 500)]
    max_insert: u32,

    /// Library file (synthesized from the inputs when omitted)
    #[arg(long, value_name = "FILE")]
    libfile: Option<PathBuf>,

    /// Sample name for synthesized library files
    #[arg(long, default_value = "sample")]
    sample: String,

    /// MAPQ cutoffs: one for all inputs or one per input
    #[arg(long, num_args = 1..)]
    mapq: Vec<u32>,

    /// Library names: one for all inputs or one per input
    #[arg(long, num_args = 1..)]
    libs: Vec<String>,

    /// Threads per align job
    #[arg(short = 'n', long, default_value_t = 1)]
    threads: u32,

    /// Scheduler queue (overrides the settings file)
    #[arg(long)]
    queue: Option<String>,

    /// Scheduler backend (overrides the settings file)
    #[arg(long, value_enum)]
    scheduler: Option<SchedulerArg>,

    /// Settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the jobs instead of submitting them
    #[arg(long)]
    dry_run: bool,

    /// Directory jobs run in and alignments are written to
    #[arg(long, value_name = "DIR")]
    working_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!();
}

/// Checks that an explicit working directory exists.
fn check_working_directory(dir: &Option<PathBuf>) -> Result<()> {
    let Some(dir) = dir else {
        return Ok(());
    };

    if !dir.is_dir() {
        return Err(PipelineError::Config(format!(
            "working directory does not exist or is not a directory: {}",
            dir.display()
        )));
    }
    info!("Working directory: {}", dir.display());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::resolve(cli.config.as_deref())?;
    if let Some(queue) = cli.queue {
        settings.scheduler.queue = queue;
    }
    if let Some(backend) = cli.scheduler {
        settings.scheduler.backend = backend.into();
    }

    check_working_directory(&cli.working_dir)?;

    if cli.dry_run {
        info!("Mode: DRY RUN (jobs will not be submitted)");
        println!();
    }

    let request = AlignmentRequest {
        single_end: cli.se,
        mate1: cli.pe1,
        mate2: cli.pe2,
        reference: cli.fa,
        qtrim: cli.qtrim,
        max_insert: cli.max_insert,
        threads: cli.threads,
        libfile: cli.libfile,
        sample: cli.sample,
        mapq: cli.mapq,
        libs: cli.libs,
    };

    let mut engine = Engine::new(settings);
    engine.set_dry_run(cli.dry_run);
    if let Some(dir) = cli.working_dir {
        engine.set_working_dir(dir);
    }

    let outcome = engine.run(&request)?;
    info!(
        "{} alignments, library file: {}",
        outcome.artifacts.len(),
        outcome.libfile.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    print_banner();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
