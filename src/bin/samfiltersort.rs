//! genobox-samfiltersort CLI Entry Point
//!
//! Filters a BAM file on mapping quality and sorts it.
//!
//! ```bash
//! genobox-samfiltersort --i sample.bam --q 20 --o sample.sorted
//! ```
//!
//! The command line run is logged to `genobox.log` in the current
//! directory.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use genobox::environment::Settings;
use genobox::error::{PipelineError, Result};
use genobox::execution::filter::{DEFAULT_MIN_MAPQ, DEFAULT_SORT_MEMORY};
use genobox::execution::{FilterSortJob, ShellRunner};

const LOG_FILE: &str = "genobox.log";

/// Filter a BAM file on MAPQ and sort it with samtools
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Input BAM
    #[arg(long = "i", value_name = "FILE")]
    input: PathBuf,

    /// Quality cutoff
    #[arg(long = "q", default_value_t = DEFAULT_MIN_MAPQ)]
    min_mapq: u32,

    /// Memory for sort, in bytes
    #[arg(long = "m", default_value_t = DEFAULT_SORT_MEMORY)]
    memory: u64,

    /// Prefix of the output BAM
    #[arg(long = "o", value_name = "PREFIX")]
    output: PathBuf,

    /// Log level
    #[arg(long = "log", default_value = "info")]
    log_level: String,

    /// Settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn job(&self) -> FilterSortJob {
        FilterSortJob {
            input: self.input.clone(),
            min_mapq: self.min_mapq,
            sort_memory: self.memory,
            output_prefix: self.output.clone(),
        }
    }
}

/// Appends `<timestamp> <LEVEL> <message>` lines to `log_file`.
fn setup_logging(level: &str, log_file: &Path) -> Result<()> {
    let level: LevelFilter = level
        .parse()
        .map_err(|_| PipelineError::Config(format!("invalid log level '{}'", level)))?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args()
            )
        })
        .init();
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    setup_logging(&cli.log_level, Path::new(LOG_FILE))?;

    let settings = Settings::resolve(cli.config.as_deref())?;
    cli.job().run(&settings.tools, &mut ShellRunner::new())?;
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
