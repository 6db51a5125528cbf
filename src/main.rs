//! ferry - background file operations from the terminal.
//!
//! Usage:
//!   ferry copy SOURCE... DEST       Copy into a directory
//!   ferry move SOURCE... DEST       Move into a directory
//!   ferry delete PATH...            Delete files and trees
//!   ferry link SOURCE... DEST       Place symlinks in a directory
//!   ferry chmod MODE PATH...        Change permissions and ownership
//!   ferry run JOB.json              Run a job described in JSON

mod controller;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tracing_subscriber::EnvFilter;

use ferry_core::{EngineConfig, JobDescriptor, JobOutcome, Operation, PermissionEdits};
use ferry_ops::start_job;

use controller::{ConflictPolicy, TerminalController};

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Copy, move, delete, link and chmod with progress and conflict prompts"
)]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalOptions {
    /// Never prompt; conflicts are skipped unless --overwrite is given
    #[arg(short, long, global = true)]
    yes: bool,

    /// Overwrite every existing destination
    #[arg(long, global = true, conflicts_with = "skip_existing")]
    overwrite: bool,

    /// Leave every existing destination alone
    #[arg(long, global = true)]
    skip_existing: bool,

    /// Do not show progress
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Copy buffer size in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    chunk_size: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Copy files and directory trees into a directory
    Copy {
        /// Entries to copy
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination directory (created if missing)
        dest: PathBuf,
    },

    /// Move files and directory trees into a directory
    Move {
        /// Entries to move
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination directory (created if missing)
        dest: PathBuf,
    },

    /// Delete files and directory trees
    Delete {
        /// Entries to delete
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Create symlinks to the sources inside a directory
    Link {
        /// Link targets
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Directory receiving the links
        dest: PathBuf,
    },

    /// Change permission bits and ownership
    Chmod {
        /// Octal mode (e.g. "644") or symbolic edits (e.g. "u+rw,g-w,o=r").
        /// Use "-" to change ownership only.
        mode: String,

        /// Entries to change
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Also change everything below directories
        #[arg(short = 'R', long)]
        recursive: bool,

        /// New owner uid
        #[arg(long)]
        uid: Option<u32>,

        /// New group gid
        #[arg(long)]
        gid: Option<u32>,
    },

    /// Run a job described in a JSON file
    Run {
        /// Job description
        job: PathBuf,

        /// Engine settings in JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (descriptor, mut config) = build_job(cli.command)?;
    if let Some(chunk_size) = cli.options.chunk_size {
        config.chunk_size = chunk_size;
        config.validate().context("Invalid --chunk-size")?;
    }

    run_job(descriptor, config, &cli.options)
}

/// Turn a subcommand into a job and the engine settings to run it with.
fn build_job(command: Command) -> Result<(JobDescriptor, EngineConfig)> {
    let descriptor = match command {
        Command::Copy { sources, dest } => {
            JobDescriptor::copy(absolute_all(sources)?, absolute(&dest)?)?
        }
        Command::Move { sources, dest } => {
            JobDescriptor::move_to(absolute_all(sources)?, absolute(&dest)?)?
        }
        Command::Delete { paths } => JobDescriptor::delete(absolute_all(paths)?)?,
        Command::Link { sources, dest } => {
            JobDescriptor::link(absolute_all(sources)?, absolute(&dest)?)?
        }
        Command::Chmod {
            mode,
            paths,
            recursive,
            uid,
            gid,
        } => {
            let edits = if mode == "-" {
                PermissionEdits::new()
            } else {
                PermissionEdits::parse(&mode)?
            };
            let mut builder = JobDescriptor::builder();
            builder
                .operation(Operation::ChmodChown)
                .sources(absolute_all(paths)?)
                .permission_edits(edits)
                .recursive(recursive);
            if let Some(uid) = uid {
                builder.owner_uid(uid);
            }
            if let Some(gid) = gid {
                builder.group_gid(gid);
            }
            builder.build()?
        }
        Command::Run { job, config } => {
            let text = std::fs::read_to_string(&job)
                .with_context(|| format!("Failed to read {}", job.display()))?;
            let descriptor: JobDescriptor = serde_json::from_str(&text)
                .with_context(|| format!("Invalid job file {}", job.display()))?;
            descriptor.validate()?;

            let config = match config {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let config: EngineConfig = serde_json::from_str(&text)
                        .with_context(|| format!("Invalid config file {}", path.display()))?;
                    config
                        .validate()
                        .with_context(|| format!("Invalid config file {}", path.display()))?;
                    config
                }
                None => EngineConfig::default(),
            };
            return Ok((descriptor, config));
        }
    };

    Ok((descriptor, EngineConfig::default()))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}

fn absolute_all(paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    paths.iter().map(|p| absolute(p)).collect()
}

fn run_job(descriptor: JobDescriptor, config: EngineConfig, options: &GlobalOptions) -> Result<()> {
    let policy = if options.overwrite {
        ConflictPolicy::Overwrite
    } else if options.skip_existing {
        ConflictPolicy::Skip
    } else {
        ConflictPolicy::Ask
    };
    let interactive = !options.yes && std::io::stdin().is_terminal();
    let operation = descriptor.operation;

    let started = Instant::now();
    let controller = TerminalController::new(policy, interactive, options.quiet);
    let mut handle = start_job(descriptor, config, controller)?;
    let outcome = handle.run()?;

    let state = handle.state();
    let elapsed = started.elapsed();
    let controller = handle.controller();

    match outcome {
        JobOutcome::Succeeded => {
            if !options.quiet {
                eprintln!(
                    "{operation}: {} ({}) in {:.1}s",
                    state.summary(),
                    humansize::format_size(state.total_bytes, humansize::BINARY),
                    elapsed.as_secs_f64()
                );
            }
            Ok(())
        }
        JobOutcome::Cancelled => {
            bail!(
                "{operation} cancelled after {} of {}",
                humansize::format_size(state.processed_bytes, humansize::BINARY),
                humansize::format_size(state.total_bytes, humansize::BINARY)
            )
        }
        JobOutcome::Failed => Err(eyre!(
            "{operation} failed: {}",
            controller
                .failure
                .as_deref()
                .unwrap_or("worker stopped unexpectedly")
        )),
    }
}
