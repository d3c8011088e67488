use std::path::PathBuf;

use clap::Parser;

/// Compiler for versioned agent-instruction packages.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Project root directory
    #[clap(short, long)]
    pub root: Option<PathBuf>,
    /// Name of the manifest toml file
    #[clap(short, long)]
    pub manifest_location: Option<PathBuf>,
    /// Name of the lock file
    #[clap(short, long)]
    pub lockfile_location: Option<PathBuf>,
    /// Location of the package registry directory
    #[clap(long)]
    pub registry_directory: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Compiles AGENTS.md artifacts from the packages declared in the
    /// manifest
    Compile {
        /// Forbid updating the lock file, fail if resolution drifts from it
        #[clap(short, long)]
        locked: bool,
        /// Recreate the lock file from scratch before compiling
        #[clap(short, long, conflicts_with = "locked")]
        force_lock: bool,
        /// Render everything but write nothing
        #[clap(short, long)]
        dry_run: bool,
        /// Remove artifacts from a previous run at directories this run no
        /// longer targets
        #[clap(short, long)]
        clean_orphaned: bool,
        /// Pollution fraction a directory subtree may carry and still be
        /// folded into one placement
        #[clap(long)]
        tolerance: Option<f64>,
        /// Pollution weight; switches placement to exact cost minimization
        #[clap(long)]
        lambda: Option<f64>,
    },
    /// Creates a lock file based on the manifest
    Lock {
        /// Verify that the lock file is up to date instead of writing it
        #[clap(short, long)]
        locked: bool,
        /// Recreate the lock file from scratch
        #[clap(short, long, conflicts_with = "locked")]
        force: bool,
    },
    /// Creates an initial agentpack setup in the provided directory
    Init {
        #[clap(default_value = ".")]
        directory: PathBuf,
        #[clap(short, long)]
        name: Option<String>,
    },
    /// Removes emitted artifacts and the lock file
    Clean,
}
