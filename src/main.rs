use std::error::Error;

use clap::Parser;

use agentpack::{
    cli::args::{CliArgs, Command},
    config::AgentpackConfig,
    Agentpack, CompileOptions, LockMode,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli_args = CliArgs::parse();
    let config = AgentpackConfig::load()?;

    let mut builder = Agentpack::builder();

    if let Some(root) = &cli_args.root {
        builder = builder.root(root);
    }
    if let Command::Init { directory, .. } = &cli_args.cmd {
        builder = builder.root(directory);
    }
    if let Some(manifest_location) = &cli_args.manifest_location {
        builder = builder.manifest_file_name(manifest_location);
    }
    if let Some(lockfile_location) = &cli_args.lockfile_location {
        builder = builder.lock_file_name(lockfile_location);
    }
    if let Some(registry_directory) = cli_args.registry_directory.or(config.registry_dir) {
        builder = builder.registry_directory(registry_directory);
    }

    match cli_args.cmd {
        Command::Compile {
            locked,
            force_lock,
            dry_run,
            clean_orphaned,
            tolerance,
            lambda,
        } => {
            if let Some(tolerance) = tolerance.or(config.tolerance) {
                builder = builder.tolerance(tolerance);
            }
            if let Some(lambda) = lambda.or(config.lambda) {
                builder = builder.lambda(lambda);
            }
            let agentpack = builder.try_build()?;
            agentpack.compile(CompileOptions {
                lock_mode: lock_mode(locked, force_lock),
                dry_run,
                clean_orphaned,
            })
        }
        Command::Lock { locked, force } => {
            let agentpack = builder.try_build()?;
            agentpack.lock(lock_mode(locked, force))
        }
        Command::Init { name, .. } => {
            let agentpack = builder.try_build()?;
            agentpack.init(name)
        }
        Command::Clean => {
            let agentpack = builder.try_build()?;
            agentpack.clean()
        }
    }
}

fn lock_mode(locked: bool, recreate: bool) -> LockMode {
    match (locked, recreate) {
        // clap rejects the combination before we get here
        (true, _) => LockMode::Locked,
        (false, true) => LockMode::Recreate,
        (false, false) => LockMode::Update,
    }
}
