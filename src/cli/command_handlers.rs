use log::{debug, info};

use crate::{
    api::{CompileOptions, LockMode},
    collector,
    conflict,
    emitter::{self, FsWriter},
    model::{lock::LockFile, manifest::Manifest, package::PackageName},
    placement::{self, PlacementSettings},
    registry::{LockingRegistry, PackageRegistry},
    resolver::{self, DependencyGraph},
    tree::DirectoryTree,
};
use std::{
    error::Error,
    path::{Path, PathBuf},
};

/// Handler to compile command
pub fn do_compile<R: PackageRegistry>(
    options: &CompileOptions,
    registry: &R,
    root: &Path,
    manifest_file_name: &Path,
    lock_file_name: &Path,
    overrides: &PlacementSettingsOverrides,
) -> Result<(), Box<dyn Error>> {
    let manifest = load_manifest(root, manifest_file_name)?;

    let graph = if options.dry_run {
        // A dry run must leave the lock file untouched.
        resolve_graph(options.lock_mode, registry, &manifest, &root.join(lock_file_name))?
    } else {
        do_lock(options.lock_mode, registry, root, manifest_file_name, lock_file_name)?
    };

    let tree = DirectoryTree::from_filesystem(root)?;
    let settings = PlacementSettings {
        tolerance: overrides
            .tolerance
            .or(manifest.placement.tolerance)
            .unwrap_or(0.0),
        lambda: overrides.lambda.or(manifest.placement.lambda),
    };

    let collected = collector::collect(&graph);
    let effective = conflict::resolve_conflicts(collected, &tree)?;
    let placement = placement::place(&effective, &tree, &settings)?;
    let artifacts = emitter::render(&placement, &effective, &tree);

    if options.dry_run {
        info!("Dry run; would write {} artifacts:", artifacts.len());
        for (path, count) in emitter::placement_summary(&placement, &tree) {
            info!("  {} ({} instructions)", path.display(), count);
        }
        return Ok(());
    }

    let writer = FsWriter::new(root);
    emitter::emit(&artifacts, &writer)?;
    if options.clean_orphaned {
        emitter::sweep_orphans(root, &artifacts, &writer)?;
    }

    Ok(())
}

/// Handler to lock command
/// Resolves the manifest against the registry and writes the pinned result,
/// honoring the lock mode
pub fn do_lock<R: PackageRegistry>(
    lock_mode: LockMode,
    registry: &R,
    root: &Path,
    manifest_file_name: &Path,
    lock_file_name: &Path,
) -> Result<DependencyGraph, Box<dyn Error>> {
    let manifest = load_manifest(root, manifest_file_name)?;

    let lock_file_path = root.join(lock_file_name);
    let old_lock = match lock_file_path.exists() {
        true => Some(LockFile::from_file(&lock_file_path)?),
        false => None,
    };

    let graph = resolve_graph(lock_mode, registry, &manifest, &lock_file_path)?;
    let lock_file = graph.to_lock_file();

    debug!("Generated lock file: {lock_file:?}");

    if old_lock.is_some_and(|old_lock| old_lock == lock_file) {
        debug!("Lock file is up to date");
    } else {
        std::fs::write(&lock_file_path, lock_file.to_string()?)?;
        info!("Wrote lock file to {}", lock_file_path.display());
    }

    Ok(graph)
}

fn resolve_graph<R: PackageRegistry>(
    lock_mode: LockMode,
    registry: &R,
    manifest: &Manifest,
    lock_file_path: &Path,
) -> Result<DependencyGraph, Box<dyn Error>> {
    let graph = match (lock_mode, lock_file_path.exists()) {
        (LockMode::Locked, false) => return Err("Lock file does not exist".into()),

        (LockMode::Locked, true) => {
            let old_lock = LockFile::from_file(lock_file_path)?;
            let locking = LockingRegistry::new(registry, &old_lock, true);
            debug!("Verifying lock file...");
            resolver::resolve(manifest, &locking)?
        }

        (LockMode::Update, false) => {
            debug!("Generating lock file...");
            resolver::resolve(manifest, registry)?
        }

        (LockMode::Update, true) => {
            let old_lock = LockFile::from_file(lock_file_path)?;
            let locking = LockingRegistry::new(registry, &old_lock, false);
            debug!("Updating lock file...");
            resolver::resolve(manifest, &locking)?
        }

        (LockMode::Recreate, _) => {
            debug!("Generating lock file...");
            resolver::resolve(manifest, registry)?
        }
    };

    Ok(graph)
}

/// Handler to init command
pub fn do_init(
    root: &Path,
    name: Option<String>,
    manifest_file_name: &Path,
) -> Result<(), Box<dyn Error>> {
    let name = build_project_name(name, root)?;
    let manifest = Manifest::new(PackageName::new(name));
    let manifest_file_path = root.join(manifest_file_name);
    create_manifest_file(manifest, &manifest_file_path)
}

/// Handler to clean command
/// Removes every emitted artifact under the project root and the lock file
pub fn do_clean(root: &Path, lock_file_name: &Path) -> Result<(), Box<dyn Error>> {
    let writer = FsWriter::new(root);
    let removed = emitter::sweep_orphans(root, &[], &writer)?;
    info!("Removed {removed} artifacts under {}", root.display());

    let lock_file_path = root.join(lock_file_name);
    match std::fs::remove_file(&lock_file_path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("{} is already removed, nothing to do", lock_file_path.display());
            Ok(())
        }
        otherwise => otherwise,
    }?;

    Ok(())
}

/// Placement tuning from the environment and CLI flags; filled gaps fall
/// back to the manifest's `[placement]` table, then to the defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementSettingsOverrides {
    pub tolerance: Option<f64>,
    pub lambda: Option<f64>,
}

fn load_manifest(root: &Path, manifest_file_name: &Path) -> Result<Manifest, Box<dyn Error>> {
    let manifest = Manifest::from_file(&root.join(manifest_file_name))?;
    Ok(manifest)
}

/// Name if present otherwise attempt to extract from directory
fn build_project_name(name: Option<String>, path: &Path) -> Result<String, Box<dyn Error>> {
    match name {
        Some(name) => Ok(name),
        None => match path.canonicalize()?.file_name() {
            Some(dir) => Ok(dir.to_string_lossy().to_string()),
            None => Err(
                "Project name not given and could not convert location to directory name".into(),
            ),
        },
    }
}

fn create_manifest_file(
    manifest: Manifest,
    manifest_file_path: &PathBuf,
) -> Result<(), Box<dyn Error>> {
    if !manifest_file_path.exists() {
        std::fs::write(
            manifest_file_path,
            toml::to_string_pretty(&manifest.into_toml())?,
        )?;
        Ok(())
    } else {
        Err(format!("File already exists: {}", manifest_file_path.display()).into())
    }
}
