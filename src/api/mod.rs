use std::{error::Error, path::PathBuf};

use crate::{
    cli::command_handlers::{do_clean, do_compile, do_init, do_lock, PlacementSettingsOverrides},
    registry::{CachedRegistry, DirectoryRegistry},
};

mod builder;

pub use builder::AgentpackBuilder;

/// Library entry point: a configured project plus its package registry.
pub struct Agentpack {
    registry: CachedRegistry<DirectoryRegistry>,
    root: PathBuf,
    manifest_file_name: PathBuf,
    lock_file_name: PathBuf,
    placement_overrides: PlacementSettingsOverrides,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockMode {
    /// Verify that the lock file is up to date. This mode should be normally used on CI.
    Locked,
    /// Update the lock file if necessary.
    Update,
    /// Recreate the lock file from scratch.
    Recreate,
}

#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub lock_mode: LockMode,
    /// Render everything, write nothing.
    pub dry_run: bool,
    /// Remove artifacts from a previous run that this run no longer emits.
    pub clean_orphaned: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            lock_mode: LockMode::Update,
            dry_run: false,
            clean_orphaned: false,
        }
    }
}

impl Agentpack {
    pub fn builder() -> AgentpackBuilder {
        AgentpackBuilder::default()
    }

    /// Creates an initial agentpack setup
    pub fn init(&self, name: Option<String>) -> Result<(), Box<dyn Error>> {
        do_init(&self.root, name, &self.manifest_file_name)
    }

    /// Compiles AGENTS.md artifacts from the packages declared in the manifest
    pub fn compile(&self, options: CompileOptions) -> Result<(), Box<dyn Error>> {
        do_compile(
            &options,
            &self.registry,
            &self.root,
            &self.manifest_file_name,
            &self.lock_file_name,
            &self.placement_overrides,
        )
    }

    /// Creates, updates or verifies a lock file based on the manifest
    pub fn lock(&self, lock_mode: LockMode) -> Result<(), Box<dyn Error>> {
        do_lock(
            lock_mode,
            &self.registry,
            &self.root,
            &self.manifest_file_name,
            &self.lock_file_name,
        )?;
        Ok(())
    }

    /// Delete emitted artifacts and the lock file
    pub fn clean(&self) -> Result<(), Box<dyn Error>> {
        do_clean(&self.root, &self.lock_file_name)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use pretty_assertions::assert_eq;

    fn publish(registry: &Path, name: &str, version: &str, body: &str) {
        let dir = registry.join(name).join(version);
        std::fs::create_dir_all(&dir).unwrap();
        let content = format!("name = \"{name}\"\nversion = \"{version}\"\n{body}");
        std::fs::write(dir.join("package.toml"), content).unwrap();
    }

    fn project(registry: &Path, root: &Path) -> Agentpack {
        publish(
            registry,
            "style",
            "1.0.0",
            r#"
            [[instructions]]
            id = "rust"
            scope = "src/**/*.rs"
            text = "Prefer explicit error types."
            "#,
        );
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(root.join("docs/guide.md"), "guide").unwrap();
        std::fs::write(
            root.join("agentpack.toml"),
            "name = \"demo\"\n\n[dependencies]\nstyle = \"^1.0.0\"\n",
        )
        .unwrap();

        Agentpack::builder()
            .root(root)
            .registry_directory(registry)
            .try_build()
            .unwrap()
    }

    #[test]
    fn compile_end_to_end_is_reproducible() {
        let registry = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let agentpack = project(registry.path(), dir.path());

        agentpack.compile(CompileOptions::default()).unwrap();

        let artifact = dir.path().join("src/AGENTS.md");
        let first = std::fs::read_to_string(&artifact).unwrap();
        assert!(first.contains("style:rust"));
        assert!(first.contains("Prefer explicit error types."));
        assert!(dir.path().join("agentpack.lock").exists());
        // `docs` holds no rust files, so it must not inherit the instruction.
        assert!(!dir.path().join("docs/AGENTS.md").exists());
        assert!(!dir.path().join("AGENTS.md").exists());

        agentpack.compile(CompileOptions::default()).unwrap();
        let second = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn locked_mode_requires_a_lock_file() {
        let registry = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let agentpack = project(registry.path(), dir.path());

        let result = agentpack.compile(CompileOptions {
            lock_mode: LockMode::Locked,
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let registry = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let agentpack = project(registry.path(), dir.path());

        agentpack
            .compile(CompileOptions {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();
        assert!(!dir.path().join("src/AGENTS.md").exists());
        assert!(!dir.path().join("agentpack.lock").exists());
    }

    #[test]
    fn clean_orphaned_removes_stale_artifacts() {
        let registry = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let agentpack = project(registry.path(), dir.path());
        std::fs::write(dir.path().join("docs/AGENTS.md"), "stale").unwrap();

        agentpack
            .compile(CompileOptions {
                clean_orphaned: true,
                ..Default::default()
            })
            .unwrap();
        assert!(dir.path().join("src/AGENTS.md").exists());
        assert!(!dir.path().join("docs/AGENTS.md").exists());
    }

    #[test]
    fn clean_removes_artifacts_and_lock() {
        let registry = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let agentpack = project(registry.path(), dir.path());

        agentpack.compile(CompileOptions::default()).unwrap();
        agentpack.clean().unwrap();
        assert!(!dir.path().join("src/AGENTS.md").exists());
        assert!(!dir.path().join("agentpack.lock").exists());
    }

    #[test]
    fn init_writes_a_manifest_once() {
        let registry = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let agentpack = Agentpack::builder()
            .root(dir.path())
            .registry_directory(registry.path())
            .try_build()
            .unwrap();

        agentpack.init(Some("fresh".to_string())).unwrap();
        let manifest = std::fs::read_to_string(dir.path().join("agentpack.toml")).unwrap();
        assert!(manifest.contains("name = \"fresh\""));
        assert!(agentpack.init(Some("fresh".to_string())).is_err());
    }
}
