use std::{env, error::Error, path::PathBuf};

use home::home_dir;

use crate::{
    cli::command_handlers::PlacementSettingsOverrides,
    registry::{CachedRegistry, DirectoryRegistry},
    Agentpack,
};

#[derive(Default)]
pub struct AgentpackBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    manifest_file_name: Option<PathBuf>,
    lock_file_name: Option<PathBuf>,
    registry_directory_path: Option<PathBuf>,
    tolerance: Option<f64>,
    lambda: Option<f64>,
}

impl AgentpackBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the agentpack manifest toml file.
    ///
    /// Defaults to `agentpack.toml`.
    pub fn manifest_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_file_name = Some(path.into());
        self
    }

    /// Name of the agentpack lock file.
    ///
    /// Defaults to `agentpack.lock`.
    pub fn lock_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file_name = Some(path.into());
        self
    }

    /// Location of the package registry directory.
    ///
    /// Defaults to `$HOME/.agentpack/registry`.
    pub fn registry_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_directory_path = Some(path.into());
        self
    }

    /// Pollution tolerance for placement. Overrides the manifest's
    /// `[placement]` table.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Pollution weight for cost-driven placement. Overrides the manifest's
    /// `[placement]` table.
    pub fn lambda(mut self, lambda: f64) -> Self {
        self.lambda = Some(lambda);
        self
    }

    pub fn try_build(self) -> Result<Agentpack, Box<dyn Error>> {
        let Self {
            root,
            manifest_file_name,
            lock_file_name,
            registry_directory_path,
            tolerance,
            lambda,
        } = self;

        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let manifest_file_name =
            manifest_file_name.unwrap_or_else(|| PathBuf::from("agentpack.toml"));

        let lock_file_name = lock_file_name.unwrap_or_else(|| PathBuf::from("agentpack.lock"));

        let registry_directory = match registry_directory_path {
            Some(path) => path,
            None => default_registry_directory()?,
        };

        let registry = CachedRegistry::new(DirectoryRegistry::new(registry_directory));

        Ok(Agentpack {
            registry,
            root,
            manifest_file_name,
            lock_file_name,
            placement_overrides: PlacementSettingsOverrides { tolerance, lambda },
        })
    }
}

fn default_registry_directory() -> Result<PathBuf, Box<dyn Error>> {
    let mut registry_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    registry_directory.push(".agentpack/registry");
    Ok(registry_directory)
}
