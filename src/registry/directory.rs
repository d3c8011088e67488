use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context};
use log::{debug, trace};

use crate::model::{
    package::{PackageDescriptor, PackageName},
    version::SemanticVersion,
};

use super::PackageRegistry;

pub const DESCRIPTOR_FILE_NAME: &str = "package.toml";

/// A registry backed by a plain directory tree:
/// `<root>/<package>/<version>/package.toml`. This is the local analogue of a
/// remote registry; publishing is a matter of dropping a descriptor in place.
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> DirectoryRegistry {
        DirectoryRegistry { root: root.into() }
    }
}

impl PackageRegistry for DirectoryRegistry {
    fn candidates(&self, name: &PackageName) -> anyhow::Result<Vec<SemanticVersion>> {
        let package_dir = self.root.join(name.as_str());
        if !package_dir.is_dir() {
            bail!(
                "package `{}` not found in registry {}",
                name,
                self.root.display()
            );
        }

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&package_dir)
            .with_context(|| format!("listing versions of `{name}`"))?
        {
            let entry = entry?;
            let file_name = entry.file_name();
            let raw = file_name.to_string_lossy();
            match raw.parse::<SemanticVersion>() {
                Ok(version) => versions.push(version),
                Err(_) => trace!("Skipping non-version entry {raw} under {name}"),
            }
        }
        // Highest first: the resolver takes the first candidate that
        // satisfies the combined range.
        versions.sort();
        versions.reverse();
        debug!("Found {} published versions of {}", versions.len(), name);
        Ok(versions)
    }

    fn descriptor(
        &self,
        name: &PackageName,
        version: &SemanticVersion,
    ) -> anyhow::Result<Arc<PackageDescriptor>> {
        let path = self
            .root
            .join(name.as_str())
            .join(version.to_string())
            .join(DESCRIPTOR_FILE_NAME);
        trace!("Reading descriptor from {}", path.display());

        let descriptor = PackageDescriptor::from_file(&path)
            .with_context(|| format!("reading descriptor of {name} {version}"))?;
        if &descriptor.name != name || &descriptor.version != version {
            bail!(
                "descriptor at {} declares {} {}, expected {} {}",
                path.display(),
                descriptor.name,
                descriptor.version,
                name,
                version
            );
        }
        Ok(Arc::new(descriptor))
    }
}
