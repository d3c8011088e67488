use std::sync::Arc;

use anyhow::bail;
use log::debug;

use crate::model::{
    lock::LockFile,
    package::{PackageDescriptor, PackageName},
    version::SemanticVersion,
};

use super::PackageRegistry;

/// A registry view constrained by an existing lock file. A pinned package
/// offers only its pinned version, so resolution either reproduces the lock
/// or fails with a range conflict instead of silently drifting. In `locked`
/// mode (CI verification) packages absent from the lock file are an error.
pub struct LockingRegistry<'a, R> {
    inner: R,
    lock_file: &'a LockFile,
    locked: bool,
}

impl<'a, R> LockingRegistry<'a, R> {
    pub fn new(inner: R, lock_file: &'a LockFile, locked: bool) -> Self {
        Self {
            inner,
            lock_file,
            locked,
        }
    }
}

impl<R> PackageRegistry for LockingRegistry<'_, R>
where
    R: PackageRegistry,
{
    fn candidates(&self, name: &PackageName) -> anyhow::Result<Vec<SemanticVersion>> {
        match self.lock_file.get(name) {
            Some(locked) => {
                debug!(
                    "Package {} found in the lock file at version {}",
                    name, locked.version
                );
                Ok(vec![locked.version])
            }
            None if self.locked => {
                bail!("no entry for package `{}` in the lock file", name);
            }
            None => {
                debug!("Package {} not found in the lock file", name);
                self.inner.candidates(name)
            }
        }
    }

    fn descriptor(
        &self,
        name: &PackageName,
        version: &SemanticVersion,
    ) -> anyhow::Result<Arc<PackageDescriptor>> {
        if let Some(locked) = self.lock_file.get(name) {
            if &locked.version != version {
                bail!(
                    "version of `{}` changed: the lock file specifies {}, but resolution selected {}",
                    name,
                    locked.version,
                    version
                );
            }
        }
        self.inner.descriptor(name, version)
    }
}
