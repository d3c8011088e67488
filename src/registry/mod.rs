mod cache;
mod directory;
mod lock;

use std::sync::Arc;

pub use cache::CachedRegistry;
pub use directory::DirectoryRegistry;
pub use lock::LockingRegistry;

use crate::model::{
    package::{PackageDescriptor, PackageName},
    version::SemanticVersion,
};

/// The package-fetch collaborator. Implementations must be pure for a given
/// registry snapshot: the same inputs always yield the same answers, which is
/// what makes compiled artifacts reproducible.
pub trait PackageRegistry {
    /// Published versions of a package, in order of preference (best first).
    /// A plain registry lists versions descending; wrappers may reorder to
    /// prefer pinned versions.
    fn candidates(&self, name: &PackageName) -> anyhow::Result<Vec<SemanticVersion>>;

    /// The descriptor of one concrete published version.
    fn descriptor(
        &self,
        name: &PackageName,
        version: &SemanticVersion,
    ) -> anyhow::Result<Arc<PackageDescriptor>>;
}

impl<R: PackageRegistry + ?Sized> PackageRegistry for &R {
    fn candidates(&self, name: &PackageName) -> anyhow::Result<Vec<SemanticVersion>> {
        (**self).candidates(name)
    }

    fn descriptor(
        &self,
        name: &PackageName,
        version: &SemanticVersion,
    ) -> anyhow::Result<Arc<PackageDescriptor>> {
        (**self).descriptor(name, version)
    }
}
