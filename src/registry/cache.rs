use std::sync::Arc;

use dashmap::DashMap;
use log::trace;

use crate::model::{
    package::{PackageDescriptor, PackageName},
    version::SemanticVersion,
};

use super::PackageRegistry;

/// Memoizing wrapper around a registry. Fetch results are immutable, so they
/// are cached forever, keyed by name and by `(name, version)`. The entry API
/// holds the shard lock while the inner fetch runs, so concurrent requests
/// for the same key coalesce into a single inner call.
pub struct CachedRegistry<R> {
    inner: R,
    candidates: DashMap<PackageName, Arc<Vec<SemanticVersion>>>,
    descriptors: DashMap<(PackageName, SemanticVersion), Arc<PackageDescriptor>>,
}

impl<R> CachedRegistry<R> {
    pub fn new(inner: R) -> CachedRegistry<R> {
        CachedRegistry {
            inner,
            candidates: DashMap::new(),
            descriptors: DashMap::new(),
        }
    }
}

impl<R: PackageRegistry> PackageRegistry for CachedRegistry<R> {
    fn candidates(&self, name: &PackageName) -> anyhow::Result<Vec<SemanticVersion>> {
        let versions = self
            .candidates
            .entry(name.clone())
            .or_try_insert_with(|| {
                trace!("Version list cache miss for {name}");
                self.inner.candidates(name).map(Arc::new)
            })?
            .clone();
        Ok(versions.as_ref().clone())
    }

    fn descriptor(
        &self,
        name: &PackageName,
        version: &SemanticVersion,
    ) -> anyhow::Result<Arc<PackageDescriptor>> {
        let descriptor = self
            .descriptors
            .entry((name.clone(), *version))
            .or_try_insert_with(|| {
                trace!("Descriptor cache miss for {name} {version}");
                self.inner.descriptor(name, version)
            })?
            .clone();
        Ok(descriptor)
    }
}
