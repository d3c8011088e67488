use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::Arc,
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    model::{
        lock::{LockFile, LockedPackage},
        manifest::Manifest,
        package::{PackageDescriptor, PackageName},
        version::{SemanticVersion, VersionRange},
    },
    registry::PackageRegistry,
};

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("cyclic dependency detected: {}", format_cycle(.0))]
    CyclicDependency(Vec<PackageName>),
    #[error(
        "no published version of `{package}` satisfies the combined requirements: {}",
        format_requirements(.requirements)
    )]
    UnsatisfiableConstraint {
        package: PackageName,
        requirements: Vec<(PackageName, VersionRange)>,
    },
    #[error("failed to fetch package metadata: {0}")]
    Fetch(#[source] anyhow::Error),
}

fn format_cycle(cycle: &[PackageName]) -> String {
    cycle
        .iter()
        .map(PackageName::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_requirements(requirements: &[(PackageName, VersionRange)]) -> String {
    requirements
        .iter()
        .map(|(requirer, range)| format!("`{range}` (required by {requirer})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One package pinned by resolution.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub version: SemanticVersion,
    pub descriptor: Arc<PackageDescriptor>,
    /// Length of the shortest requirement chain from the manifest root.
    /// Root requirements have distance 1. Smaller means closer to the root,
    /// which wins precedence ties during conflict resolution.
    pub distance: usize,
}

/// The resolved, acyclic dependency graph: one concrete version per package
/// name. Read-only once built.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    root: PackageName,
    packages: BTreeMap<PackageName, ResolvedPackage>,
    dependencies: BTreeMap<PackageName, BTreeSet<PackageName>>,
}

impl DependencyGraph {
    pub fn root(&self) -> &PackageName {
        &self.root
    }

    pub fn get(&self, name: &PackageName) -> Option<&ResolvedPackage> {
        self.packages.get(name)
    }

    pub fn packages(&self) -> impl Iterator<Item = (&PackageName, &ResolvedPackage)> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Deterministic topological order, dependencies before dependents.
    /// Among packages whose dependencies are already emitted, the one
    /// farther from the manifest root goes first, then lexicographic name.
    pub fn topological_order(&self) -> Vec<PackageName> {
        let mut remaining: Vec<&PackageName> = self.packages.keys().collect();
        remaining.sort_by_key(|name| {
            (
                std::cmp::Reverse(self.packages[*name].distance),
                (*name).clone(),
            )
        });

        let mut emitted: BTreeSet<&PackageName> = BTreeSet::new();
        let mut result = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|name| {
                let ready = self.dependencies[*name]
                    .iter()
                    .all(|dep| emitted.contains(dep));
                if ready {
                    emitted.insert(*name);
                    result.push((*name).clone());
                }
                !ready
            });
            // The graph is acyclic by construction; resolution fails on
            // cycles before a graph is ever returned.
            assert!(remaining.len() < before, "dependency graph has a cycle");
        }
        result
    }

    pub fn to_lock_file(&self) -> LockFile {
        LockFile::new(
            self.packages
                .iter()
                .map(|(name, package)| LockedPackage {
                    name: name.clone(),
                    version: package.version,
                })
                .collect(),
        )
    }
}

struct PendingRequirement {
    name: PackageName,
    range: VersionRange,
    requirer: PackageName,
    /// Requirement chain from the root down to (excluding) `name`.
    path: Vec<PackageName>,
    /// Pick counter of `requirer` at enqueue time; a later re-pick of the
    /// requirer makes this requirement stale.
    generation: u64,
}

/// Resolves the manifest's declared requirements into a concrete dependency
/// graph: breadth-first traversal, range intersection per package name, and
/// lazy descriptor fetches once a provisional version is chosen. Purely a
/// function of the manifest and the registry snapshot.
pub fn resolve<R: PackageRegistry>(
    manifest: &Manifest,
    registry: &R,
) -> Result<DependencyGraph, ResolutionError> {
    let mut contributions: BTreeMap<PackageName, Vec<(PackageName, VersionRange)>> =
        BTreeMap::new();
    let mut chosen: BTreeMap<PackageName, (SemanticVersion, Arc<PackageDescriptor>)> =
        BTreeMap::new();
    let mut distances: BTreeMap<PackageName, usize> = BTreeMap::new();
    let mut dependencies: BTreeMap<PackageName, BTreeSet<PackageName>> = BTreeMap::new();
    let mut generations: HashMap<PackageName, u64> = HashMap::new();

    let mut queue: VecDeque<PendingRequirement> = manifest
        .requirements
        .iter()
        .map(|requirement| PendingRequirement {
            name: requirement.name.clone(),
            range: requirement.range.clone(),
            requirer: manifest.name.clone(),
            path: Vec::new(),
            generation: 0,
        })
        .collect();

    while let Some(pending) = queue.pop_front() {
        if !pending.path.is_empty()
            && pending.generation != generations.get(&pending.requirer).copied().unwrap_or(0)
        {
            debug!(
                "Skipping requirement on {} from a superseded pick of {}",
                pending.name, pending.requirer
            );
            continue;
        }

        if let Some(position) = pending.path.iter().position(|name| name == &pending.name) {
            let mut cycle: Vec<PackageName> = pending.path[position..].to_vec();
            cycle.push(pending.name.clone());
            return Err(ResolutionError::CyclicDependency(cycle));
        }

        debug!(
            "Resolving {} {} (required by {})",
            pending.name, pending.range, pending.requirer
        );

        contributions
            .entry(pending.name.clone())
            .or_default()
            .push((pending.requirer.clone(), pending.range.clone()));

        let depth = pending.path.len() + 1;
        distances
            .entry(pending.name.clone())
            .and_modify(|d| *d = (*d).min(depth))
            .or_insert(depth);

        // Only the live requirers' ranges bind; a re-pick of a requirer
        // purges its old contributions below, so the intersection here is
        // always over the current graph's edges.
        let combined = contributions[&pending.name]
            .iter()
            .fold(VersionRange::any(), |acc, (_, range)| acc.intersect(range));
        if combined.is_empty() {
            let requirements = contributions.remove(&pending.name).unwrap_or_default();
            return Err(ResolutionError::UnsatisfiableConstraint {
                package: pending.name,
                requirements,
            });
        }

        if let Some((version, _)) = chosen.get(&pending.name) {
            if combined.matches(version) {
                // The earlier choice still satisfies every requirement; the
                // new edge is recorded, nothing to re-traverse.
                continue;
            }
        }

        let candidates = registry
            .candidates(&pending.name)
            .map_err(ResolutionError::Fetch)?;
        let version = match candidates.iter().find(|v| combined.matches(v)) {
            Some(version) => *version,
            None => {
                let requirements = contributions.remove(&pending.name).unwrap_or_default();
                return Err(ResolutionError::UnsatisfiableConstraint {
                    package: pending.name,
                    requirements,
                });
            }
        };

        let descriptor = registry
            .descriptor(&pending.name, &version)
            .map_err(ResolutionError::Fetch)?;
        info!("Resolved {} {}", pending.name, version);

        // A re-pick replaces the package's outgoing edges wholesale: the old
        // version's requirements no longer bind anything.
        if chosen.contains_key(&pending.name) {
            for entries in contributions.values_mut() {
                entries.retain(|(requirer, _)| requirer != &pending.name);
            }
        }
        dependencies.insert(
            pending.name.clone(),
            descriptor.dependencies.keys().cloned().collect(),
        );
        let generation = generations
            .entry(pending.name.clone())
            .and_modify(|g| *g += 1)
            .or_insert(0);
        let generation = *generation;

        let mut path = pending.path;
        path.push(pending.name.clone());
        for (dep_name, dep_range) in &descriptor.dependencies {
            queue.push_back(PendingRequirement {
                name: dep_name.clone(),
                range: dep_range.clone(),
                requirer: pending.name.clone(),
                path: path.clone(),
                generation,
            });
        }

        chosen.insert(pending.name.clone(), (version, descriptor));
    }

    // Re-pinning can strand packages that nothing requires any more; only
    // packages reachable from the manifest requirements belong in the graph.
    let reachable = reachable_set(manifest, &dependencies);

    let packages: BTreeMap<PackageName, ResolvedPackage> = chosen
        .into_iter()
        .filter(|(name, _)| reachable.contains(name))
        .map(|(name, (version, descriptor))| {
            let distance = distances[&name];
            (
                name,
                ResolvedPackage {
                    version,
                    descriptor,
                    distance,
                },
            )
        })
        .collect();
    dependencies.retain(|name, _| reachable.contains(name));

    debug!("Resolution complete: {} packages", packages.len());
    Ok(DependencyGraph {
        root: manifest.name.clone(),
        packages,
        dependencies,
    })
}

fn reachable_set(
    manifest: &Manifest,
    dependencies: &BTreeMap<PackageName, BTreeSet<PackageName>>,
) -> BTreeSet<PackageName> {
    let mut reachable: BTreeSet<PackageName> = BTreeSet::new();
    let mut frontier: VecDeque<PackageName> = manifest
        .requirements
        .iter()
        .map(|requirement| requirement.name.clone())
        .collect();
    while let Some(name) = frontier.pop_front() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(deps) = dependencies.get(&name) {
            frontier.extend(deps.iter().cloned());
        }
    }
    reachable
}
