use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    conflict::EffectiveInstruction,
    model::package::QualifiedId,
    tree::{DirectoryTree, NodeId},
};

#[derive(Error, Debug)]
pub enum PlacementError {
    #[error(
        "instruction `{qualified}` is not covered at: {}",
        format_paths(.missing)
    )]
    CoverageViolation {
        qualified: QualifiedId,
        missing: Vec<PathBuf>,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Placement tuning. `tolerance` is the pollution fraction a subtree may
/// carry and still be folded into a single higher placement; `lambda`, when
/// set, switches to exact cost minimization of
/// `|placements| + lambda * |polluted directories|`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementSettings {
    pub tolerance: f64,
    pub lambda: Option<f64>,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        PlacementSettings {
            tolerance: 0.0,
            lambda: None,
        }
    }
}

/// Chosen emission sites per instruction, with pollution accounting. A
/// directory is polluted when it inherits an instruction it does not need;
/// that only ever happens below a placement forced at an in-scope node, or
/// allowed by a non-zero tolerance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    sites: BTreeMap<QualifiedId, BTreeSet<NodeId>>,
    polluted: BTreeMap<QualifiedId, BTreeSet<NodeId>>,
}

impl Placement {
    pub fn sites(&self, qualified: &QualifiedId) -> Option<&BTreeSet<NodeId>> {
        self.sites.get(qualified)
    }

    pub fn polluted(&self, qualified: &QualifiedId) -> Option<&BTreeSet<NodeId>> {
        self.polluted.get(qualified)
    }

    /// Every node that receives an artifact.
    pub fn artifact_nodes(&self) -> BTreeSet<NodeId> {
        self.sites.values().flatten().copied().collect()
    }

    /// How many instructions are assigned to one node.
    pub fn assigned_count(&self, node: NodeId) -> usize {
        self.sites
            .values()
            .filter(|sites| sites.contains(&node))
            .count()
    }

    pub fn site_count(&self) -> usize {
        self.sites.values().map(BTreeSet::len).sum()
    }

    pub fn polluted_directories(&self) -> BTreeSet<NodeId> {
        self.polluted.values().flatten().copied().collect()
    }
}

/// Picks emission sites independently per instruction: a facility-location
/// fold on the tree, starting at the lowest common ancestor of the
/// instruction's applicability set. After placement the coverage invariant
/// is re-checked from scratch; a violation fails the compile.
pub fn place(
    effective: &[EffectiveInstruction],
    tree: &DirectoryTree,
    settings: &PlacementSettings,
) -> Result<Placement, PlacementError> {
    let mut placement = Placement::default();

    for instruction in effective {
        let s = &instruction.applicability;
        let Some(anchor) = tree.lca_of_set(s.iter()) else {
            continue;
        };

        let mut sites = BTreeSet::new();
        let mut polluted = BTreeSet::new();
        match settings.lambda {
            Some(lambda) => {
                if let Some(solution) = cheapest_cover(tree, s, lambda, anchor) {
                    sites.extend(solution.sites);
                    polluted.extend(solution.polluted);
                }
            }
            None => threshold_fold(
                tree,
                s,
                settings.tolerance,
                anchor,
                &mut sites,
                &mut polluted,
            ),
        }

        verify_coverage(tree, instruction, s, &sites)?;
        debug!(
            "Placed {} at {} site(s), {} polluted director(ies)",
            instruction.qualified,
            sites.len(),
            polluted.len()
        );
        placement.sites.insert(instruction.qualified.clone(), sites);
        placement
            .polluted
            .insert(instruction.qualified.clone(), polluted);
    }

    info!(
        "Placement: {} instructions, {} sites across {} directories, {} polluted",
        effective.len(),
        placement.site_count(),
        placement.artifact_nodes().len(),
        placement.polluted_directories().len()
    );
    Ok(placement)
}

/// Threshold mode: fold a subtree into one placement when its out-of-scope
/// fraction is within the tolerance. An in-scope node whose subtree exceeds
/// the tolerance still gets a placement there, since the node itself must
/// see the instruction and inheritance drags its descendants along; that
/// pollution is unavoidable and counted.
fn threshold_fold(
    tree: &DirectoryTree,
    s: &BTreeSet<NodeId>,
    tolerance: f64,
    node: NodeId,
    sites: &mut BTreeSet<NodeId>,
    polluted: &mut BTreeSet<NodeId>,
) {
    let subtree = tree.subtree(node);
    let outside: Vec<NodeId> = subtree
        .iter()
        .copied()
        .filter(|n| !s.contains(n))
        .collect();
    if outside.len() == subtree.len() {
        return;
    }

    let fraction = outside.len() as f64 / subtree.len() as f64;
    if fraction <= tolerance || s.contains(&node) {
        sites.insert(node);
        polluted.extend(outside);
    } else {
        for &child in tree.children(node) {
            threshold_fold(tree, s, tolerance, child, sites, polluted);
        }
    }
}

struct CoverSolution {
    cost: f64,
    sites: Vec<NodeId>,
    polluted: Vec<NodeId>,
}

/// Cost mode: exact minimization of `|sites| + lambda * |polluted|` over the
/// subtree. Placing at a node covers its whole subtree; descending is only
/// an option at out-of-scope nodes. Ties keep the higher placement.
fn cheapest_cover(
    tree: &DirectoryTree,
    s: &BTreeSet<NodeId>,
    lambda: f64,
    node: NodeId,
) -> Option<CoverSolution> {
    let subtree = tree.subtree(node);
    let outside: Vec<NodeId> = subtree
        .iter()
        .copied()
        .filter(|n| !s.contains(n))
        .collect();
    if outside.len() == subtree.len() {
        return None;
    }

    let mut best = CoverSolution {
        cost: 1.0 + lambda * outside.len() as f64,
        sites: vec![node],
        polluted: outside,
    };

    if !s.contains(&node) {
        let mut cost = 0.0;
        let mut sites = Vec::new();
        let mut polluted = Vec::new();
        for &child in tree.children(node) {
            if let Some(solution) = cheapest_cover(tree, s, lambda, child) {
                cost += solution.cost;
                sites.extend(solution.sites);
                polluted.extend(solution.polluted);
            }
        }
        if cost < best.cost {
            best = CoverSolution {
                cost,
                sites,
                polluted,
            };
        }
    }
    Some(best)
}

/// Re-derives the inherited set from the chosen sites and checks it covers
/// the applicability set. Independent of how the sites were chosen.
fn verify_coverage(
    tree: &DirectoryTree,
    instruction: &EffectiveInstruction,
    s: &BTreeSet<NodeId>,
    sites: &BTreeSet<NodeId>,
) -> Result<(), PlacementError> {
    let missing: Vec<PathBuf> = s
        .iter()
        .filter(|&&node| !sites.iter().any(|&site| tree.is_ancestor_or_self(site, node)))
        .map(|&node| tree.path(node).to_path_buf())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PlacementError::CoverageViolation {
            qualified: instruction.qualified.clone(),
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn tree() -> DirectoryTree {
        DirectoryTree::from_files([
            "README.md",
            "src/a.rs",
            "src/core/b.rs",
            "src/core/c.rs",
            "src/util/d.rs",
            "docs/guide.md",
            "docs/api/index.md",
            "assets/logo.txt",
        ])
    }

    fn node_at(tree: &DirectoryTree, path: &str) -> NodeId {
        (0..tree.len())
            .find(|&id| tree.path(id) == Path::new(path))
            .unwrap()
    }

    fn instruction(qualified: &str, applicability: BTreeSet<NodeId>) -> EffectiveInstruction {
        EffectiveInstruction {
            qualified: qualified.parse().unwrap(),
            text: "t".to_string(),
            tier: 0,
            distance: 1,
            order: 0,
            applicability,
        }
    }

    fn inherited(tree: &DirectoryTree, sites: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        (0..tree.len())
            .filter(|&node| {
                sites
                    .iter()
                    .any(|&site| tree.is_ancestor_or_self(site, node))
            })
            .collect()
    }

    #[test]
    fn full_subtree_folds_to_its_root() {
        let tree = tree();
        let src = node_at(&tree, "src");
        let s: BTreeSet<NodeId> = tree.subtree(src).into_iter().collect();
        let effective = vec![instruction("p:rust", s.clone())];

        let placement = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        let sites = placement.sites(&"p:rust".parse().unwrap()).unwrap();
        assert_eq!(sites, &BTreeSet::from([src]));
        assert!(placement.polluted_directories().is_empty());
        assert_eq!(inherited(&tree, sites), s);
    }

    #[test]
    fn disjoint_components_get_separate_sites() {
        let tree = tree();
        let core = node_at(&tree, "src/core");
        let api = node_at(&tree, "docs/api");
        let s = BTreeSet::from([core, api]);
        let effective = vec![instruction("p:split", s.clone())];

        let placement = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        let sites = placement.sites(&"p:split".parse().unwrap()).unwrap();
        assert_eq!(sites, &s);
        assert!(placement.polluted_directories().is_empty());
        assert_eq!(inherited(&tree, sites), s);
    }

    #[test]
    fn in_scope_node_forces_a_site_and_counts_pollution() {
        let tree = tree();
        let src = node_at(&tree, "src");
        let core = node_at(&tree, "src/core");
        let util = node_at(&tree, "src/util");
        // `src` itself needs the instruction, `src/util` does not; the
        // placement at `src` pollutes `src/util` through inheritance.
        let s = BTreeSet::from([src, core]);
        let effective = vec![instruction("p:forced", s)];

        let placement = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        let qualified = "p:forced".parse().unwrap();
        assert_eq!(placement.sites(&qualified).unwrap(), &BTreeSet::from([src]));
        assert_eq!(placement.polluted(&qualified).unwrap(), &BTreeSet::from([util]));
    }

    #[test]
    fn full_tolerance_folds_to_the_common_ancestor() {
        let tree = tree();
        let core = node_at(&tree, "src/core");
        let api = node_at(&tree, "docs/api");
        let effective = vec![instruction("p:loose", BTreeSet::from([core, api]))];

        let settings = PlacementSettings {
            tolerance: 1.0,
            lambda: None,
        };
        let placement = place(&effective, &tree, &settings).unwrap();
        let sites = placement.sites(&"p:loose".parse().unwrap()).unwrap();
        assert_eq!(sites, &BTreeSet::from([tree.root()]));
        assert_eq!(placement.polluted_directories().len(), tree.len() - 2);
    }

    #[test]
    fn zero_lambda_prefers_one_site() {
        let tree = tree();
        let core = node_at(&tree, "src/core");
        let api = node_at(&tree, "docs/api");
        let effective = vec![instruction("p:cheap", BTreeSet::from([core, api]))];

        let settings = PlacementSettings {
            tolerance: 0.0,
            lambda: Some(0.0),
        };
        let placement = place(&effective, &tree, &settings).unwrap();
        let sites = placement.sites(&"p:cheap".parse().unwrap()).unwrap();
        // Pollution is free at lambda 0, so one site at the common ancestor
        // beats two deeper ones.
        assert_eq!(sites, &BTreeSet::from([tree.root()]));
    }

    #[test]
    fn large_lambda_behaves_like_zero_tolerance() {
        let tree = tree();
        let core = node_at(&tree, "src/core");
        let api = node_at(&tree, "docs/api");
        let s = BTreeSet::from([core, api]);
        let effective = vec![instruction("p:strict", s.clone())];

        let settings = PlacementSettings {
            tolerance: 0.0,
            lambda: Some(100.0),
        };
        let placement = place(&effective, &tree, &settings).unwrap();
        assert_eq!(placement.sites(&"p:strict".parse().unwrap()).unwrap(), &s);
        assert!(placement.polluted_directories().is_empty());
    }

    #[test]
    fn coverage_is_exact_for_every_mode() {
        let tree = tree();
        let s = BTreeSet::from([
            node_at(&tree, "src"),
            node_at(&tree, "src/core"),
            node_at(&tree, "docs/api"),
        ]);
        for settings in [
            PlacementSettings::default(),
            PlacementSettings {
                tolerance: 0.3,
                lambda: None,
            },
            PlacementSettings {
                tolerance: 0.0,
                lambda: Some(1.5),
            },
        ] {
            let effective = vec![instruction("p:any", s.clone())];
            let placement = place(&effective, &tree, &settings).unwrap();
            let qualified = "p:any".parse().unwrap();
            let sites = placement.sites(&qualified).unwrap();
            let covered = inherited(&tree, sites);
            let polluted = placement.polluted(&qualified).unwrap();
            assert_eq!(
                covered,
                s.union(polluted).copied().collect::<BTreeSet<_>>(),
                "settings {settings:?}"
            );
            assert!(covered.is_superset(&s));
        }
    }

    #[test]
    fn placement_is_idempotent() {
        let tree = tree();
        let s = BTreeSet::from([node_at(&tree, "src/core"), node_at(&tree, "docs")]);
        let effective = vec![instruction("p:again", s)];
        let first = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        let second = place(&effective, &tree, &PlacementSettings::default()).unwrap();
        assert_eq!(first, second);
    }
}
