use std::collections::BTreeSet;

use log::debug;

use crate::{
    model::package::{QualifiedId, ScopePattern},
    resolver::DependencyGraph,
};

/// An instruction flattened out of the resolved graph, annotated with the
/// precedence inputs conflict resolution needs.
#[derive(Debug, Clone)]
pub struct CollectedInstruction {
    pub qualified: QualifiedId,
    pub text: String,
    pub scope: ScopePattern,
    pub tier: i32,
    pub overrides: BTreeSet<QualifiedId>,
    /// Shortest requirement chain from the manifest root to the owner.
    pub distance: usize,
    /// Global collection index. The default precedence tie-break and the
    /// order instructions appear in emitted artifacts.
    pub order: usize,
}

/// Flattens the graph into one ordered instruction sequence: packages in
/// deterministic topological order (dependencies first), instructions in
/// their package's declaration order. Qualified ids are unique by
/// construction, since descriptors reject duplicate ids at parse time.
pub fn collect(graph: &DependencyGraph) -> Vec<CollectedInstruction> {
    let mut collected = Vec::new();
    for name in graph.topological_order() {
        // Topological order only yields resolved packages.
        let Some(package) = graph.get(&name) else {
            continue;
        };
        for spec in &package.descriptor.instructions {
            collected.push(CollectedInstruction {
                qualified: QualifiedId::new(name.clone(), spec.id.clone()),
                text: spec.text.clone(),
                scope: spec.scope.clone(),
                tier: spec.tier,
                overrides: spec.overrides.clone(),
                distance: package.distance,
                order: collected.len(),
            });
        }
    }
    debug!(
        "Collected {} instructions from {} packages",
        collected.len(),
        graph.len()
    );
    collected
}
