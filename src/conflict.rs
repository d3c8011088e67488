use std::collections::BTreeSet;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    collector::CollectedInstruction,
    model::package::QualifiedId,
    tree::{DirectoryTree, NodeId},
};

#[derive(Error, Debug)]
pub enum ConflictError {
    #[error("instructions `{a}` and `{b}` declare that they override each other")]
    MutualOverride { a: QualifiedId, b: QualifiedId },
    #[error(
        "instructions `{a}` and `{b}` apply to the same directories with equal \
         precedence and no override between them; declare an override or \
         distinct tiers"
    )]
    Unresolvable { a: QualifiedId, b: QualifiedId },
}

/// An instruction that survived conflict resolution, carrying the directory
/// set it finally applies to. The set may be narrower than what its scope
/// pattern matched, where a higher-precedence instruction took the overlap.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveInstruction {
    pub qualified: QualifiedId,
    pub text: String,
    pub tier: i32,
    pub distance: usize,
    pub order: usize,
    pub applicability: BTreeSet<NodeId>,
}

/// Applies the precedence policy pairwise, in collection order: an explicit
/// override cedes the overlap, then the higher tier wins it, then the
/// instruction closer to the manifest root. A pair the policy cannot
/// separate fails the compile rather than guessing.
pub fn resolve_conflicts(
    collected: Vec<CollectedInstruction>,
    tree: &DirectoryTree,
) -> Result<Vec<EffectiveInstruction>, ConflictError> {
    let mut effective: Vec<EffectiveInstruction> = Vec::with_capacity(collected.len());
    let mut overrides: Vec<BTreeSet<QualifiedId>> = Vec::with_capacity(collected.len());
    for instruction in collected {
        let applicability = tree.applicability(&instruction.scope);
        if applicability.is_empty() {
            warn!(
                "Instruction {} matches no files (scope `{}`); skipping it",
                instruction.qualified, instruction.scope
            );
            continue;
        }
        effective.push(EffectiveInstruction {
            qualified: instruction.qualified,
            text: instruction.text,
            tier: instruction.tier,
            distance: instruction.distance,
            order: instruction.order,
            applicability,
        });
        overrides.push(instruction.overrides);
    }

    for i in 0..effective.len() {
        for j in (i + 1)..effective.len() {
            let (head, tail) = effective.split_at_mut(j);
            let a = &mut head[i];
            let b = &mut tail[0];

            let overlap: BTreeSet<NodeId> = a
                .applicability
                .intersection(&b.applicability)
                .copied()
                .collect();
            if overlap.is_empty() {
                continue;
            }

            let a_overrides_b = overrides[i].contains(&b.qualified);
            let b_overrides_a = overrides[j].contains(&a.qualified);
            let (winner, loser) = match (a_overrides_b, b_overrides_a) {
                (true, true) => {
                    return Err(ConflictError::MutualOverride {
                        a: a.qualified.clone(),
                        b: b.qualified.clone(),
                    })
                }
                (true, false) => (&*a, b),
                (false, true) => (&*b, a),
                (false, false) => {
                    if a.tier != b.tier {
                        if a.tier > b.tier {
                            (&*a, b)
                        } else {
                            (&*b, a)
                        }
                    } else if a.distance != b.distance {
                        if a.distance < b.distance {
                            (&*a, b)
                        } else {
                            (&*b, a)
                        }
                    } else {
                        return Err(ConflictError::Unresolvable {
                            a: a.qualified.clone(),
                            b: b.qualified.clone(),
                        });
                    }
                }
            };

            debug!(
                "Instruction {} cedes {} director{} to {}",
                loser.qualified,
                overlap.len(),
                if overlap.len() == 1 { "y" } else { "ies" },
                winner.qualified
            );
            for node in &overlap {
                loser.applicability.remove(node);
            }
        }
    }

    let before = effective.len();
    effective.retain(|instruction| {
        if instruction.applicability.is_empty() {
            warn!(
                "Instruction {} was fully superseded; skipping it",
                instruction.qualified
            );
            return false;
        }
        true
    });
    debug!(
        "Conflict resolution kept {} of {} applicable instructions",
        effective.len(),
        before
    );
    Ok(effective)
}
