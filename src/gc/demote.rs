//! Mark and walk phases of demotion.

use std::collections::{BTreeSet, HashSet};

use crate::graph::{Closure, GoalLevel, IdentifierGraph, IdentifierId, LOWEST_POSSIBLE_GOAL_LEVEL};

/// Goal levels the walk phase has to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRange {
    /// Shallowest level anything marked could fall from.
    pub highest: GoalLevel,
    /// Deepest level anything marked could fall to.
    pub lowest: GoalLevel,
}

/// Mark every root and its transitive closure at or below the root's level
/// as having unknown level.
pub(crate) fn mark_unknown_levels(
    graph: &IdentifierGraph,
    roots: &[IdentifierId],
    unknown: &mut BTreeSet<IdentifierId>,
) -> LevelRange {
    let mut range = LevelRange {
        highest: LOWEST_POSSIBLE_GOAL_LEVEL,
        lowest: 0,
    };
    let mut marked: HashSet<IdentifierId> = HashSet::new();

    for root in roots {
        let Some(start) = graph.try_identifier(*root).map(|i| i.level) else {
            unknown.remove(root);
            continue;
        };
        let mut stack = vec![*root];
        while let Some(id) = stack.pop() {
            let Some(ident) = graph.try_identifier(id) else {
                continue;
            };
            if ident.is_goal_or_impasse() || ident.level < start || !marked.insert(id) {
                continue;
            }
            range.highest = range.highest.min(ident.level);
            range.lowest = if ident.could_be_a_link_from_below {
                LOWEST_POSSIBLE_GOAL_LEVEL
            } else {
                range.lowest.max(ident.level)
            };
            unknown.insert(id);
            stack.extend(graph.children(id, Closure::Reachability));
        }
    }
    range
}

/// Walk down from each goal in `range`, top first, assigning the goal's
/// level to every unknown identifier it reaches.
pub(crate) fn walk_levels(
    graph: &mut IdentifierGraph,
    goals: &[IdentifierId],
    range: LevelRange,
    unknown: &mut BTreeSet<IdentifierId>,
) {
    let mut walked: HashSet<IdentifierId> = HashSet::new();
    for goal in goals {
        let Some(walk_level) = graph.try_identifier(*goal).map(|g| g.level) else {
            continue;
        };
        if walk_level > range.lowest {
            break;
        }
        if walk_level < range.highest {
            continue;
        }
        let mut stack = vec![*goal];
        while let Some(id) = stack.pop() {
            if !walked.insert(id) {
                continue;
            }
            let is_unknown = unknown.contains(&id);
            let Ok(ident) = graph.identifier_mut(id) else {
                continue;
            };
            if !is_unknown && ident.level < walk_level {
                continue;
            }
            if is_unknown {
                unknown.remove(&id);
                ident.level = walk_level;
                ident.promotion_level = walk_level;
            }
            stack.extend(graph.children(id, Closure::Reachability));
        }
    }
}
