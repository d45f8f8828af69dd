//! Promotion: raising identifiers (and what they reach) to a shallower level.

use crate::error::{DecideResult, GcError};
use crate::graph::{Closure, GoalLevel, IdentifierGraph, IdentifierId};

use super::Collector;

impl Collector {
    /// Apply every buffered promotion.
    pub fn do_promotion(&mut self, graph: &mut IdentifierGraph) -> DecideResult<()> {
        while let Some(id) = self.promoted.pop() {
            let Some(level) = graph.try_identifier(id).map(|i| i.promotion_level) else {
                continue;
            };
            promote_id_and_tc(graph, id, level)?;
            self.stats.promotions += 1;
        }
        Ok(())
    }
}

/// Raise `root` and its transitive closure to `new_level`.
///
/// Identifiers already at or above `new_level`, or about to be promoted even
/// higher, stop the walk. Reaching a goal or impasse is fatal.
pub(crate) fn promote_id_and_tc(
    graph: &mut IdentifierGraph,
    root: IdentifierId,
    new_level: GoalLevel,
) -> DecideResult<()> {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let name = graph.name(id);
        let Ok(ident) = graph.identifier_mut(id) else {
            continue;
        };
        if ident.level <= new_level || ident.promotion_level < new_level {
            continue;
        }
        if ident.is_goal_or_impasse() {
            tracing::error!(id = %name, level = new_level, "attempted to promote a goal or impasse");
            return Err(GcError::PromotedGoal {
                id: name,
                level: new_level,
            }
            .into());
        }
        ident.level = new_level;
        ident.promotion_level = new_level;
        ident.could_be_a_link_from_below = true;
        stack.extend(graph.children(id, Closure::Promotion));
    }
    Ok(())
}
