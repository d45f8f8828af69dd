//! Ownership and garbage collection of identifiers.
//!
//! Every counted link (a WME or preference from one identifier to another,
//! plus the goal stack's own link to each goal) goes through
//! [`Collector::link_add`] / [`Collector::link_remove`]. Links from shallower
//! identifiers buffer promotions; removals that might have disconnected
//! something put the target into the unknown-level set. At flush time the
//! engine runs [`Collector::do_promotion`] and then demotion, which collects
//! disconnected identifiers, marks the transitive closure of everything whose
//! level is in doubt, and walks down from the goals to settle it.
//!
//! The collector never frees graph entries itself. It decides *which*
//! identifiers die; the engine's working-memory code removes their WMEs and
//! preferences and finally drops them from the arena.

mod demote;
mod promote;

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::error::DecideResult;
use crate::graph::{IdentifierGraph, IdentifierId};
use crate::symbol::Symbol;

pub use demote::LevelRange;

/// How `link_remove` reacts to a dropped link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Ordinary operation: suspicious removals go to the unknown-level set.
    #[default]
    Normal,
    /// Collecting disconnected identifiers: zero counts join the queue,
    /// survivors that may have lost their path are marked unknown.
    CollectingDisconnected,
    /// Reachability already settled: only keep the counts straight.
    JustCount,
}

/// Counters reported through `Engine::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub demotion_passes: u64,
    pub promotions: u64,
    pub identifiers_reclaimed: u64,
}

/// Buffered ownership state between flushes.
#[derive(Debug, Default)]
pub struct Collector {
    promoted: Vec<IdentifierId>,
    unknown: BTreeSet<IdentifierId>,
    disconnected: Vec<IdentifierId>,
    queued: HashSet<IdentifierId>,
    reclaimed: HashSet<IdentifierId>,
    stats: GcStats,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Register a freshly made identifier; it dies at the next flush unless
    /// something links to it first.
    pub fn note_new_identifier(&mut self, id: IdentifierId) {
        self.unknown.insert(id);
    }

    /// Count a link `from -> to`. `from == None` is the goal stack's link.
    pub fn link_add(
        &mut self,
        graph: &mut IdentifierGraph,
        from: Option<IdentifierId>,
        to: &Symbol,
    ) -> DecideResult<()> {
        let Some(to) = to.as_id() else {
            return Ok(());
        };
        let from_level = match from {
            Some(f) => Some(graph.identifier(f)?.promotion_level),
            None => None,
        };
        let target = graph.identifier_mut(to)?;
        if from.is_some() && target.is_goal_or_impasse() {
            return Ok(());
        }
        target.link_count += 1;

        let Some(from_level) = from_level else {
            return Ok(());
        };
        if from_level == target.promotion_level {
            return Ok(());
        }
        if from_level > target.promotion_level {
            target.could_be_a_link_from_below = true;
            return Ok(());
        }
        target.promotion_level = from_level;
        self.promoted.push(to);
        Ok(())
    }

    /// Drop a counted link `from -> to`.
    pub fn link_remove(
        &mut self,
        graph: &mut IdentifierGraph,
        from: Option<IdentifierId>,
        to: &Symbol,
        mode: LinkMode,
    ) -> DecideResult<()> {
        let Some(to) = to.as_id() else {
            return Ok(());
        };
        let from_level = match from {
            Some(f) => graph.try_identifier(f).map(|i| i.level),
            None => None,
        };
        let target = graph.identifier_mut(to)?;
        if from.is_some() && target.is_goal_or_impasse() {
            return Ok(());
        }
        target.link_count = target.link_count.saturating_sub(1);
        let zeroed = target.link_count == 0;
        let same_level = from_level == Some(target.level);

        match mode {
            LinkMode::JustCount => {
                if zeroed && !self.unknown.contains(&to) {
                    self.queue_disconnected(to);
                }
            }
            LinkMode::CollectingDisconnected => {
                if zeroed {
                    self.unknown.remove(&to);
                    self.queue_disconnected(to);
                } else if from.is_none() || same_level {
                    self.unknown.insert(to);
                }
            }
            LinkMode::Normal => {
                if zeroed || from.is_none() || same_level {
                    self.unknown.insert(to);
                }
            }
        }
        Ok(())
    }

    fn queue_disconnected(&mut self, id: IdentifierId) {
        if !self.reclaimed.contains(&id) && self.queued.insert(id) {
            self.disconnected.push(id);
        }
    }

    /// Move zero-count identifiers from the unknown set to the disconnected
    /// queue.
    pub fn take_zero_count_unknowns(&mut self, graph: &IdentifierGraph) {
        let zeroed: Vec<IdentifierId> = self
            .unknown
            .iter()
            .copied()
            .filter(|id| {
                graph
                    .try_identifier(*id)
                    .is_none_or(|i| i.link_count == 0 && !i.is_active_goal())
            })
            .collect();
        for id in zeroed {
            self.unknown.remove(&id);
            if graph.try_identifier(id).is_some() {
                self.queue_disconnected(id);
            }
        }
    }

    pub fn pop_disconnected(&mut self) -> Option<IdentifierId> {
        let id = self.disconnected.pop()?;
        self.queued.remove(&id);
        Some(id)
    }

    pub fn has_unknown(&self) -> bool {
        !self.unknown.is_empty()
    }

    /// Claim `id` for collection. Returns false if it was already claimed.
    pub fn claim(&mut self, id: IdentifierId) -> bool {
        self.unknown.remove(&id);
        self.reclaimed.insert(id)
    }

    /// Mark and walk the unknown set against the goal stack (top first).
    /// Returns the identifiers that are still unreachable.
    pub fn settle_unknown_levels(
        &mut self,
        graph: &mut IdentifierGraph,
        goals: &[IdentifierId],
    ) -> Vec<IdentifierId> {
        self.stats.demotion_passes += 1;
        let roots: Vec<IdentifierId> = self.unknown.iter().copied().collect();
        let range = demote::mark_unknown_levels(graph, &roots, &mut self.unknown);
        tracing::debug!(
            unknown = self.unknown.len(),
            highest = range.highest,
            lowest = range.lowest,
            "demotion mark phase"
        );
        demote::walk_levels(graph, goals, range, &mut self.unknown);
        std::mem::take(&mut self.unknown).into_iter().collect()
    }

    /// Identifiers claimed since the last call; the caller frees them.
    pub fn take_reclaimed(&mut self) -> Vec<IdentifierId> {
        let ids: Vec<IdentifierId> = self.reclaimed.drain().collect();
        self.stats.identifiers_reclaimed += ids.len() as u64;
        ids
    }

    /// Forget every buffered change (agent reinitialisation).
    pub fn reset(&mut self) {
        self.promoted.clear();
        self.unknown.clear();
        self.disconnected.clear();
        self.queued.clear();
        self.reclaimed.clear();
    }

    pub fn pending_promotions(&self) -> usize {
        self.promoted.len()
    }
}
