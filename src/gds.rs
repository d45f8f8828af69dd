//! Goal dependency sets.
//!
//! A sub-goal that produces an o-supported result keeps track of the WMEs
//! that result was derived from. Supergoal WMEs and architecture WMEs join
//! the set directly. Local i-supported WMEs are expanded through the
//! firings that support them, breadth first. When a WME in a live goal's set
//! is removed, the goal and everything below it are retracted at the next
//! flush.

use std::collections::{HashSet, VecDeque};

use crate::engine::Engine;
use crate::error::DecideResult;
use crate::graph::{
    GdsId, GoalLevel, IdentifierId, InstId, PrefId, PreferenceType, TOP_GOAL_LEVEL, WmeId, WmeKind,
};

/// WMEs a goal's o-supported results depend on.
#[derive(Debug, Clone, Default)]
pub struct GoalDependencySet {
    /// Owning goal; `None` once the goal is gone.
    pub goal: Option<IdentifierId>,
    pub wmes: Vec<WmeId>,
}

impl Engine {
    /// Elaborate the GDS of the goal that produced `w`, if `w` is a local
    /// o-supported result of a sub-goal.
    pub(crate) fn maybe_elaborate_gds(&mut self, w: WmeId, pref: PrefId) -> DecideResult<()> {
        if !self.config.gds {
            return Ok(());
        }
        let p = self.graph.preference(pref)?;
        let Some(inst) = p.inst.filter(|_| p.o_supported) else {
            return Ok(());
        };
        let record = self.graph.instantiation(inst)?;
        let (goal, level) = (record.match_goal, record.match_goal_level);
        if level <= TOP_GOAL_LEVEL {
            return Ok(());
        }
        let wme_level = self.graph.identifier(self.graph.wme(w)?.id)?.level;
        let active = self
            .graph
            .try_identifier(goal)
            .is_some_and(|g| g.is_active_goal());
        if wme_level != level || !active {
            return Ok(());
        }
        let gds = self.ensure_gds(goal)?;
        self.elaborate_gds(gds, level, inst)
    }

    fn ensure_gds(&mut self, goal: IdentifierId) -> DecideResult<GdsId> {
        if let Some(gds) = self.graph.goal_info(goal)?.gds {
            return Ok(gds);
        }
        let gds = self.graph.insert_gds(GoalDependencySet {
            goal: Some(goal),
            wmes: Vec::new(),
        });
        self.graph.goal_info_mut(goal)?.gds = Some(gds);
        tracing::trace!(goal = %self.graph.name(goal), "created goal dependency set");
        Ok(gds)
    }

    fn elaborate_gds(&mut self, gds: GdsId, level: GoalLevel, inst: InstId) -> DecideResult<()> {
        let mut queue = VecDeque::from([inst]);
        let mut seen: HashSet<InstId> = HashSet::new();

        while let Some(inst) = queue.pop_front() {
            if !seen.insert(inst) {
                continue;
            }
            let Some(record) = self.graph.try_instantiation(inst) else {
                continue;
            };
            let conditions = record.conditions.clone();
            for cond in conditions {
                let Some(wme) = self.graph.try_wme(cond.wme) else {
                    continue;
                };
                let architecture = matches!(wme.kind, WmeKind::Architecture | WmeKind::Input);
                let Some(p) = wme.preference.filter(|_| cond.level >= level && !architecture)
                else {
                    self.add_wme_to_gds(gds, cond.wme)?;
                    continue;
                };
                let Some(pref) = self.graph.try_preference(p) else {
                    continue;
                };
                if pref.o_supported {
                    continue;
                }
                queue.extend(pref.inst);
                if let Some(slot) = pref.slot.and_then(|s| self.graph.try_slot(s)) {
                    for kind in [PreferenceType::Acceptable, PreferenceType::Require] {
                        for q in slot.preferences(kind) {
                            let Some(other) = self.graph.try_preference(*q) else {
                                continue;
                            };
                            if other.value == wme.value {
                                queue.extend(other.inst);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Put `w` into `gds`. A WME already in the set of a live shallower goal
    /// stays there.
    fn add_wme_to_gds(&mut self, gds: GdsId, w: WmeId) -> DecideResult<()> {
        let current = self.graph.wme(w)?.gds;
        if current == Some(gds) {
            return Ok(());
        }
        if let Some(old) = current {
            let new_level = self.gds_goal_level(gds);
            let old_level = self.gds_goal_level(old);
            if old_level.is_some_and(|l| new_level.is_none_or(|n| l <= n)) {
                return Ok(());
            }
            if let Ok(set) = self.graph.gds_mut(old) {
                set.wmes.retain(|x| *x != w);
            }
        }
        self.graph.wme_mut(w)?.gds = Some(gds);
        self.graph.gds_mut(gds)?.wmes.push(w);
        Ok(())
    }

    fn gds_goal_level(&self, gds: GdsId) -> Option<GoalLevel> {
        let goal = self.graph.try_gds(gds)?.goal?;
        self.graph
            .try_identifier(goal)
            .filter(|g| g.is_active_goal())
            .map(|g| g.level)
    }

    pub(crate) fn note_gds_violation(&mut self, goal: IdentifierId, w: WmeId) {
        let active = self
            .graph
            .try_identifier(goal)
            .is_some_and(|g| g.is_active_goal());
        if !active || self.gds_violations.contains(&goal) {
            return;
        }
        tracing::debug!(
            goal = %self.graph.name(goal),
            wme = %w,
            "goal dependency set violated"
        );
        self.stats.gds_violations += 1;
        self.gds_violations.push(goal);
    }

    /// Retract every goal whose dependency set lost a member.
    pub(crate) fn process_gds_violations(&mut self) -> DecideResult<()> {
        let mut violations = std::mem::take(&mut self.gds_violations);
        // Shallowest first; removing it takes the deeper ones along.
        violations.sort_by_key(|g| self.graph.try_identifier(*g).map(|i| i.level));
        for goal in violations {
            let active = self
                .graph
                .try_identifier(goal)
                .is_some_and(|g| g.is_active_goal());
            if !active {
                continue;
            }
            let higher = self.graph.goal_info(goal)?.higher_goal;
            self.remove_existing_context_and_descendents(goal)?;
            if let Some(higher) = higher {
                let slot = self.graph.operator_slot(higher)?;
                self.mark_slot_as_changed(slot)?;
            }
        }
        Ok(())
    }

    /// Free a set and detach its WMEs.
    pub(crate) fn release_gds(&mut self, gds: GdsId) {
        let Some(set) = self.graph.remove_gds(gds) else {
            return;
        };
        for w in set.wmes {
            if let Ok(wme) = self.graph.wme_mut(w) {
                if wme.gds == Some(gds) {
                    wme.gds = None;
                }
            }
        }
    }

    /// Members of a goal's dependency set.
    pub fn gds_wmes(&self, goal: IdentifierId) -> Vec<WmeId> {
        self.graph
            .goal_info(goal)
            .ok()
            .and_then(|g| g.gds)
            .and_then(|gds| self.graph.try_gds(gds))
            .map(|set| set.wmes.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::engine::{DecisionOutcome, Engine};
    use crate::graph::{ImpasseType, InstantiationSpec, PreferenceSpec};
    use crate::symbol::Symbol;

    fn engine_with_subgoal(gds: bool) -> (Engine, crate::graph::IdentifierId, crate::graph::IdentifierId) {
        let config = EngineConfig {
            gds,
            ..EngineConfig::default()
        };
        let mut e = Engine::new(config).unwrap();
        let s1 = e.create_top_goal().unwrap();
        let outcome = e.run_decision_phase().unwrap();
        let DecisionOutcome::Impasse { goal, impasse, .. } = outcome else {
            panic!("expected a state no-change, got {outcome:?}");
        };
        assert_eq!(impasse, ImpasseType::NoChange);
        (e, s1, goal)
    }

    #[test]
    fn local_result_depends_on_supergoal_wme() {
        let (mut e, s1, s2) = engine_with_subgoal(true);
        let input = e.add_input_wme(s1, "color", "red").unwrap();
        e.do_buffered_wm_and_ownership_changes().unwrap();

        e.add_instantiation(
            InstantiationSpec::new("note-color", s2)
                .with_condition(input)
                .with_preference(PreferenceSpec::acceptable(s2, "seen", "red").o_supported()),
        )
        .unwrap();
        e.run_wm_phase().unwrap();
        assert_eq!(e.gds_wmes(s2), vec![input]);

        e.remove_input_wme(input).unwrap();
        e.do_buffered_wm_and_ownership_changes().unwrap();
        assert!(e.graph().try_identifier(s2).is_none());
        assert_eq!(e.goal_stack(), vec![s1]);
        assert_eq!(e.stats().gds_violations, 1);
    }

    #[test]
    fn disabled_gds_keeps_the_subgoal() {
        let (mut e, s1, s2) = engine_with_subgoal(false);
        let input = e.add_input_wme(s1, "color", "red").unwrap();
        e.do_buffered_wm_and_ownership_changes().unwrap();
        e.add_instantiation(
            InstantiationSpec::new("note-color", s2)
                .with_condition(input)
                .with_preference(PreferenceSpec::acceptable(s2, "seen", "red").o_supported()),
        )
        .unwrap();
        e.run_wm_phase().unwrap();
        assert!(e.gds_wmes(s2).is_empty());

        e.remove_input_wme(input).unwrap();
        e.do_buffered_wm_and_ownership_changes().unwrap();
        assert_eq!(e.goal_stack(), vec![s1, s2]);
        assert_eq!(e.slot_values(s2, &Symbol::str("seen")), vec![Symbol::str("red")]);
    }

    #[test]
    fn local_i_supported_condition_expands_through_its_firing() {
        let (mut e, s1, s2) = engine_with_subgoal(true);
        let input = e.add_input_wme(s1, "size", 3_i64).unwrap();
        e.do_buffered_wm_and_ownership_changes().unwrap();

        e.add_instantiation(
            InstantiationSpec::new("elaborate", s2)
                .with_condition(input)
                .with_preference(PreferenceSpec::acceptable(s2, "big", "yes")),
        )
        .unwrap();
        e.run_wm_phase().unwrap();
        let slot = e.graph().find_slot(s2, &Symbol::str("big")).unwrap();
        let local = e.graph().slot(slot).unwrap().wmes[0];

        e.add_instantiation(
            InstantiationSpec::new("result", s2)
                .with_condition(local)
                .with_preference(PreferenceSpec::acceptable(s2, "answer", "big").o_supported()),
        )
        .unwrap();
        e.run_wm_phase().unwrap();
        assert_eq!(e.gds_wmes(s2), vec![input]);
    }
}
