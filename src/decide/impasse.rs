//! Sub-goal and impasse bookkeeping.

use crate::engine::Engine;
use crate::error::{DecideResult, DecisionError};
use crate::gc::LinkMode;
use crate::graph::{IdentifierId, ImpasseType, PrefId, SlotId, WmeId, WmeKind};
use crate::symbol::{Symbol, WellKnown};

fn impasse_symbol(wk: &WellKnown, impasse: ImpasseType) -> Symbol {
    match impasse {
        ImpasseType::None => wk.none.clone(),
        ImpasseType::ConstraintFailure => wk.constraint_failure.clone(),
        ImpasseType::Conflict => wk.conflict.clone(),
        ImpasseType::Tie => wk.tie.clone(),
        ImpasseType::NoChange => wk.no_change.clone(),
    }
}

impl Engine {
    /// Attach an architecture WME to a goal or impasse identifier.
    pub(crate) fn add_impasse_wme(
        &mut self,
        id: IdentifierId,
        attr: Symbol,
        value: Symbol,
        preference: Option<PrefId>,
    ) -> DecideResult<WmeId> {
        let w = self.make_wme(id, attr, value, WmeKind::Architecture, preference)?;
        self.graph.identifier_mut(id)?.impasse_wmes.push(w);
        self.add_wme_to_wm(w)?;
        Ok(w)
    }

    /// Push a new goal below `supergoal` (which must be the bottom goal).
    pub(crate) fn create_new_context(
        &mut self,
        supergoal: IdentifierId,
        attribute: Symbol,
        impasse: ImpasseType,
    ) -> DecideResult<IdentifierId> {
        let level = self.graph.identifier(supergoal)?.level + 1;
        if level > self.config.max_goal_depth {
            tracing::error!(
                max_goal_depth = self.config.max_goal_depth,
                "goal stack depth exceeded"
            );
            return Err(DecisionError::GoalDepthExceeded {
                max_depth: self.config.max_goal_depth,
            }
            .into());
        }

        let goal = self.graph.make_goal(level, Some(supergoal))?;
        self.collector
            .link_add(&mut self.graph, None, &Symbol::Id(goal))?;
        self.graph.goal_info_mut(supergoal)?.lower_goal = Some(goal);
        let info = self.graph.goal_info_mut(goal)?;
        info.impasse_type = impasse;
        info.attribute_of_impasse = Some(attribute.clone());
        self.bottom_goal = Some(goal);

        let wk = self.graph.well_known().clone();
        let choices = if impasse == ImpasseType::NoChange {
            wk.none.clone()
        } else {
            wk.multiple.clone()
        };
        self.add_impasse_wme(goal, wk.type_.clone(), wk.state.clone(), None)?;
        self.add_impasse_wme(goal, wk.superstate.clone(), Symbol::Id(supergoal), None)?;
        self.add_impasse_wme(goal, wk.impasse.clone(), impasse_symbol(&wk, impasse), None)?;
        self.add_impasse_wme(goal, wk.attribute.clone(), attribute, None)?;
        self.add_impasse_wme(goal, wk.choices.clone(), choices, None)?;
        self.add_impasse_wme(goal, wk.quiescence.clone(), wk.t.clone(), None)?;
        self.stats.impasses_created += 1;
        Ok(goal)
    }

    /// Make the `^item` WMEs of `id` match the candidate values and keep
    /// `^item-count` current.
    pub(crate) fn update_impasse_items(&mut self, id: IdentifierId, candidates: &[PrefId]) -> DecideResult<()> {
        let wk = self.graph.well_known().clone();
        let mut desired: Vec<(Symbol, PrefId)> = Vec::new();
        for p in candidates {
            let value = &self.graph.preference(*p)?.value;
            if !desired.iter().any(|(v, _)| v == value) {
                desired.push((value.clone(), *p));
            }
        }
        let count = desired.len() as i64;

        let existing = self.graph.identifier(id)?.impasse_wmes.clone();
        let mut stale = Vec::new();
        for w in existing {
            let wme = self.graph.wme(w)?;
            if wme.attr == wk.item {
                match desired.iter().position(|(v, _)| v == &wme.value) {
                    Some(i) => {
                        desired.remove(i);
                    }
                    None => stale.push(w),
                }
            } else if wme.attr == wk.item_count && wme.value != Symbol::Int(count) {
                stale.push(w);
            }
        }
        let has_count = self
            .graph
            .identifier(id)?
            .impasse_wmes
            .iter()
            .filter(|w| !stale.contains(w))
            .filter_map(|w| self.graph.try_wme(*w))
            .any(|w| w.attr == wk.item_count);

        if !stale.is_empty() {
            self.graph
                .identifier_mut(id)?
                .impasse_wmes
                .retain(|w| !stale.contains(w));
            for w in stale {
                self.remove_wme_from_wm(w, LinkMode::Normal)?;
            }
        }
        for (value, p) in desired {
            self.add_impasse_wme(id, wk.item.clone(), value, Some(p))?;
        }
        if !has_count {
            self.add_impasse_wme(id, wk.item_count.clone(), Symbol::Int(count), None)?;
        }
        Ok(())
    }

    /// Pop `goal` and every goal below it, deepest first.
    pub(crate) fn remove_existing_context_and_descendents(&mut self, goal: IdentifierId) -> DecideResult<()> {
        let mut chain = vec![goal];
        let mut next = self.graph.goal_info(goal)?.lower_goal;
        while let Some(lower) = next {
            chain.push(lower);
            next = self.graph.goal_info(lower)?.lower_goal;
        }
        for g in chain.into_iter().rev() {
            self.remove_goal(g)?;
        }
        Ok(())
    }

    fn remove_goal(&mut self, goal: IdentifierId) -> DecideResult<()> {
        let info = self.graph.goal_info(goal)?;
        let (higher, gds, slot) = (info.higher_goal, info.gds, info.operator_slot);
        let owned = info.preferences_from_goal.clone();

        self.reinforcement.goal_removed(goal);
        if let Some(gds) = gds {
            self.release_gds(gds);
            self.graph.goal_info_mut(goal)?.gds = None;
        }

        match higher {
            Some(h) => {
                self.graph.goal_info_mut(h)?.lower_goal = None;
                let super_slot = self.graph.operator_slot(h)?;
                self.graph.slot_mut(super_slot)?.impasse_type = ImpasseType::None;
                self.bottom_goal = Some(h);
            }
            None => {
                self.top_goal = None;
                self.bottom_goal = None;
            }
        }
        if self.highest_goal_whose_context_changed == Some(goal) {
            self.highest_goal_whose_context_changed = higher;
        }

        for p in owned {
            let in_tm = self.graph.try_preference(p).is_some_and(|pref| pref.in_tm);
            if in_tm {
                self.remove_preference_from_tm(p, LinkMode::Normal)?;
            }
        }
        let operators = std::mem::take(&mut self.graph.slot_mut(slot)?.wmes);
        for w in operators {
            self.remove_wme_from_wm(w, LinkMode::Normal)?;
        }
        let described = std::mem::take(&mut self.graph.identifier_mut(goal)?.impasse_wmes);
        for w in described {
            self.remove_wme_from_wm(w, LinkMode::Normal)?;
        }

        let info = self.graph.goal_info_mut(goal)?;
        info.active = false;
        info.preferences_from_goal.clear();
        info.lower_goal = None;
        self.collector
            .link_remove(&mut self.graph, None, &Symbol::Id(goal), LinkMode::Normal)?;
        self.stats.goals_removed += 1;
        tracing::debug!(goal = %self.graph.name(goal), "removed goal");
        Ok(())
    }

    /// Create the impasse identifier for an ordinary slot.
    pub(crate) fn create_attribute_impasse(
        &mut self,
        slot: SlotId,
        impasse: ImpasseType,
        candidates: &[PrefId],
    ) -> DecideResult<()> {
        let s = self.graph.slot(slot)?;
        let (id, attr) = (s.id, s.attr.clone());
        let level = self.graph.identifier(id)?.level;

        let imp = self.graph.make_identifier('I', level);
        self.graph.identifier_mut(imp)?.is_impasse = true;
        self.collector
            .link_add(&mut self.graph, None, &Symbol::Id(imp))?;
        let s = self.graph.slot_mut(slot)?;
        s.impasse_id = Some(imp);
        s.impasse_type = impasse;

        let wk = self.graph.well_known().clone();
        self.add_impasse_wme(imp, wk.object.clone(), Symbol::Id(id), None)?;
        self.add_impasse_wme(imp, wk.attribute.clone(), attr.clone(), None)?;
        self.add_impasse_wme(imp, wk.impasse.clone(), impasse_symbol(&wk, impasse), None)?;
        self.add_impasse_wme(imp, wk.choices.clone(), wk.multiple.clone(), None)?;
        self.update_impasse_items(imp, candidates)?;
        self.stats.attribute_impasses_created += 1;
        tracing::debug!(
            impasse_id = %self.graph.name(imp),
            object = %self.graph.name(id),
            attribute = %attr,
            impasse = %impasse,
            "attribute impasse"
        );
        Ok(())
    }

    /// Drop the attribute impasse of an ordinary slot, if any.
    pub(crate) fn remove_attribute_impasse(&mut self, slot: SlotId, mode: LinkMode) -> DecideResult<()> {
        let s = self.graph.slot_mut(slot)?;
        s.impasse_type = ImpasseType::None;
        let Some(imp) = s.impasse_id.take() else {
            return Ok(());
        };
        if let Ok(ident) = self.graph.identifier_mut(imp) {
            let wmes = std::mem::take(&mut ident.impasse_wmes);
            for w in wmes {
                self.remove_wme_from_wm(w, mode)?;
            }
            self.collector
                .link_remove(&mut self.graph, None, &Symbol::Id(imp), mode)?;
        }
        self.mark_slot_for_possible_removal(slot)
    }
}
