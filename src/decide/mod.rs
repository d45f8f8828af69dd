//! Context decision procedure.
//!
//! Walks the goal stack from the highest goal whose context changed (or the
//! bottom goal) and decides each operator slot that is decidable. A winner
//! replaces everything below its goal and ends the pass; an impasse either
//! refreshes the existing sub-goal's items or replaces it with a new one.

mod acceptable;
mod impasse;
mod slots;

use crate::engine::{DecisionOutcome, Engine};
use crate::error::{DecideResult, DecisionError};
use crate::gc::LinkMode;
use crate::graph::{IdentifierId, ImpasseType, PrefId, PreferenceType, SlotId, WmeKind};
use crate::resolve::{self, ResolveContext, ResolveMode};

impl Engine {
    pub(crate) fn decide_context_slots(&mut self) -> DecideResult<DecisionOutcome> {
        let start = self
            .highest_goal_whose_context_changed
            .filter(|g| self.graph.try_identifier(*g).is_some_and(|i| i.is_active_goal()))
            .or(self.bottom_goal);
        let Some(mut goal) = start else {
            return Ok(DecisionOutcome::Unchanged);
        };

        let outcome = loop {
            let lower = self.graph.goal_info(goal)?.lower_goal;
            if let Some(outcome) = self.decide_context_slot(goal, lower.is_none())? {
                break outcome;
            }
            match lower {
                Some(next) => goal = next,
                None => break DecisionOutcome::Unchanged,
            }
        };
        self.highest_goal_whose_context_changed = None;
        Ok(outcome)
    }

    /// Whether the slot needs a new decision.
    fn context_slot_is_decidable(&self, slot: SlotId) -> DecideResult<bool> {
        let s = self.graph.slot(slot)?;
        let Some(w) = s.wmes.first() else {
            return Ok(s.changed);
        };
        let value = &self.graph.wme(*w)?.value;
        let names_value = |kind: PreferenceType| {
            s.preferences(kind)
                .iter()
                .filter_map(|p| self.graph.try_preference(*p))
                .any(|p| &p.value == value)
        };
        let reconsidered = names_value(PreferenceType::Reconsider);
        let supported = names_value(PreferenceType::Acceptable) || names_value(PreferenceType::Require);
        Ok(reconsidered || !supported)
    }

    /// Decide the operator slot of `goal`. `None` means keep walking down.
    fn decide_context_slot(
        &mut self,
        goal: IdentifierId,
        is_last: bool,
    ) -> DecideResult<Option<DecisionOutcome>> {
        let slot = self.graph.operator_slot(goal)?;

        let (mut impasse, candidates, forced) = if self.context_slot_is_decidable(slot)? {
            let forced = self.forced_selection.take();
            let mut ctx = ResolveContext {
                mode: ResolveMode::Commit,
                numeric_mode: self.config.numeric_indifferent_mode,
                default_numeric_value: self.config.default_numeric_value,
                selector: self.selector.as_mut(),
                forced: forced.as_ref(),
            };
            let res = resolve::run_preference_semantics(&self.graph, slot, &mut ctx)?;
            if res.tabulate_reward {
                self.reinforcement.tabulate_reward(goal);
            }
            let old = std::mem::take(&mut self.graph.slot_mut(slot)?.wmes);
            for w in old {
                self.remove_wme_from_wm(w, LinkMode::Normal)?;
            }
            (res.impasse, res.candidates, res.forced)
        } else if is_last {
            (ImpasseType::NoChange, Vec::new(), false)
        } else {
            self.graph.slot_mut(slot)?.changed = false;
            return Ok(None);
        };
        self.graph.slot_mut(slot)?.changed = false;

        if impasse == ImpasseType::None {
            match candidates.as_slice() {
                [] => impasse = ImpasseType::NoChange,
                [winner] => return self.install_context_winner(goal, slot, *winner, forced).map(Some),
                many => {
                    return Err(DecisionError::MultipleContextWinners {
                        goal: self.graph.name(goal),
                        count: many.len(),
                    }
                    .into());
                }
            }
        }

        let wk = self.graph.well_known();
        let attribute = if impasse == ImpasseType::NoChange && self.graph.slot(slot)?.wmes.is_empty() {
            wk.state.clone()
        } else {
            wk.operator.clone()
        };

        let lower = self.graph.goal_info(goal)?.lower_goal;
        if let Some(lower) = lower {
            let same = self.graph.slot(slot)?.impasse_type == impasse
                && self.graph.goal_info(lower)?.attribute_of_impasse.as_ref() == Some(&attribute);
            if same {
                self.update_impasse_items(lower, &candidates)?;
                return Ok(None);
            }
            self.remove_existing_context_and_descendents(lower)?;
        }

        let new_goal = self.create_new_context(goal, attribute.clone(), impasse)?;
        self.update_impasse_items(new_goal, &candidates)?;
        self.graph.slot_mut(slot)?.impasse_type = impasse;
        tracing::debug!(
            goal = %self.graph.name(new_goal),
            supergoal = %self.graph.name(goal),
            impasse = %impasse,
            attribute = %attribute,
            items = candidates.len(),
            "impasse"
        );
        Ok(Some(DecisionOutcome::Impasse {
            goal: new_goal,
            supergoal: goal,
            impasse,
            attribute,
        }))
    }

    fn install_context_winner(
        &mut self,
        goal: IdentifierId,
        slot: SlotId,
        winner: PrefId,
        forced: bool,
    ) -> DecideResult<DecisionOutcome> {
        if let Some(lower) = self.graph.goal_info(goal)?.lower_goal {
            self.remove_existing_context_and_descendents(lower)?;
        }
        let value = self.graph.preference(winner)?.value.clone();
        let attr = self.graph.well_known().operator.clone();
        let w = self.make_wme(goal, attr, value.clone(), WmeKind::Slot, Some(winner))?;
        let s = self.graph.slot_mut(slot)?;
        s.wmes.push(w);
        s.impasse_type = ImpasseType::None;
        self.add_wme_to_wm(w)?;

        self.reinforcement.store_decision(goal, &value);
        self.stats.decisions += 1;
        tracing::debug!(
            goal = %self.graph.name(goal),
            operator = %self.graph.display(&value),
            forced,
            "operator selected"
        );
        Ok(DecisionOutcome::Selected { goal, value, forced })
    }
}
