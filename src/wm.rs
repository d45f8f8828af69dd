//! Working-memory and temporary-memory bookkeeping.
//!
//! Everything that attaches or detaches a WME or preference goes through
//! here so that link counts, slot change flags, and the matcher buffer stay
//! consistent. [`Engine::do_buffered_wm_and_ownership_changes`] is the single
//! flush point.

use std::collections::HashSet;

use crate::engine::Engine;
use crate::error::DecideResult;
use crate::gc::LinkMode;
use crate::graph::{IdentifierId, PrefId, PreferenceType, SlotId, WmeId, WmeKind};
use crate::symbol::Symbol;

impl Engine {
    /// Allocate a WME, taking a reference on its justifying preference.
    pub(crate) fn make_wme(
        &mut self,
        id: IdentifierId,
        attr: Symbol,
        value: Symbol,
        kind: WmeKind,
        preference: Option<PrefId>,
    ) -> DecideResult<WmeId> {
        if let Some(p) = preference {
            self.preference_add_ref(p)?;
        }
        Ok(self.graph.new_wme(id, attr, value, kind, preference))
    }

    /// Count the WME's link and buffer the matcher notification. The caller
    /// has already attached it to its owner.
    pub(crate) fn add_wme_to_wm(&mut self, w: WmeId) -> DecideResult<()> {
        let wme = self.graph.wme(w)?;
        let (id, value) = (wme.id, wme.value.clone());
        self.collector.link_add(&mut self.graph, Some(id), &value)?;
        self.wm.added.push(w);
        Ok(())
    }

    /// Release the WME's link and buffer its removal. The caller has already
    /// detached it from its owner.
    pub(crate) fn remove_wme_from_wm(&mut self, w: WmeId, mode: LinkMode) -> DecideResult<()> {
        let wme = self.graph.wme_mut(w)?;
        let (id, value) = (wme.id, wme.value.clone());
        let gds = wme.gds.take();
        self.collector
            .link_remove(&mut self.graph, Some(id), &value, mode)?;

        if let Some(gds) = gds {
            if let Some(set) = self.graph.try_gds(gds) {
                let goal = set.goal;
                if let Ok(set) = self.graph.gds_mut(gds) {
                    set.wmes.retain(|x| *x != w);
                }
                if let Some(goal) = goal {
                    self.note_gds_violation(goal, w);
                }
            }
        }
        self.wm.removed.push(w);
        Ok(())
    }

    pub(crate) fn preference_add_ref(&mut self, p: PrefId) -> DecideResult<()> {
        self.graph.preference_mut(p)?.reference_count += 1;
        Ok(())
    }

    /// Drop one reference; the last one frees the preference and, once it is
    /// retracted and empty, its instantiation.
    pub(crate) fn preference_remove_ref(&mut self, p: PrefId) -> DecideResult<()> {
        let pref = self.graph.preference_mut(p)?;
        pref.reference_count = pref.reference_count.saturating_sub(1);
        if pref.reference_count > 0 {
            return Ok(());
        }
        let inst = pref.inst;
        self.graph.remove_preference(p);
        if let Some(inst) = inst {
            if let Ok(record) = self.graph.instantiation_mut(inst) {
                record.preferences.retain(|x| *x != p);
                if record.preferences.is_empty() && !record.in_ms {
                    self.graph.remove_instantiation(inst);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn mark_slot_as_changed(&mut self, slot: SlotId) -> DecideResult<()> {
        let s = self.graph.slot_mut(slot)?;
        if s.is_context_slot {
            s.changed = true;
            let goal = s.id;
            let level = self.graph.identifier(goal)?.level;
            let higher = self
                .highest_goal_whose_context_changed
                .and_then(|h| self.graph.try_identifier(h))
                .is_none_or(|h| !h.is_active_goal() || level < h.level);
            if higher {
                self.highest_goal_whose_context_changed = Some(goal);
            }
        } else if !s.changed {
            s.changed = true;
            self.changed_slots.push(slot);
        }
        Ok(())
    }

    pub(crate) fn mark_slot_for_possible_removal(&mut self, slot: SlotId) -> DecideResult<()> {
        let s = self.graph.slot_mut(slot)?;
        if !s.marked_for_possible_removal {
            s.marked_for_possible_removal = true;
            self.slots_for_removal.push(slot);
        }
        Ok(())
    }

    fn mark_acceptable_changed(&mut self, slot: SlotId, kind: PreferenceType) -> DecideResult<()> {
        if !matches!(kind, PreferenceType::Acceptable | PreferenceType::Require) {
            return Ok(());
        }
        let s = self.graph.slot_mut(slot)?;
        if s.is_context_slot && !s.acceptable_preference_changed {
            s.acceptable_preference_changed = true;
            self.acceptable_changed.push(slot);
        }
        Ok(())
    }

    /// Put a preference into its slot in temporary memory.
    pub(crate) fn add_preference_to_tm(&mut self, p: PrefId) -> DecideResult<()> {
        let pref = self.graph.preference(p)?;
        let (id, attr, kind) = (pref.id, pref.attr.clone(), pref.kind);
        let value = pref.value.clone();
        let referent = pref.referent.clone().filter(|_| kind.is_binary());
        let owner = pref.owner_goal;
        self.check_linkable(&value)?;
        if let Some(referent) = &referent {
            self.check_linkable(referent)?;
        }

        let slot = self.graph.make_slot(id, &attr)?;
        let s = self.graph.slot_mut(slot)?;
        s.preferences_mut(kind).push(p);
        s.marked_for_possible_removal = false;
        let pref = self.graph.preference_mut(p)?;
        pref.slot = Some(slot);
        pref.in_tm = true;
        self.preference_add_ref(p)?;

        self.mark_slot_as_changed(slot)?;
        self.mark_acceptable_changed(slot, kind)?;

        self.collector.link_add(&mut self.graph, Some(id), &value)?;
        if let Some(referent) = &referent {
            self.collector.link_add(&mut self.graph, Some(id), referent)?;
        }
        if let Some(owner) = owner {
            if let Ok(info) = self.graph.goal_info_mut(owner) {
                info.preferences_from_goal.push(p);
            }
        }
        Ok(())
    }

    /// Take a preference out of temporary memory.
    pub(crate) fn remove_preference_from_tm(&mut self, p: PrefId, mode: LinkMode) -> DecideResult<()> {
        let pref = self.graph.preference_mut(p)?;
        if !pref.in_tm {
            return Ok(());
        }
        pref.in_tm = false;
        let slot = pref.slot.take();
        let (id, kind, owner) = (pref.id, pref.kind, pref.owner_goal);
        let value = pref.value.clone();
        let referent = pref.referent.clone().filter(|_| kind.is_binary());

        if let Some(slot) = slot {
            if let Ok(s) = self.graph.slot_mut(slot) {
                s.preferences_mut(kind).retain(|x| *x != p);
                let empty = s.is_empty();
                self.mark_slot_as_changed(slot)?;
                self.mark_acceptable_changed(slot, kind)?;
                if empty {
                    self.mark_slot_for_possible_removal(slot)?;
                }
            }
        }
        if let Some(owner) = owner {
            if let Ok(info) = self.graph.goal_info_mut(owner) {
                info.preferences_from_goal.retain(|x| *x != p);
            }
        }

        self.collector
            .link_remove(&mut self.graph, Some(id), &value, mode)?;
        if let Some(referent) = &referent {
            self.collector
                .link_remove(&mut self.graph, Some(id), referent, mode)?;
        }
        self.preference_remove_ref(p)
    }

    /// Tear down everything hanging off a disconnected identifier.
    pub(crate) fn garbage_collect_id(&mut self, id: IdentifierId, mode: LinkMode) -> DecideResult<()> {
        if !self.collector.claim(id) {
            return Ok(());
        }
        let Some(ident) = self.graph.try_identifier(id) else {
            return Ok(());
        };
        tracing::trace!(id = %ident.name(), "collecting identifier");
        let slots = ident.slots.clone();

        let inputs = std::mem::take(&mut self.graph.identifier_mut(id)?.input_wmes);
        for w in inputs {
            self.remove_wme_from_wm(w, mode)?;
        }
        for slot in slots {
            if self.graph.try_slot(slot).is_none() {
                continue;
            }
            if self.graph.slot(slot)?.impasse_id.is_some() {
                self.remove_attribute_impasse(slot, mode)?;
            }
            let s = self.graph.slot_mut(slot)?;
            let wmes = std::mem::take(&mut s.wmes);
            let acceptable = std::mem::take(&mut s.acceptable_preference_wmes);
            let prefs = s.all_preferences();
            for w in wmes.into_iter().chain(acceptable) {
                self.remove_wme_from_wm(w, mode)?;
            }
            for p in prefs {
                self.remove_preference_from_tm(p, mode)?;
            }
            self.mark_slot_for_possible_removal(slot)?;
        }
        let impasse_wmes = std::mem::take(&mut self.graph.identifier_mut(id)?.impasse_wmes);
        for w in impasse_wmes {
            self.remove_wme_from_wm(w, mode)?;
        }
        Ok(())
    }

    fn collect_disconnected(&mut self, mode: LinkMode) -> DecideResult<()> {
        while let Some(id) = self.collector.pop_disconnected() {
            self.garbage_collect_id(id, mode)?;
        }
        Ok(())
    }

    /// Reclaim disconnected identifiers and settle levels that may have
    /// dropped.
    pub(crate) fn do_demotion(&mut self) -> DecideResult<()> {
        self.collector.take_zero_count_unknowns(&self.graph);
        self.collect_disconnected(LinkMode::CollectingDisconnected)?;

        if self.collector.has_unknown() {
            let goals = self.goal_stack();
            let orphans = self.collector.settle_unknown_levels(&mut self.graph, &goals);
            if !orphans.is_empty() {
                tracing::debug!(count = orphans.len(), "collecting unreachable identifiers");
            }
            for id in orphans {
                self.garbage_collect_id(id, LinkMode::JustCount)?;
            }
            self.collect_disconnected(LinkMode::JustCount)?;
        }

        for id in self.collector.take_reclaimed() {
            self.free_identifier(id);
        }
        Ok(())
    }

    fn free_identifier(&mut self, id: IdentifierId) {
        let Some(ident) = self.graph.remove_identifier(id) else {
            return;
        };
        for slot in ident.slots {
            self.graph.remove_slot(slot);
        }
        if let Some(gds) = ident.goal.and_then(|g| g.gds) {
            self.release_gds(gds);
        }
    }

    /// Hand buffered WME changes to the matcher and free removed WMEs.
    fn do_buffered_wm_changes(&mut self) -> DecideResult<()> {
        let added = std::mem::take(&mut self.wm.added);
        let removed = std::mem::take(&mut self.wm.removed);
        let added_set: HashSet<WmeId> = added.iter().copied().collect();
        let removed_set: HashSet<WmeId> = removed.iter().copied().collect();

        for w in &added {
            if removed_set.contains(w) {
                continue;
            }
            if let Some(wme) = self.graph.try_wme(*w) {
                self.matcher.add_wme(&wme.record());
            }
        }
        for w in &removed {
            if added_set.contains(w) {
                continue;
            }
            if let Some(wme) = self.graph.try_wme(*w) {
                self.matcher.remove_wme(&wme.record());
            }
        }
        for w in removed {
            let Some(wme) = self.graph.remove_wme(w) else {
                continue;
            };
            if let Some(p) = wme.preference {
                if self.graph.try_preference(p).is_some() {
                    self.preference_remove_ref(p)?;
                }
            }
        }
        Ok(())
    }

    fn remove_garbage_slots(&mut self) {
        for slot in std::mem::take(&mut self.slots_for_removal) {
            let Ok(s) = self.graph.slot_mut(slot) else {
                continue;
            };
            s.marked_for_possible_removal = false;
            if s.is_context_slot || !s.is_empty() {
                continue;
            }
            self.graph.remove_slot(slot);
        }
    }

    /// Flush every buffered change, in order: GDS retractions, acceptable
    /// preference WMEs, promotion, demotion, matcher notification, slot
    /// cleanup.
    pub fn do_buffered_wm_and_ownership_changes(&mut self) -> DecideResult<()> {
        self.ensure_running()?;
        let result = self.flush();
        self.guard(result)
    }

    fn flush(&mut self) -> DecideResult<()> {
        self.stats.flushes += 1;
        loop {
            self.process_gds_violations()?;
            self.do_buffered_acceptable_preference_wme_changes()?;
            self.collector.do_promotion(&mut self.graph)?;
            self.do_demotion()?;
            if self.gds_violations.is_empty() {
                break;
            }
        }
        self.do_buffered_wm_changes()?;
        self.remove_garbage_slots();
        Ok(())
    }
}
