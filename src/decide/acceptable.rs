//! Acceptable-preference WMEs (`(S1 ^operator O1 +)`) for context slots.

use crate::engine::Engine;
use crate::error::{DecideResult, DecisionError};
use crate::gc::LinkMode;
use crate::graph::{PrefId, PreferenceType, SlotId, WmeId, WmeKind};
use crate::symbol::Symbol;

impl Engine {
    pub(crate) fn do_buffered_acceptable_preference_wme_changes(&mut self) -> DecideResult<()> {
        for slot in std::mem::take(&mut self.acceptable_changed) {
            let Ok(s) = self.graph.slot_mut(slot) else {
                continue;
            };
            s.acceptable_preference_changed = false;
            self.sync_acceptable_preference_wmes(slot)?;
        }
        Ok(())
    }

    /// One WME per distinct require/acceptable value, each pointing at a
    /// preference that still supports it.
    fn sync_acceptable_preference_wmes(&mut self, slot: SlotId) -> DecideResult<()> {
        let s = self.graph.slot(slot)?;
        let (id, attr) = (s.id, s.attr.clone());
        let mut desired: Vec<(Symbol, PrefId)> = Vec::new();
        for kind in [PreferenceType::Require, PreferenceType::Acceptable] {
            for p in s.preferences(kind) {
                let value = &self.graph.preference(*p)?.value;
                if !desired.iter().any(|(v, _)| v == value) {
                    desired.push((value.clone(), *p));
                }
            }
        }

        let mut kept = Vec::new();
        let mut stale = Vec::new();
        let mut swaps = Vec::new();
        for w in s.acceptable_preference_wmes.clone() {
            let wme = self.graph.wme(w)?;
            match desired.iter().position(|(v, _)| v == &wme.value) {
                Some(i) => {
                    let (_, p) = desired.remove(i);
                    if wme.preference != Some(p) {
                        swaps.push((w, p));
                    }
                    kept.push(w);
                }
                None => stale.push(w),
            }
        }

        for (w, p) in swaps {
            self.preference_add_ref(p)?;
            let old = self.graph.wme_mut(w)?.preference.replace(p);
            if let Some(old) = old {
                self.preference_remove_ref(old)?;
            }
        }
        self.graph.slot_mut(slot)?.acceptable_preference_wmes = kept;
        for w in stale {
            self.remove_wme_from_wm(w, LinkMode::Normal)?;
        }
        for (value, p) in desired {
            let w = self.make_wme(id, attr.clone(), value, WmeKind::AcceptablePreference, Some(p))?;
            self.graph.slot_mut(slot)?.acceptable_preference_wmes.push(w);
            self.add_wme_to_wm(w)?;
        }
        Ok(())
    }

    /// The acceptable-preference WME backing `value` in a context slot.
    ///
    /// After a flush every acceptable or require value has one; a missing
    /// WME means the graph is corrupt and halts the engine.
    pub fn acceptable_preference_wme(&mut self, slot: SlotId, value: &Symbol) -> DecideResult<WmeId> {
        let s = self.graph.slot(slot)?;
        let found = s
            .acceptable_preference_wmes
            .iter()
            .copied()
            .find(|w| self.graph.try_wme(*w).is_some_and(|wme| &wme.value == value));
        let result: DecideResult<WmeId> = found.ok_or_else(|| {
            DecisionError::MissingAcceptableWme {
                slot: format!("({} ^{})", self.graph.name(s.id), s.attr),
                value: self.graph.display(value),
            }
            .into()
        });
        self.guard(result)
    }
}
