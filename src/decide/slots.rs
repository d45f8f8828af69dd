//! Ordinary (non-context) slot decisions.

use crate::engine::Engine;
use crate::error::DecideResult;
use crate::gc::LinkMode;
use crate::graph::{ImpasseType, PrefId, SlotId, WmeKind};
use crate::resolve::{self, ResolveContext, ResolveMode};
use crate::symbol::Symbol;

impl Engine {
    /// Settle every ordinary slot whose preferences changed.
    pub(crate) fn decide_non_context_slots(&mut self) -> DecideResult<()> {
        for slot in std::mem::take(&mut self.changed_slots) {
            let Ok(s) = self.graph.slot_mut(slot) else {
                continue;
            };
            s.changed = false;
            if s.is_context_slot {
                continue;
            }
            self.decide_non_context_slot(slot)?;
        }
        Ok(())
    }

    fn decide_non_context_slot(&mut self, slot: SlotId) -> DecideResult<()> {
        let mut ctx = ResolveContext {
            mode: ResolveMode::Commit,
            numeric_mode: self.config.numeric_indifferent_mode,
            default_numeric_value: self.config.default_numeric_value,
            selector: self.selector.as_mut(),
            forced: None,
        };
        let res = resolve::run_preference_semantics(&self.graph, slot, &mut ctx)?;

        let current = self.graph.slot(slot)?.impasse_type;
        if self.config.attribute_impasses {
            if res.impasse != current {
                if current != ImpasseType::None {
                    self.remove_attribute_impasse(slot, LinkMode::Normal)?;
                }
                if res.impasse != ImpasseType::None {
                    self.create_attribute_impasse(slot, res.impasse, &res.candidates)?;
                }
            } else if let Some(imp) = self.graph.slot(slot)?.impasse_id {
                self.update_impasse_items(imp, &res.candidates)?;
            }
        }

        // A slot in impasse installs nothing.
        let winners: &[PrefId] = if res.impasse == ImpasseType::None {
            &res.candidates
        } else {
            &[]
        };
        let mut desired: Vec<(Symbol, PrefId)> = Vec::new();
        for p in winners {
            let value = &self.graph.preference(*p)?.value;
            if !desired.iter().any(|(v, _)| v == value) {
                desired.push((value.clone(), *p));
            }
        }

        let s = self.graph.slot(slot)?;
        let (id, attr) = (s.id, s.attr.clone());
        let mut kept = Vec::new();
        let mut stale = Vec::new();
        let mut swaps = Vec::new();
        for w in s.wmes.clone() {
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

        // A kept WME is re-justified by the candidate that still supports it.
        for (w, p) in swaps {
            self.preference_add_ref(p)?;
            let old = self.graph.wme_mut(w)?.preference.replace(p);
            if let Some(old) = old {
                self.preference_remove_ref(old)?;
            }
            if self.graph.preference(p)?.o_supported {
                self.maybe_elaborate_gds(w, p)?;
            }
        }
        self.graph.slot_mut(slot)?.wmes = kept;
        for w in stale {
            self.remove_wme_from_wm(w, LinkMode::Normal)?;
        }

        for (value, p) in desired {
            let w = self.make_wme(id, attr.clone(), value, WmeKind::Slot, Some(p))?;
            self.graph.slot_mut(slot)?.wmes.push(w);
            self.add_wme_to_wm(w)?;
            if self.graph.preference(p)?.o_supported {
                self.maybe_elaborate_gds(w, p)?;
            }
        }

        if self.graph.slot(slot)?.is_empty() {
            self.mark_slot_for_possible_removal(slot)?;
        }
        Ok(())
    }
}
