//! Identifier graph: identifiers, slots, WMEs, preferences, instantiations.
//!
//! Every entry lives in a generational [`Arena`] and refers to the others by
//! handle. The graph itself never decides when something dies; freeing is
//! done by the engine's working-memory and garbage-collection paths, which
//! call the `remove_*` methods here once link counts say so.

pub mod identifier;
pub mod preference;
pub mod slot;
pub mod wme;

use std::collections::HashMap;

use crate::arena::{Arena, Handle};
use crate::error::{DecideResult, GraphError};
use crate::gds::GoalDependencySet;
use crate::symbol::{Symbol, WellKnown};

pub use identifier::{GoalInfo, GoalLevel, Identifier, LOWEST_POSSIBLE_GOAL_LEVEL, TOP_GOAL_LEVEL};
pub use preference::{
    ConditionWme, Instantiation, InstantiationSpec, Preference, PreferenceSpec, PreferenceType,
};
pub use slot::{ImpasseType, Slot};
pub use wme::{Wme, WmeKind, WmeRecord};

pub type IdentifierId = Handle<Identifier>;
pub type SlotId = Handle<Slot>;
pub type WmeId = Handle<Wme>;
pub type PrefId = Handle<Preference>;
pub type InstId = Handle<Instantiation>;
pub type GdsId = Handle<GoalDependencySet>;

/// Which edges a transitive closure follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// Input WMEs, slot WMEs, and preference values/referents.
    Promotion,
    /// Everything in [`Closure::Promotion`] plus attribute impasses and
    /// goal/impasse description WMEs.
    Reachability,
}

/// The object graph that preferences, WMEs, and goals live in.
#[derive(Default)]
pub struct IdentifierGraph {
    identifiers: Arena<Identifier>,
    slots: Arena<Slot>,
    wmes: Arena<Wme>,
    preferences: Arena<Preference>,
    instantiations: Arena<Instantiation>,
    gds: Arena<GoalDependencySet>,
    name_counters: HashMap<char, u64>,
    next_timetag: u64,
    well_known: WellKnown,
}

macro_rules! accessors {
    ($get:ident, $get_mut:ident, $try_get:ident, $field:ident, $handle:ty, $ty:ty, $kind:literal) => {
        pub fn $get(&self, handle: $handle) -> DecideResult<&$ty> {
            self.$field.get(handle).ok_or_else(|| stale($kind, handle))
        }

        pub fn $get_mut(&mut self, handle: $handle) -> DecideResult<&mut $ty> {
            self.$field
                .get_mut(handle)
                .ok_or_else(|| stale($kind, handle))
        }

        pub fn $try_get(&self, handle: $handle) -> Option<&$ty> {
            self.$field.get(handle)
        }
    };
}

fn stale<T>(kind: &'static str, handle: Handle<T>) -> crate::error::DecideError {
    GraphError::StaleHandle {
        kind,
        handle: handle.to_string(),
    }
    .into()
}

impl IdentifierGraph {
    pub fn new() -> Self {
        Self::default()
    }

    accessors!(identifier, identifier_mut, try_identifier, identifiers, IdentifierId, Identifier, "identifier");
    accessors!(slot, slot_mut, try_slot, slots, SlotId, Slot, "slot");
    accessors!(wme, wme_mut, try_wme, wmes, WmeId, Wme, "wme");
    accessors!(preference, preference_mut, try_preference, preferences, PrefId, Preference, "preference");
    accessors!(instantiation, instantiation_mut, try_instantiation, instantiations, InstId, Instantiation, "instantiation");
    accessors!(gds, gds_mut, try_gds, gds, GdsId, GoalDependencySet, "gds");

    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    /// Allocate a fresh identifier named `<letter><n>` at `level`.
    ///
    /// The identifier starts with no links; it must be linked before the next
    /// flush or the collector reclaims it.
    pub fn make_identifier(&mut self, letter: char, level: GoalLevel) -> IdentifierId {
        let letter = if letter.is_ascii_alphabetic() {
            letter.to_ascii_uppercase()
        } else {
            'I'
        };
        let counter = self.name_counters.entry(letter).or_insert(0);
        *counter += 1;
        self.identifiers.insert(Identifier::new(letter, *counter, level))
    }

    /// Allocate a goal identifier together with its operator context slot.
    pub fn make_goal(&mut self, level: GoalLevel, higher_goal: Option<IdentifierId>) -> DecideResult<IdentifierId> {
        let id = self.make_identifier('S', level);
        let slot = self
            .slots
            .insert(Slot::new(id, self.well_known.operator.clone(), true));
        let ident = self.identifier_mut(id)?;
        ident.slots.push(slot);
        ident.goal = Some(GoalInfo {
            higher_goal,
            lower_goal: None,
            operator_slot: slot,
            impasse_type: ImpasseType::None,
            attribute_of_impasse: None,
            gds: None,
            preferences_from_goal: Vec::new(),
            active: true,
        });
        Ok(id)
    }

    /// Operator slot of a goal.
    pub fn operator_slot(&self, goal: IdentifierId) -> DecideResult<SlotId> {
        self.goal_info(goal).map(|g| g.operator_slot)
    }

    pub fn goal_info(&self, goal: IdentifierId) -> DecideResult<&GoalInfo> {
        self.identifier(goal)?
            .goal
            .as_ref()
            .ok_or_else(|| GraphError::NotAGoal { id: self.name(goal) }.into())
    }

    pub fn goal_info_mut(&mut self, goal: IdentifierId) -> DecideResult<&mut GoalInfo> {
        let name = self.name(goal);
        self.identifier_mut(goal)?
            .goal
            .as_mut()
            .ok_or_else(|| GraphError::NotAGoal { id: name }.into())
    }

    pub fn find_slot(&self, id: IdentifierId, attr: &Symbol) -> Option<SlotId> {
        let ident = self.identifiers.get(id)?;
        ident
            .slots
            .iter()
            .copied()
            .find(|s| self.slots.get(*s).is_some_and(|slot| &slot.attr == attr))
    }

    /// Find the slot for `(id, attr)`, creating it if needed.
    pub fn make_slot(&mut self, id: IdentifierId, attr: &Symbol) -> DecideResult<SlotId> {
        if let Some(slot) = self.find_slot(id, attr) {
            return Ok(slot);
        }
        let is_context = self.identifier(id)?.is_goal() && attr == &self.well_known.operator;
        let slot = self.slots.insert(Slot::new(id, attr.clone(), is_context));
        self.identifier_mut(id)?.slots.push(slot);
        Ok(slot)
    }

    /// Allocate a WME with the next timetag. The caller attaches it.
    pub fn new_wme(
        &mut self,
        id: IdentifierId,
        attr: Symbol,
        value: Symbol,
        kind: WmeKind,
        preference: Option<PrefId>,
    ) -> WmeId {
        self.next_timetag += 1;
        self.wmes.insert(Wme {
            id,
            attr,
            value,
            kind,
            timetag: self.next_timetag,
            preference,
            gds: None,
        })
    }

    pub(crate) fn insert_preference(&mut self, pref: Preference) -> PrefId {
        self.preferences.insert(pref)
    }

    pub(crate) fn insert_instantiation(&mut self, inst: Instantiation) -> InstId {
        self.instantiations.insert(inst)
    }

    pub(crate) fn insert_gds(&mut self, gds: GoalDependencySet) -> GdsId {
        self.gds.insert(gds)
    }

    pub(crate) fn remove_identifier(&mut self, id: IdentifierId) -> Option<Identifier> {
        self.identifiers.remove(id)
    }

    pub(crate) fn remove_slot(&mut self, slot: SlotId) -> Option<Slot> {
        let removed = self.slots.remove(slot)?;
        if let Some(ident) = self.identifiers.get_mut(removed.id) {
            ident.slots.retain(|s| *s != slot);
        }
        Some(removed)
    }

    pub(crate) fn remove_wme(&mut self, wme: WmeId) -> Option<Wme> {
        self.wmes.remove(wme)
    }

    pub(crate) fn remove_preference(&mut self, pref: PrefId) -> Option<Preference> {
        self.preferences.remove(pref)
    }

    pub(crate) fn remove_instantiation(&mut self, inst: InstId) -> Option<Instantiation> {
        self.instantiations.remove(inst)
    }

    pub(crate) fn remove_gds(&mut self, gds: GdsId) -> Option<GoalDependencySet> {
        self.gds.remove(gds)
    }

    /// Printable name: `S1` for live identifiers, the handle otherwise.
    pub fn name(&self, id: IdentifierId) -> String {
        self.identifiers
            .get(id)
            .map(Identifier::name)
            .unwrap_or_else(|| id.to_string())
    }

    /// Printable form of a symbol, with identifiers by name.
    pub fn display(&self, sym: &Symbol) -> String {
        match sym {
            Symbol::Id(id) => self.name(*id),
            other => other.to_string(),
        }
    }

    /// Find a live identifier by its printed name.
    pub fn lookup_name(&self, name: &str) -> Option<IdentifierId> {
        self.identifiers
            .iter()
            .find(|(_, ident)| ident.name().eq_ignore_ascii_case(name))
            .map(|(h, _)| h)
    }

    /// Identifiers directly reachable from `id` along `closure` edges.
    pub fn children(&self, id: IdentifierId, closure: Closure) -> Vec<IdentifierId> {
        let Some(ident) = self.identifiers.get(id) else {
            return Vec::new();
        };
        let reach = closure == Closure::Reachability;
        let wme_value = |w: &WmeId| self.wmes.get(*w).map(|wme| &wme.value);

        let mut out = Vec::new();
        let mut values: Vec<&Symbol> = ident.input_wmes.iter().filter_map(wme_value).collect();
        if reach {
            values.extend(ident.impasse_wmes.iter().filter_map(wme_value));
        }
        for slot_id in &ident.slots {
            let Some(slot) = self.slots.get(*slot_id) else {
                continue;
            };
            if reach {
                out.extend(slot.impasse_id);
            }
            for p in slot.all_preferences() {
                if let Some(pref) = self.preferences.get(p) {
                    values.push(&pref.value);
                    if pref.kind.is_binary() {
                        values.extend(pref.referent.as_ref());
                    }
                }
            }
            values.extend(slot.wmes.iter().filter_map(wme_value));
        }
        out.extend(values.into_iter().filter_map(Symbol::as_id));
        out
    }

    pub fn identifiers(&self) -> impl Iterator<Item = (IdentifierId, &Identifier)> {
        self.identifiers.iter()
    }

    pub fn wmes(&self) -> impl Iterator<Item = (WmeId, &Wme)> {
        self.wmes.iter()
    }

    pub fn preferences(&self) -> impl Iterator<Item = (PrefId, &Preference)> {
        self.preferences.iter()
    }

    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &Slot)> {
        self.slots.iter()
    }

    pub fn identifier_count(&self) -> usize {
        self.identifiers.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn wme_count(&self) -> usize {
        self.wmes.len()
    }

    pub fn preference_count(&self) -> usize {
        self.preferences.len()
    }

    pub fn instantiation_count(&self) -> usize {
        self.instantiations.len()
    }
}
