//! Engine facade: top-level API for the decision kernel.
//!
//! The `Engine` owns the identifier graph, the collector, and the
//! collaborator hooks. Callers drive it phase by phase: the matcher adds and
//! retracts instantiations, [`Engine::run_wm_phase`] settles ordinary slots,
//! and [`Engine::run_decision_phase`] walks the goal stack. Every phase ends
//! with [`Engine::do_buffered_wm_and_ownership_changes`].
//!
//! Fatal errors (see [`DecideError::is_fatal`]) halt the engine; every later
//! call fails with [`DecisionError::Halted`] until [`Engine::reinitialize`].

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{DecideResult, DecisionError, GraphError};
use crate::explore::{Exploration, Selector};
use crate::gc::{Collector, LinkMode};
use crate::graph::{
    GoalLevel, IdentifierGraph, IdentifierId, ImpasseType, InstId, Instantiation,
    InstantiationSpec, ConditionWme, PrefId, Preference, SlotId, WmeId, WmeKind, TOP_GOAL_LEVEL,
};
use crate::hooks::{Matcher, NullMatcher, NullReinforcement, ReinforcementSink};
use crate::resolve::{self, Resolution, ResolveContext, ResolveMode};
use crate::symbol::Symbol;

/// Result of one pass over the context stack.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    /// A value was installed in the operator slot of `goal`.
    Selected {
        goal: IdentifierId,
        value: Symbol,
        forced: bool,
    },
    /// A new sub-goal was created below `supergoal`.
    Impasse {
        goal: IdentifierId,
        supergoal: IdentifierId,
        impasse: ImpasseType,
        attribute: Symbol,
    },
    /// Nothing changed: existing impasses were refreshed at most.
    Unchanged,
}

/// Counters describing what the engine has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub decision_phases: u64,
    pub decisions: u64,
    pub impasses_created: u64,
    pub attribute_impasses_created: u64,
    pub goals_removed: u64,
    pub gds_violations: u64,
    pub flushes: u64,
    pub promotions: u64,
    pub demotion_passes: u64,
    pub identifiers_reclaimed: u64,
    pub live_identifiers: usize,
    pub live_wmes: usize,
    pub live_preferences: usize,
}

/// Working-memory changes waiting for the next flush.
#[derive(Debug, Default)]
pub(crate) struct WmBuffer {
    pub(crate) added: Vec<WmeId>,
    pub(crate) removed: Vec<WmeId>,
}

/// The decision kernel.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) graph: IdentifierGraph,
    pub(crate) collector: Collector,
    pub(crate) wm: WmBuffer,
    pub(crate) top_goal: Option<IdentifierId>,
    pub(crate) bottom_goal: Option<IdentifierId>,
    pub(crate) highest_goal_whose_context_changed: Option<IdentifierId>,
    pub(crate) changed_slots: Vec<SlotId>,
    pub(crate) acceptable_changed: Vec<SlotId>,
    pub(crate) slots_for_removal: Vec<SlotId>,
    pub(crate) gds_violations: Vec<IdentifierId>,
    pub(crate) selector: Box<dyn Selector>,
    pub(crate) reinforcement: Box<dyn ReinforcementSink>,
    pub(crate) matcher: Box<dyn Matcher>,
    pub(crate) forced_selection: Option<Symbol>,
    pub(crate) halted: bool,
    pub(crate) stats: EngineStats,
}

impl Engine {
    /// Create a new engine with the given configuration.
    pub fn new(config: EngineConfig) -> DecideResult<Self> {
        config.validate()?;
        tracing::info!(
            policy = %config.exploration.policy,
            max_goal_depth = config.max_goal_depth,
            attribute_impasses = config.attribute_impasses,
            gds = config.gds,
            "initializing decision engine"
        );
        let selector = Box::new(Exploration::new(&config.exploration));
        Ok(Self {
            config,
            graph: IdentifierGraph::new(),
            collector: Collector::new(),
            wm: WmBuffer::default(),
            top_goal: None,
            bottom_goal: None,
            highest_goal_whose_context_changed: None,
            changed_slots: Vec::new(),
            acceptable_changed: Vec::new(),
            slots_for_removal: Vec::new(),
            gds_violations: Vec::new(),
            selector,
            reinforcement: Box::new(NullReinforcement),
            matcher: Box::new(NullMatcher),
            forced_selection: None,
            halted: false,
            stats: EngineStats::default(),
        })
    }

    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_reinforcement(mut self, sink: impl ReinforcementSink + 'static) -> Self {
        self.reinforcement = Box::new(sink);
        self
    }

    pub fn with_selector(mut self, selector: impl Selector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only view of the identifier graph.
    pub fn graph(&self) -> &IdentifierGraph {
        &self.graph
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn top_goal(&self) -> Option<IdentifierId> {
        self.top_goal
    }

    pub fn bottom_goal(&self) -> Option<IdentifierId> {
        self.bottom_goal
    }

    /// Goals from the top down.
    pub fn goal_stack(&self) -> Vec<IdentifierId> {
        let mut goals = Vec::new();
        let mut next = self.top_goal;
        while let Some(goal) = next {
            goals.push(goal);
            next = self.graph.goal_info(goal).ok().and_then(|g| g.lower_goal);
        }
        goals
    }

    /// Active goal at `level`, if the stack is that deep.
    pub fn goal_at_level(&self, level: GoalLevel) -> Option<IdentifierId> {
        self.goal_stack()
            .into_iter()
            .find(|g| self.graph.try_identifier(*g).is_some_and(|i| i.level == level))
    }

    pub fn stats(&self) -> EngineStats {
        let gc = self.collector.stats();
        EngineStats {
            promotions: gc.promotions,
            demotion_passes: gc.demotion_passes,
            identifiers_reclaimed: gc.identifiers_reclaimed,
            live_identifiers: self.graph.identifier_count(),
            live_wmes: self.graph.wme_count(),
            live_preferences: self.graph.preference_count(),
            ..self.stats
        }
    }

    pub(crate) fn ensure_running(&self) -> DecideResult<()> {
        if self.halted {
            return Err(DecisionError::Halted.into());
        }
        Ok(())
    }

    /// Halt on fatal errors, pass everything through.
    pub(crate) fn guard<T>(&mut self, result: DecideResult<T>) -> DecideResult<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                self.halted = true;
                tracing::error!(error = %e, "internal invariant violated; agent halted");
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Goal stack
    // -----------------------------------------------------------------------

    /// Create the top goal (`S1`) if it does not exist yet.
    pub fn create_top_goal(&mut self) -> DecideResult<IdentifierId> {
        self.ensure_running()?;
        if let Some(top) = self.top_goal {
            return Ok(top);
        }
        let result = self.create_top_goal_inner();
        let top = self.guard(result)?;
        self.do_buffered_wm_and_ownership_changes()?;
        Ok(top)
    }

    fn create_top_goal_inner(&mut self) -> DecideResult<IdentifierId> {
        let goal = self.graph.make_goal(TOP_GOAL_LEVEL, None)?;
        self.collector.link_add(&mut self.graph, None, &Symbol::Id(goal))?;
        self.top_goal = Some(goal);
        self.bottom_goal = Some(goal);
        self.highest_goal_whose_context_changed = Some(goal);

        let wk = self.graph.well_known().clone();
        self.add_impasse_wme(goal, wk.superstate, wk.nil, None)?;
        self.add_impasse_wme(goal, wk.type_, wk.state, None)?;
        tracing::debug!(goal = %self.graph.name(goal), "created top goal");
        Ok(goal)
    }

    /// Pop every goal, top included, and flush.
    pub fn clear_goal_stack(&mut self) -> DecideResult<()> {
        self.ensure_running()?;
        let Some(top) = self.top_goal else {
            return Ok(());
        };
        let result = self.remove_existing_context_and_descendents(top);
        self.guard(result)?;
        self.highest_goal_whose_context_changed = None;
        self.do_buffered_wm_and_ownership_changes()
    }

    /// Drop all state and clear the halted flag.
    pub fn reinitialize(&mut self) {
        tracing::info!("reinitializing decision engine");
        self.graph = IdentifierGraph::new();
        self.collector.reset();
        self.wm = WmBuffer::default();
        self.top_goal = None;
        self.bottom_goal = None;
        self.highest_goal_whose_context_changed = None;
        self.changed_slots.clear();
        self.acceptable_changed.clear();
        self.slots_for_removal.clear();
        self.gds_violations.clear();
        self.forced_selection = None;
        self.halted = false;
        self.stats = EngineStats::default();
    }

    // -----------------------------------------------------------------------
    // Input from the I/O driver and the matcher
    // -----------------------------------------------------------------------

    /// Allocate a new identifier. Link it (input WME or preference) before
    /// the next flush or it is reclaimed.
    pub fn make_identifier(&mut self, letter: char, level: GoalLevel) -> IdentifierId {
        let id = self.graph.make_identifier(letter, level);
        self.collector.note_new_identifier(id);
        id
    }

    /// An identifier-valued symbol must name a live identifier before
    /// anything links to it.
    pub(crate) fn check_linkable(&self, sym: &Symbol) -> DecideResult<()> {
        if let Some(id) = sym.as_id() {
            self.graph.identifier(id)?;
        }
        Ok(())
    }

    /// Add an input WME `(id ^attr value)`.
    pub fn add_input_wme(
        &mut self,
        id: IdentifierId,
        attr: impl Into<Symbol>,
        value: impl Into<Symbol>,
    ) -> DecideResult<WmeId> {
        self.ensure_running()?;
        self.graph.identifier(id)?;
        let value = value.into();
        self.check_linkable(&value)?;
        let w = self.graph.new_wme(id, attr.into(), value, WmeKind::Input, None);
        self.graph.identifier_mut(id)?.input_wmes.push(w);
        let result = self.add_wme_to_wm(w);
        self.guard(result)?;
        Ok(w)
    }

    pub fn remove_input_wme(&mut self, w: WmeId) -> DecideResult<()> {
        self.ensure_running()?;
        let id = self.graph.wme(w)?.id;
        let ident = self.graph.identifier_mut(id)?;
        let before = ident.input_wmes.len();
        ident.input_wmes.retain(|x| *x != w);
        if ident.input_wmes.len() == before {
            return Err(GraphError::StaleHandle {
                kind: "input wme",
                handle: w.to_string(),
            }
            .into());
        }
        let result = self.remove_wme_from_wm(w, LinkMode::Normal);
        self.guard(result)
    }

    /// Assert the preferences of a rule firing.
    pub fn add_instantiation(&mut self, spec: InstantiationSpec) -> DecideResult<InstId> {
        self.ensure_running()?;
        let result = self.add_instantiation_inner(spec);
        self.guard(result)
    }

    fn add_instantiation_inner(&mut self, spec: InstantiationSpec) -> DecideResult<InstId> {
        let match_goal = spec.match_goal;
        let goal_name = self.graph.name(match_goal);
        let match_level = self.graph.identifier(match_goal)?.level;
        if !self.graph.identifier(match_goal)?.is_active_goal() {
            return Err(GraphError::NotAGoal { id: goal_name }.into());
        }

        let mut conditions = Vec::with_capacity(spec.conditions.len());
        for w in &spec.conditions {
            let id = self.graph.wme(*w)?.id;
            let level = self.graph.identifier(id)?.level;
            conditions.push(ConditionWme { wme: *w, level });
        }
        for p in &spec.preferences {
            self.graph.identifier(p.id)?;
            self.check_linkable(&p.value)?;
            if let Some(referent) = &p.referent {
                self.check_linkable(referent)?;
            }
            if p.kind.is_binary() && p.referent.is_none() {
                return Err(GraphError::MissingReferent {
                    kind: p.kind.to_string(),
                }
                .into());
            }
        }

        let inst = self.graph.insert_instantiation(Instantiation {
            production: spec.production.as_str().into(),
            match_goal,
            match_goal_level: match_level,
            conditions,
            preferences: Vec::new(),
            in_ms: true,
        });
        for p in spec.preferences {
            let id_level = self.graph.identifier(p.id)?.level;
            let owner_goal = if id_level < match_level {
                self.goal_at_level(id_level).unwrap_or(match_goal)
            } else {
                match_goal
            };
            let pref = self.graph.insert_preference(Preference {
                kind: p.kind,
                id: p.id,
                attr: p.attr,
                value: p.value,
                referent: p.referent,
                o_supported: p.o_supported,
                in_tm: false,
                slot: None,
                inst: Some(inst),
                owner_goal: Some(owner_goal),
                reference_count: 0,
            });
            self.graph.instantiation_mut(inst)?.preferences.push(pref);
            self.add_preference_to_tm(pref)?;
        }
        tracing::trace!(production = %spec.production, goal = %goal_name, "instantiation asserted");
        Ok(inst)
    }

    /// The firing no longer matches: retract its i-supported preferences.
    /// O-supported preferences stay until removed explicitly.
    pub fn retract_instantiation(&mut self, inst: InstId) -> DecideResult<()> {
        self.ensure_running()?;
        let result = self.retract_instantiation_inner(inst);
        self.guard(result)
    }

    fn retract_instantiation_inner(&mut self, inst: InstId) -> DecideResult<()> {
        let record = self.graph.instantiation_mut(inst)?;
        record.in_ms = false;
        let prefs = record.preferences.clone();
        for p in prefs {
            let retract = self
                .graph
                .try_preference(p)
                .is_some_and(|pref| pref.in_tm && !pref.o_supported);
            if retract {
                self.remove_preference_from_tm(p, LinkMode::Normal)?;
            }
        }
        if self
            .graph
            .try_instantiation(inst)
            .is_some_and(|i| i.preferences.is_empty())
        {
            self.graph.remove_instantiation(inst);
        }
        Ok(())
    }

    /// Remove one preference from temporary memory (o-support rejection).
    pub fn remove_preference(&mut self, pref: PrefId) -> DecideResult<()> {
        self.ensure_running()?;
        if !self.graph.preference(pref)?.in_tm {
            return Ok(());
        }
        let result = self.remove_preference_from_tm(pref, LinkMode::Normal);
        self.guard(result)
    }

    /// Force the next operator decision to `value` if it is acceptable.
    pub fn force_selection(&mut self, value: impl Into<Symbol>) {
        self.forced_selection = Some(value.into());
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    /// Settle ordinary slots and flush.
    pub fn run_wm_phase(&mut self) -> DecideResult<()> {
        self.ensure_running()?;
        let result = self.decide_non_context_slots();
        self.guard(result)?;
        self.do_buffered_wm_and_ownership_changes()
    }

    /// Decide context slots and flush.
    pub fn run_decision_phase(&mut self) -> DecideResult<DecisionOutcome> {
        self.ensure_running()?;
        if self.top_goal.is_none() {
            return Err(DecisionError::NoTopGoal.into());
        }
        self.stats.decision_phases += 1;
        let result = self.decide_context_slots();
        let outcome = self.guard(result)?;
        self.do_buffered_wm_and_ownership_changes()?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Resolve a slot without changing anything but the selector's state.
    pub fn resolve_slot(&mut self, slot: SlotId, mode: ResolveMode) -> DecideResult<Resolution> {
        let mut ctx = ResolveContext {
            mode,
            numeric_mode: self.config.numeric_indifferent_mode,
            default_numeric_value: self.config.default_numeric_value,
            selector: self.selector.as_mut(),
            forced: None,
        };
        let result = resolve::run_preference_semantics(&self.graph, slot, &mut ctx);
        self.guard(result)
    }

    /// Whether the goal's current operator (or impasse) still agrees with
    /// its preferences.
    pub fn context_slot_consistent(&mut self, goal: IdentifierId) -> DecideResult<bool> {
        let slot = self.graph.operator_slot(goal)?;
        let res = self.resolve_slot(slot, ResolveMode::ConsistencyCheck)?;
        let s = self.graph.slot(slot)?;
        match s.wmes.first() {
            Some(w) => {
                let value = &self.graph.wme(*w)?.value;
                let mut supported = false;
                for p in &res.candidates {
                    if &self.graph.preference(*p)?.value == value {
                        supported = true;
                    }
                }
                Ok(res.impasse == ImpasseType::None && supported)
            }
            None => Ok(match s.impasse_type {
                ImpasseType::NoChange => res.impasse == ImpasseType::None && res.candidates.is_empty(),
                ImpasseType::None => res.candidates.is_empty(),
                other => res.impasse == other,
            }),
        }
    }

    /// The operator installed for `goal`.
    pub fn selected_operator(&self, goal: IdentifierId) -> Option<Symbol> {
        let slot = self.graph.operator_slot(goal).ok()?;
        let w = *self.graph.try_slot(slot)?.wmes.first()?;
        self.graph.try_wme(w).map(|w| w.value.clone())
    }

    /// Values of the WMEs installed in `(id ^attr)`.
    pub fn slot_values(&self, id: IdentifierId, attr: &Symbol) -> Vec<Symbol> {
        let Some(slot) = self.graph.find_slot(id, attr) else {
            return Vec::new();
        };
        self.graph
            .try_slot(slot)
            .map(|s| {
                s.wmes
                    .iter()
                    .filter_map(|w| self.graph.try_wme(*w))
                    .map(|w| w.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Values of the goal or impasse description WMEs `(id ^attr value)`.
    pub fn impasse_values(&self, id: IdentifierId, attr: &Symbol) -> Vec<Symbol> {
        self.graph
            .try_identifier(id)
            .map(|ident| {
                ident
                    .impasse_wmes
                    .iter()
                    .filter_map(|w| self.graph.try_wme(*w))
                    .filter(|w| &w.attr == attr)
                    .map(|w| w.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("goals", &self.goal_stack().len())
            .field("identifiers", &self.graph.identifier_count())
            .field("wmes", &self.graph.wme_count())
            .field("halted", &self.halted)
            .finish()
    }
}

