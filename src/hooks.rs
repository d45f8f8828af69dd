//! Collaborator interfaces the engine calls out to.
//!
//! The matcher learns about working-memory changes at flush time; the
//! reinforcement sink hears about context decisions and goal removals. Both
//! default to doing nothing.

use std::cell::RefCell;
use std::rc::Rc;

use crate::graph::{IdentifierId, WmeRecord};
use crate::symbol::Symbol;

/// Receives working-memory changes once per flush, adds before removes.
pub trait Matcher {
    fn add_wme(&mut self, wme: &WmeRecord);
    fn remove_wme(&mut self, wme: &WmeRecord);
}

/// Reward bookkeeping for context-slot decisions.
pub trait ReinforcementSink {
    /// A context slot of `goal` is about to commit through a forced selection
    /// or a lone require.
    fn tabulate_reward(&mut self, _goal: IdentifierId) {}

    /// `value` was installed as the operator of `goal`.
    fn store_decision(&mut self, _goal: IdentifierId, _value: &Symbol) {}

    /// `goal` is being popped off the stack.
    fn goal_removed(&mut self, _goal: IdentifierId) {}
}

// Shared handles let a caller keep inspecting a collaborator the engine owns.
impl<M: Matcher> Matcher for Rc<RefCell<M>> {
    fn add_wme(&mut self, wme: &WmeRecord) {
        self.borrow_mut().add_wme(wme);
    }

    fn remove_wme(&mut self, wme: &WmeRecord) {
        self.borrow_mut().remove_wme(wme);
    }
}

impl<R: ReinforcementSink> ReinforcementSink for Rc<RefCell<R>> {
    fn tabulate_reward(&mut self, goal: IdentifierId) {
        self.borrow_mut().tabulate_reward(goal);
    }

    fn store_decision(&mut self, goal: IdentifierId, value: &Symbol) {
        self.borrow_mut().store_decision(goal, value);
    }

    fn goal_removed(&mut self, goal: IdentifierId) {
        self.borrow_mut().goal_removed(goal);
    }
}

/// Matcher that ignores every change.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMatcher;

impl Matcher for NullMatcher {
    fn add_wme(&mut self, _wme: &WmeRecord) {}
    fn remove_wme(&mut self, _wme: &WmeRecord) {}
}

/// Reinforcement sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReinforcement;

impl ReinforcementSink for NullReinforcement {}

/// Matcher that records the changes it is told about.
#[derive(Debug, Default, Clone)]
pub struct RecordingMatcher {
    pub added: Vec<WmeRecord>,
    pub removed: Vec<WmeRecord>,
}

impl Matcher for RecordingMatcher {
    fn add_wme(&mut self, wme: &WmeRecord) {
        self.added.push(wme.clone());
    }

    fn remove_wme(&mut self, wme: &WmeRecord) {
        self.removed.push(wme.clone());
    }
}

/// Reinforcement sink that records what it is told.
#[derive(Debug, Default, Clone)]
pub struct RecordingReinforcement {
    pub rewards: Vec<IdentifierId>,
    pub decisions: Vec<(IdentifierId, Symbol)>,
    pub removed_goals: Vec<IdentifierId>,
}

impl ReinforcementSink for RecordingReinforcement {
    fn tabulate_reward(&mut self, goal: IdentifierId) {
        self.rewards.push(goal);
    }

    fn store_decision(&mut self, goal: IdentifierId, value: &Symbol) {
        self.decisions.push((goal, value.clone()));
    }

    fn goal_removed(&mut self, goal: IdentifierId) {
        self.removed_goals.push(goal);
    }
}
