//! Identifiers: goals, impasses, and ordinary objects.

use crate::symbol::Symbol;

use super::slot::ImpasseType;
use super::{GdsId, IdentifierId, PrefId, SlotId, WmeId};

/// Depth in the goal stack. Smaller is higher; the top goal is level 1.
pub type GoalLevel = u32;

/// Level of the top goal.
pub const TOP_GOAL_LEVEL: GoalLevel = 1;

/// Sentinel for "could fall as low as anything".
pub const LOWEST_POSSIBLE_GOAL_LEVEL: GoalLevel = GoalLevel::MAX;

/// Goal-stack bookkeeping carried by goal identifiers only.
#[derive(Debug, Clone)]
pub struct GoalInfo {
    pub higher_goal: Option<IdentifierId>,
    pub lower_goal: Option<IdentifierId>,
    /// The goal's single context slot.
    pub operator_slot: SlotId,
    /// Impasse that created this goal (`None` for the top goal).
    pub impasse_type: ImpasseType,
    /// Attribute the impasse arose on (`operator` or `state`).
    pub attribute_of_impasse: Option<Symbol>,
    pub gds: Option<GdsId>,
    /// Preferences retracted when this goal is removed.
    pub preferences_from_goal: Vec<PrefId>,
    /// False once the goal has been popped off the stack.
    pub active: bool,
}

/// A node of the identifier graph.
#[derive(Debug, Clone)]
pub struct Identifier {
    pub letter: char,
    pub number: u64,
    pub level: GoalLevel,
    /// Pending target level; equals `level` outside a promotion.
    pub promotion_level: GoalLevel,
    /// Incoming counted links (WMEs, preferences, the goal stack's link).
    pub link_count: u32,
    pub could_be_a_link_from_below: bool,
    /// Attribute impasse identifier (not a goal).
    pub is_impasse: bool,
    pub goal: Option<GoalInfo>,
    pub slots: Vec<SlotId>,
    pub input_wmes: Vec<WmeId>,
    /// Architecture WMEs describing a goal or impasse (`^type`, `^item`, ...).
    pub impasse_wmes: Vec<WmeId>,
}

impl Identifier {
    pub fn new(letter: char, number: u64, level: GoalLevel) -> Self {
        Self {
            letter,
            number,
            level,
            promotion_level: level,
            link_count: 0,
            could_be_a_link_from_below: false,
            is_impasse: false,
            goal: None,
            slots: Vec::new(),
            input_wmes: Vec::new(),
            impasse_wmes: Vec::new(),
        }
    }

    pub fn is_goal(&self) -> bool {
        self.goal.is_some()
    }

    /// Goals and impasses are owned by the goal stack, not by link counts.
    pub fn is_goal_or_impasse(&self) -> bool {
        self.is_goal() || self.is_impasse
    }

    /// Whether this is a goal still on the stack.
    pub fn is_active_goal(&self) -> bool {
        self.goal.as_ref().is_some_and(|g| g.active)
    }

    pub fn name(&self) -> String {
        format!("{}{}", self.letter, self.number)
    }
}
