//! Preferences and the instantiations (rule firings) that produce them.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

use super::identifier::GoalLevel;
use super::{IdentifierId, InstId, SlotId, WmeId};

/// Kind of assertion a preference makes about its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferenceType {
    Acceptable,
    Require,
    Reject,
    Prohibit,
    Reconsider,
    UnaryIndifferent,
    Parallel,
    Best,
    Worst,
    BinaryIndifferent,
    NumericIndifferent,
    Better,
    Worse,
}

impl PreferenceType {
    pub const COUNT: usize = 13;

    pub const ALL: [PreferenceType; Self::COUNT] = [
        Self::Acceptable,
        Self::Require,
        Self::Reject,
        Self::Prohibit,
        Self::Reconsider,
        Self::UnaryIndifferent,
        Self::Parallel,
        Self::Best,
        Self::Worst,
        Self::BinaryIndifferent,
        Self::NumericIndifferent,
        Self::Better,
        Self::Worse,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Binary preferences carry a referent.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::BinaryIndifferent | Self::NumericIndifferent | Self::Better | Self::Worse
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Acceptable => "acceptable",
            Self::Require => "require",
            Self::Reject => "reject",
            Self::Prohibit => "prohibit",
            Self::Reconsider => "reconsider",
            Self::UnaryIndifferent => "unary-indifferent",
            Self::Parallel => "parallel",
            Self::Best => "best",
            Self::Worst => "worst",
            Self::BinaryIndifferent => "binary-indifferent",
            Self::NumericIndifferent => "numeric-indifferent",
            Self::Better => "better",
            Self::Worse => "worse",
        }
    }
}

impl std::fmt::Display for PreferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PreferenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indifferent" => Ok(Self::UnaryIndifferent),
            other => Self::ALL
                .into_iter()
                .find(|k| k.name() == other)
                .ok_or_else(|| format!("unknown preference type '{other}'")),
        }
    }
}

/// A preference held in a slot.
#[derive(Debug, Clone)]
pub struct Preference {
    pub kind: PreferenceType,
    pub id: IdentifierId,
    pub attr: Symbol,
    pub value: Symbol,
    pub referent: Option<Symbol>,
    pub o_supported: bool,
    /// Currently asserted in temporary memory (in a slot).
    pub in_tm: bool,
    pub slot: Option<SlotId>,
    pub inst: Option<InstId>,
    /// Goal whose removal retracts this preference.
    pub owner_goal: Option<IdentifierId>,
    /// One for being in temporary memory, one per WME it justifies.
    pub(crate) reference_count: u32,
}

/// A matched condition of an instantiation, with the level of its identifier
/// at match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionWme {
    pub wme: WmeId,
    pub level: GoalLevel,
}

/// One rule firing.
#[derive(Debug, Clone)]
pub struct Instantiation {
    pub production: Arc<str>,
    pub match_goal: IdentifierId,
    pub match_goal_level: GoalLevel,
    pub conditions: Vec<ConditionWme>,
    pub preferences: Vec<super::PrefId>,
    /// Still matched in the rule network.
    pub in_ms: bool,
}

/// A preference as asserted by the firing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceSpec {
    pub kind: PreferenceType,
    pub id: IdentifierId,
    pub attr: Symbol,
    pub value: Symbol,
    pub referent: Option<Symbol>,
    pub o_supported: bool,
}

impl PreferenceSpec {
    pub fn new(
        kind: PreferenceType,
        id: IdentifierId,
        attr: impl Into<Symbol>,
        value: impl Into<Symbol>,
    ) -> Self {
        Self {
            kind,
            id,
            attr: attr.into(),
            value: value.into(),
            referent: None,
            o_supported: false,
        }
    }

    pub fn acceptable(id: IdentifierId, attr: impl Into<Symbol>, value: impl Into<Symbol>) -> Self {
        Self::new(PreferenceType::Acceptable, id, attr, value)
    }

    pub fn require(id: IdentifierId, attr: impl Into<Symbol>, value: impl Into<Symbol>) -> Self {
        Self::new(PreferenceType::Require, id, attr, value)
    }

    pub fn binary(
        kind: PreferenceType,
        id: IdentifierId,
        attr: impl Into<Symbol>,
        value: impl Into<Symbol>,
        referent: impl Into<Symbol>,
    ) -> Self {
        Self::new(kind, id, attr, value).with_referent(referent)
    }

    pub fn with_referent(mut self, referent: impl Into<Symbol>) -> Self {
        self.referent = Some(referent.into());
        self
    }

    pub fn o_supported(mut self) -> Self {
        self.o_supported = true;
        self
    }
}

/// A firing as handed over by the matcher.
#[derive(Debug, Clone)]
pub struct InstantiationSpec {
    pub production: String,
    pub match_goal: IdentifierId,
    pub conditions: Vec<WmeId>,
    pub preferences: Vec<PreferenceSpec>,
}

impl InstantiationSpec {
    pub fn new(production: impl Into<String>, match_goal: IdentifierId) -> Self {
        Self {
            production: production.into(),
            match_goal,
            conditions: Vec::new(),
            preferences: Vec::new(),
        }
    }

    pub fn with_condition(mut self, wme: WmeId) -> Self {
        self.conditions.push(wme);
        self
    }

    pub fn with_preference(mut self, pref: PreferenceSpec) -> Self {
        self.preferences.push(pref);
        self
    }
}
