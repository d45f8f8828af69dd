//! Slots: the (identifier, attribute) pairs that hold preferences and WMEs.

use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

use super::preference::PreferenceType;
use super::{IdentifierId, PrefId, WmeId};

/// Classification of an unresolved decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpasseType {
    None,
    ConstraintFailure,
    Conflict,
    Tie,
    NoChange,
}

impl std::fmt::Display for ImpasseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ConstraintFailure => write!(f, "constraint-failure"),
            Self::Conflict => write!(f, "conflict"),
            Self::Tie => write!(f, "tie"),
            Self::NoChange => write!(f, "no-change"),
        }
    }
}

/// Preferences and installed WMEs for one (identifier, attribute) pair.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: IdentifierId,
    pub attr: Symbol,
    /// Winner-take-all operator slot of a goal.
    pub is_context_slot: bool,
    pub wmes: Vec<WmeId>,
    /// `(id ^attr value +)` mirrors of acceptable/require preferences.
    pub acceptable_preference_wmes: Vec<WmeId>,
    preferences: [Vec<PrefId>; PreferenceType::COUNT],
    pub impasse_type: ImpasseType,
    /// Attribute impasse identifier (ordinary slots only).
    pub impasse_id: Option<IdentifierId>,
    pub changed: bool,
    pub acceptable_preference_changed: bool,
    pub marked_for_possible_removal: bool,
}

impl Slot {
    pub fn new(id: IdentifierId, attr: Symbol, is_context_slot: bool) -> Self {
        Self {
            id,
            attr,
            is_context_slot,
            wmes: Vec::new(),
            acceptable_preference_wmes: Vec::new(),
            preferences: std::array::from_fn(|_| Vec::new()),
            impasse_type: ImpasseType::None,
            impasse_id: None,
            changed: false,
            acceptable_preference_changed: false,
            marked_for_possible_removal: false,
        }
    }

    /// Preferences of one type, in insertion order.
    pub fn preferences(&self, kind: PreferenceType) -> &[PrefId] {
        &self.preferences[kind.index()]
    }

    pub(crate) fn preferences_mut(&mut self, kind: PreferenceType) -> &mut Vec<PrefId> {
        &mut self.preferences[kind.index()]
    }

    /// Every preference in the slot, grouped by type.
    pub fn all_preferences(&self) -> Vec<PrefId> {
        self.preferences.iter().flatten().copied().collect()
    }

    pub fn has_preferences(&self) -> bool {
        self.preferences.iter().any(|list| !list.is_empty())
    }

    /// Nothing keeps this slot alive any more.
    pub fn is_empty(&self) -> bool {
        self.wmes.is_empty()
            && self.acceptable_preference_wmes.is_empty()
            && self.impasse_id.is_none()
            && !self.has_preferences()
    }
}
