//! Working-memory elements.

use serde::Serialize;

use crate::symbol::Symbol;

use super::{GdsId, IdentifierId, PrefId};

/// Where a WME lives and who put it there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WmeKind {
    /// Installed winner of a slot.
    Slot,
    /// `(id ^attr value +)` mirror of an acceptable preference.
    AcceptablePreference,
    /// Added by the I/O driver.
    Input,
    /// Goal/impasse description written by the architecture.
    Architecture,
}

/// An installed `(identifier, attribute, value)` fact.
#[derive(Debug, Clone)]
pub struct Wme {
    pub id: IdentifierId,
    pub attr: Symbol,
    pub value: Symbol,
    pub kind: WmeKind,
    pub timetag: u64,
    /// Justifying preference, read by backtracing.
    pub preference: Option<PrefId>,
    pub gds: Option<GdsId>,
}

impl Wme {
    pub fn is_acceptable(&self) -> bool {
        self.kind == WmeKind::AcceptablePreference
    }

    /// Detached copy handed to the matcher.
    pub fn record(&self) -> WmeRecord {
        WmeRecord {
            timetag: self.timetag,
            id: self.id,
            attr: self.attr.clone(),
            value: self.value.clone(),
            acceptable: self.is_acceptable(),
        }
    }
}

/// What the matcher sees of a WME; stays valid after the WME is freed.
#[derive(Debug, Clone, PartialEq)]
pub struct WmeRecord {
    pub timetag: u64,
    pub id: IdentifierId,
    pub attr: Symbol,
    pub value: Symbol,
    pub acceptable: bool,
}
