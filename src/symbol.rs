//! Symbols: the values that flow through preferences and WMEs.
//!
//! A [`Symbol`] is either an identifier (a node of the identifier graph,
//! addressed by an arena handle) or a constant. Only identifier symbols take
//! part in link counting; constants are inert as far as ownership goes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::graph::IdentifierId;

/// A value that can appear as attribute, value, or referent.
#[derive(Debug, Clone)]
pub enum Symbol {
    /// A graph node.
    Id(IdentifierId),
    /// A string constant (attribute names, enumerated values).
    Str(Arc<str>),
    /// An integer constant.
    Int(i64),
    /// A floating-point constant.
    Float(f64),
}

impl Symbol {
    /// Build a string constant.
    pub fn str(s: impl AsRef<str>) -> Self {
        Symbol::Str(Arc::from(s.as_ref()))
    }

    /// The identifier behind this symbol, if it is one.
    pub fn as_id(&self) -> Option<IdentifierId> {
        match self {
            Symbol::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Numeric value for int/float constants.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Symbol::Int(i) => Some(*i as f64),
            Symbol::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self, Symbol::Id(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Symbol::Str(s) => Some(s),
            _ => None,
        }
    }
}

// Floats compare by bit pattern so symbols can key hash maps.
impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Symbol::Id(a), Symbol::Id(b)) => a == b,
            (Symbol::Str(a), Symbol::Str(b)) => a == b,
            (Symbol::Int(a), Symbol::Int(b)) => a == b,
            (Symbol::Float(a), Symbol::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Symbol::Id(id) => id.hash(state),
            Symbol::Str(s) => s.hash(state),
            Symbol::Int(i) => i.hash(state),
            Symbol::Float(f) => f.to_bits().hash(state),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Id(id) => write!(f, "{id}"),
            Symbol::Str(s) => write!(f, "{s}"),
            Symbol::Int(i) => write!(f, "{i}"),
            Symbol::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<IdentifierId> for Symbol {
    fn from(id: IdentifierId) -> Self {
        Symbol::Id(id)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::str(s)
    }
}

impl From<i64> for Symbol {
    fn from(i: i64) -> Self {
        Symbol::Int(i)
    }
}

impl From<f64> for Symbol {
    fn from(x: f64) -> Self {
        Symbol::Float(x)
    }
}

/// Attribute and value constants the architecture itself writes.
#[derive(Debug, Clone)]
pub struct WellKnown {
    pub operator: Symbol,
    pub state: Symbol,
    pub impasse: Symbol,
    pub type_: Symbol,
    pub superstate: Symbol,
    pub attribute: Symbol,
    pub object: Symbol,
    pub choices: Symbol,
    pub none: Symbol,
    pub multiple: Symbol,
    pub item: Symbol,
    pub item_count: Symbol,
    pub quiescence: Symbol,
    pub t: Symbol,
    pub nil: Symbol,
    pub tie: Symbol,
    pub conflict: Symbol,
    pub constraint_failure: Symbol,
    pub no_change: Symbol,
}

impl Default for WellKnown {
    fn default() -> Self {
        Self {
            operator: Symbol::str("operator"),
            state: Symbol::str("state"),
            impasse: Symbol::str("impasse"),
            type_: Symbol::str("type"),
            superstate: Symbol::str("superstate"),
            attribute: Symbol::str("attribute"),
            object: Symbol::str("object"),
            choices: Symbol::str("choices"),
            none: Symbol::str("none"),
            multiple: Symbol::str("multiple"),
            item: Symbol::str("item"),
            item_count: Symbol::str("item-count"),
            quiescence: Symbol::str("quiescence"),
            t: Symbol::str("t"),
            nil: Symbol::str("nil"),
            tie: Symbol::str("tie"),
            conflict: Symbol::str("conflict"),
            constraint_failure: Symbol::str("constraint-failure"),
            no_change: Symbol::str("no-change"),
        }
    }
}
