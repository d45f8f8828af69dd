//! Numeric-indifferent values of candidates.

use crate::config::NumericMode;
use crate::graph::Preference;
use crate::symbol::Symbol;

/// Combined numeric value of `value`.
///
/// `numeric` and `binary` are the slot's numeric-indifferent and
/// binary-indifferent preferences; those naming `value` with a numeric
/// referent contribute it. With no contributions the result is `default`.
pub fn candidate_value(
    numeric: &[&Preference],
    binary: &[&Preference],
    value: &Symbol,
    mode: NumericMode,
    default: f64,
) -> f64 {
    let contributions: Vec<f64> = numeric
        .iter()
        .chain(binary)
        .filter(|p| &p.value == value)
        .filter_map(|p| p.referent.as_ref().and_then(Symbol::as_number))
        .collect();

    if contributions.is_empty() {
        return default;
    }
    let sum: f64 = contributions.iter().sum();
    match mode {
        NumericMode::Sum => sum,
        NumericMode::Average => sum / contributions.len() as f64,
    }
}
