//! Preference resolution: from a slot's preferences to winners and impasses.
//!
//! [`run_preference_semantics`] reads one slot and never mutates the graph.
//! Stages run in a fixed order:
//!
//! 1. forced selection (context slots, commit mode)
//! 2. require
//! 3. acceptable minus reject/prohibit (ordinary slots stop here)
//! 4. better/worse conflicts
//! 5. best/worst
//! 6. indifference, then either one selected winner or a tie
//!
//! Scratch marks on values live in a map built per call.

pub mod numeric;

use std::collections::{HashMap, HashSet};

use crate::config::NumericMode;
use crate::error::{DecideResult, DecisionError};
use crate::explore::{ScoredCandidate, Selector};
use crate::graph::{IdentifierGraph, ImpasseType, PrefId, Preference, PreferenceType, Slot, SlotId};
use crate::symbol::Symbol;

/// Whether resolution may ask the selector to break a full-indifference tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Produce at most one winner for context slots.
    Commit,
    /// Return the indifferent set unchanged; used to check an installed value.
    ConsistencyCheck,
}

/// Inputs beyond the slot itself.
pub struct ResolveContext<'a> {
    pub mode: ResolveMode,
    pub numeric_mode: NumericMode,
    pub default_numeric_value: f64,
    pub selector: &'a mut dyn Selector,
    /// Externally forced operator value.
    pub forced: Option<&'a Symbol>,
}

/// Outcome of resolving one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub impasse: ImpasseType,
    /// Winners when `impasse` is `None`; otherwise the items of the impasse.
    pub candidates: Vec<PrefId>,
    /// The forced selection decided this slot.
    pub forced: bool,
    /// The decision should be reported for reward bookkeeping.
    pub tabulate_reward: bool,
}

impl Resolution {
    fn new(impasse: ImpasseType, candidates: Vec<PrefId>) -> Self {
        Self {
            impasse,
            candidates,
            forced: false,
            tabulate_reward: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeciderFlag {
    Nothing,
    Candidate,
    Conflicted,
    AlreadyExisting,
}

type Entry<'g> = (PrefId, &'g Preference);

/// Resolve the preferences of `slot_id`.
pub fn run_preference_semantics(
    graph: &IdentifierGraph,
    slot_id: SlotId,
    ctx: &mut ResolveContext<'_>,
) -> DecideResult<Resolution> {
    let slot = graph.slot(slot_id)?;
    let prefs = |kind: PreferenceType| collect(graph, slot, kind);
    let commit_context = slot.is_context_slot && ctx.mode == ResolveMode::Commit;

    if !slot.has_preferences() {
        return Ok(Resolution::new(ImpasseType::None, Vec::new()));
    }

    let acceptables = prefs(PreferenceType::Acceptable)?;

    // Forced selection.
    if commit_context {
        if let Some(forced) = ctx.forced {
            if let Some((id, _)) = acceptables.iter().find(|(_, p)| &p.value == forced) {
                let mut res = Resolution::new(ImpasseType::None, vec![*id]);
                res.forced = true;
                res.tabulate_reward = true;
                return Ok(res);
            }
            tracing::warn!(
                value = %graph.display(forced),
                slot = %graph.name(slot.id),
                "forced selection names no acceptable candidate; ignoring it"
            );
        }
    }

    let prohibits = prefs(PreferenceType::Prohibit)?;

    // Require.
    let requires = prefs(PreferenceType::Require)?;
    if !requires.is_empty() {
        let mut seen: HashSet<&Symbol> = HashSet::new();
        let distinct: Vec<Entry<'_>> = requires
            .iter()
            .filter(|(_, p)| seen.insert(&p.value))
            .copied()
            .collect();
        if distinct.len() > 1 {
            return Ok(Resolution::new(ImpasseType::ConstraintFailure, ids(&distinct)));
        }
        let value = &distinct[0].1.value;
        if prohibits.iter().any(|(_, p)| &p.value == value) {
            return Ok(Resolution::new(ImpasseType::ConstraintFailure, ids(&distinct)));
        }
        let mut res = Resolution::new(ImpasseType::None, ids(&distinct));
        res.tabulate_reward = commit_context;
        return Ok(res);
    }

    // Acceptable, reject, prohibit.
    let mut flags: HashMap<&Symbol, DeciderFlag> = acceptables
        .iter()
        .map(|(_, p)| (&p.value, DeciderFlag::Candidate))
        .collect();
    let rejects = prefs(PreferenceType::Reject)?;
    for (_, p) in prohibits.iter().chain(rejects.iter()) {
        if let Some(flag) = flags.get_mut(&p.value) {
            *flag = DeciderFlag::Nothing;
        }
    }
    let mut candidates: Vec<Entry<'_>> = Vec::new();
    for entry in &acceptables {
        if let Some(flag) = flags.get_mut(&entry.1.value) {
            if *flag == DeciderFlag::Candidate {
                candidates.push(*entry);
                *flag = DeciderFlag::AlreadyExisting;
            }
        }
    }

    if !slot.is_context_slot || candidates.len() <= 1 {
        return Ok(Resolution::new(ImpasseType::None, ids(&candidates)));
    }

    // Better/worse.
    let betters = prefs(PreferenceType::Better)?;
    let worses = prefs(PreferenceType::Worse)?;
    if !betters.is_empty() || !worses.is_empty() {
        let mut flags: HashMap<&Symbol, DeciderFlag> = candidates
            .iter()
            .map(|(_, p)| (&p.value, DeciderFlag::Candidate))
            .collect();
        for (_, p) in &betters {
            if let Some(referent) = &p.referent {
                dominate(&mut flags, &p.value, referent);
            }
        }
        for (_, p) in &worses {
            if let Some(referent) = &p.referent {
                dominate(&mut flags, referent, &p.value);
            }
        }
        let is_candidate = |p: &Preference| flags.get(&p.value) == Some(&DeciderFlag::Candidate);
        if !candidates.iter().any(|(_, p)| is_candidate(p)) {
            return Ok(Resolution::new(ImpasseType::Conflict, ids(&candidates)));
        }
        candidates.retain(|(_, p)| is_candidate(p));
    }

    // Best/worst.
    let bests: HashSet<&Symbol> = prefs(PreferenceType::Best)?.into_iter().map(|(_, p)| &p.value).collect();
    if candidates.iter().any(|(_, p)| bests.contains(&p.value)) {
        candidates.retain(|(_, p)| bests.contains(&p.value));
    }
    let worsts: HashSet<&Symbol> = prefs(PreferenceType::Worst)?.into_iter().map(|(_, p)| &p.value).collect();
    if candidates.iter().any(|(_, p)| !worsts.contains(&p.value)) {
        candidates.retain(|(_, p)| !worsts.contains(&p.value));
    }

    if candidates.len() <= 1 {
        return Ok(Resolution::new(ImpasseType::None, ids(&candidates)));
    }

    // Indifference.
    let numerics = prefs(PreferenceType::NumericIndifferent)?;
    let binaries = prefs(PreferenceType::BinaryIndifferent)?;
    let mut unary: HashSet<&Symbol> = prefs(PreferenceType::UnaryIndifferent)?
        .into_iter()
        .chain(numerics.iter().copied())
        .map(|(_, p)| &p.value)
        .collect();
    unary.extend(
        binaries
            .iter()
            .filter(|(_, p)| p.referent.as_ref().and_then(Symbol::as_number).is_some())
            .map(|(_, p)| &p.value),
    );
    let pair_indifferent = |a: &Symbol, b: &Symbol| {
        binaries.iter().any(|(_, p)| {
            let r = p.referent.as_ref();
            (&p.value == a && r == Some(b)) || (&p.value == b && r == Some(a))
        })
    };
    let all_indifferent = candidates.iter().all(|(_, c)| {
        unary.contains(&c.value)
            || candidates
                .iter()
                .all(|(_, o)| o.value == c.value || pair_indifferent(&c.value, &o.value))
    });

    if !all_indifferent {
        return Ok(Resolution::new(ImpasseType::Tie, ids(&candidates)));
    }
    if ctx.mode == ResolveMode::ConsistencyCheck {
        return Ok(Resolution::new(ImpasseType::None, ids(&candidates)));
    }

    let numeric_refs: Vec<&Preference> = numerics.iter().map(|(_, p)| *p).collect();
    let binary_refs: Vec<&Preference> = binaries.iter().map(|(_, p)| *p).collect();
    let scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|(_, p)| ScoredCandidate {
            value: p.value.clone(),
            numeric_value: numeric::candidate_value(
                &numeric_refs,
                &binary_refs,
                &p.value,
                ctx.numeric_mode,
                ctx.default_numeric_value,
            ),
        })
        .collect();
    let index = ctx.selector.choose(&scored);
    let Some((winner, _)) = candidates.get(index) else {
        return Err(DecisionError::SelectorOutOfRange {
            index,
            len: candidates.len(),
        }
        .into());
    };
    tracing::trace!(
        policy = ctx.selector.name(),
        winner = %graph.display(&scored[index].value),
        among = scored.len(),
        "indifferent selection"
    );
    Ok(Resolution::new(ImpasseType::None, vec![*winner]))
}

fn collect<'g>(graph: &'g IdentifierGraph, slot: &'g Slot, kind: PreferenceType) -> DecideResult<Vec<Entry<'g>>> {
    slot.preferences(kind)
        .iter()
        .map(|p| graph.preference(*p).map(|pref| (*p, pref)))
        .collect()
}

fn ids(entries: &[Entry<'_>]) -> Vec<PrefId> {
    entries.iter().map(|(id, _)| *id).collect()
}

/// Record that `winner` dominates `loser` when both are still in play and
/// at least one of them is an unconflicted candidate.
fn dominate<'g>(flags: &mut HashMap<&'g Symbol, DeciderFlag>, winner: &'g Symbol, loser: &'g Symbol) {
    if winner == loser {
        return;
    }
    let (Some(w), Some(l)) = (flags.get(winner).copied(), flags.get(loser).copied()) else {
        return;
    };
    if w == DeciderFlag::Candidate || l == DeciderFlag::Candidate {
        flags.insert(loser, DeciderFlag::Conflicted);
    }
}
