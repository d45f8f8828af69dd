//! End-to-end integration tests for the decision kernel.
//!
//! These tests drive the engine the way a matcher and I/O driver would:
//! assert instantiations, run the working-memory and decision phases, and
//! check the goal stack, installed WMEs, and the ownership invariants after
//! every flush.

use std::cell::RefCell;
use std::rc::Rc;

use decide_kernel::config::{EngineConfig, ExplorationConfig};
use decide_kernel::engine::{DecisionOutcome, Engine};
use decide_kernel::error::{DecideError, DecisionError};
use decide_kernel::explore::{ScoredCandidate, SelectionPolicy, Selector};
use decide_kernel::graph::{
    IdentifierId, ImpasseType, InstId, InstantiationSpec, PreferenceSpec, PreferenceType,
};
use decide_kernel::hooks::{RecordingMatcher, RecordingReinforcement};
use decide_kernel::resolve::ResolveMode;
use decide_kernel::symbol::Symbol;

fn test_engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

fn engine_with_policy(policy: SelectionPolicy, seed: u64) -> Engine {
    Engine::new(EngineConfig {
        exploration: ExplorationConfig {
            policy,
            seed: Some(seed),
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap()
}

fn op(goal: IdentifierId, kind: PreferenceType, value: &str) -> PreferenceSpec {
    PreferenceSpec::new(kind, goal, "operator", value)
}

fn op2(goal: IdentifierId, kind: PreferenceType, value: &str, referent: impl Into<Symbol>) -> PreferenceSpec {
    PreferenceSpec::binary(kind, goal, "operator", value, referent)
}

fn fire(engine: &mut Engine, goal: IdentifierId, prefs: Vec<PreferenceSpec>) -> InstId {
    let spec = prefs
        .into_iter()
        .fold(InstantiationSpec::new("propose", goal), |s, p| s.with_preference(p));
    engine.add_instantiation(spec).unwrap()
}

fn cycle(engine: &mut Engine) -> DecisionOutcome {
    engine.run_wm_phase().unwrap();
    let outcome = engine.run_decision_phase().unwrap();
    assert_no_dangling(engine);
    outcome
}

fn selected(outcome: &DecisionOutcome) -> Symbol {
    match outcome {
        DecisionOutcome::Selected { value, .. } => value.clone(),
        other => panic!("expected a selection, got {other:?}"),
    }
}

/// Every WME and preference points at live identifiers, and every live
/// ordinary identifier is linked.
fn assert_no_dangling(engine: &Engine) {
    let g = engine.graph();
    let live = |s: &Symbol| s.as_id().is_none_or(|id| g.try_identifier(id).is_some());
    for (_, w) in g.wmes() {
        assert!(g.try_identifier(w.id).is_some(), "wme on dead identifier");
        assert!(live(&w.value), "wme value is a dead identifier");
    }
    for (_, p) in g.preferences().filter(|(_, p)| p.in_tm) {
        assert!(g.try_identifier(p.id).is_some(), "preference on dead identifier");
        assert!(live(&p.value));
        assert!(p.referent.as_ref().is_none_or(live));
    }
    for (_, ident) in g.identifiers() {
        if !ident.is_goal_or_impasse() {
            assert!(ident.link_count > 0, "{} survived with no links", ident.name());
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution properties
// ---------------------------------------------------------------------------

#[test]
fn lone_require_wins_and_reports_reward() {
    let sink = Rc::new(RefCell::new(RecordingReinforcement::default()));
    let mut engine = test_engine().with_reinforcement(sink.clone());
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o2"),
            op(s1, PreferenceType::Require, "o1"),
        ],
    );
    let outcome = cycle(&mut engine);
    assert_eq!(selected(&outcome), Symbol::str("o1"));
    assert_eq!(engine.selected_operator(s1), Some(Symbol::str("o1")));

    let sink = sink.borrow();
    assert_eq!(sink.rewards, vec![s1]);
    assert_eq!(sink.decisions, vec![(s1, Symbol::str("o1"))]);
}

#[test]
fn two_requires_are_a_constraint_failure() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Require, "o1"),
            op(s1, PreferenceType::Require, "o2"),
        ],
    );
    let outcome = cycle(&mut engine);
    let DecisionOutcome::Impasse { goal, impasse, .. } = outcome else {
        panic!("expected impasse, got {outcome:?}");
    };
    assert_eq!(impasse, ImpasseType::ConstraintFailure);
    let items = engine.impasse_values(goal, &Symbol::str("item"));
    assert_eq!(items, vec![Symbol::str("o1"), Symbol::str("o2")]);
}

#[test]
fn required_and_prohibited_is_a_constraint_failure() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Require, "o1"),
            op(s1, PreferenceType::Prohibit, "o1"),
        ],
    );
    let outcome = cycle(&mut engine);
    let DecisionOutcome::Impasse {
        goal,
        supergoal,
        impasse,
        attribute,
    } = outcome
    else {
        panic!("expected impasse, got {outcome:?}");
    };
    assert_eq!(supergoal, s1);
    assert_eq!(impasse, ImpasseType::ConstraintFailure);
    assert_eq!(attribute, Symbol::str("operator"));
    assert_eq!(engine.impasse_values(goal, &Symbol::str("item")), vec![Symbol::str("o1")]);
    assert_eq!(
        engine.impasse_values(goal, &Symbol::str("impasse")),
        vec![Symbol::str("constraint-failure")]
    );
    assert_eq!(engine.impasse_values(goal, &Symbol::str("item-count")), vec![Symbol::Int(1)]);
}

#[test]
fn better_preference_picks_the_dominant_candidate() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
            op2(s1, PreferenceType::Better, "o1", "o2"),
        ],
    );
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("o1"));
}

#[test]
fn binary_indifferent_pair_under_first_policy() {
    let mut engine = engine_with_policy(SelectionPolicy::First, 0);
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
            op2(s1, PreferenceType::BinaryIndifferent, "o1", "o2"),
        ],
    );
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("o1"));
}

#[test]
fn full_indifference_never_ties() {
    for seed in 0..16 {
        let mut engine = engine_with_policy(SelectionPolicy::RandomUniform, seed);
        let s1 = engine.create_top_goal().unwrap();
        fire(
            &mut engine,
            s1,
            vec![
                op(s1, PreferenceType::Acceptable, "o1"),
                op(s1, PreferenceType::Acceptable, "o2"),
                op(s1, PreferenceType::Acceptable, "o3"),
                op(s1, PreferenceType::UnaryIndifferent, "o1"),
                op(s1, PreferenceType::UnaryIndifferent, "o2"),
                op2(s1, PreferenceType::NumericIndifferent, "o3", 0.5),
            ],
        );
        let value = selected(&cycle(&mut engine));
        assert!(["o1", "o2", "o3"].iter().any(|v| Symbol::str(v) == value));
    }
}

#[test]
fn epsilon_greedy_without_exploration_takes_the_best_value() {
    let mut engine = Engine::new(EngineConfig {
        exploration: ExplorationConfig {
            policy: SelectionPolicy::EpsilonGreedy,
            epsilon: 0.0,
            seed: Some(7),
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "low"),
            op(s1, PreferenceType::Acceptable, "high"),
            op2(s1, PreferenceType::NumericIndifferent, "low", 0.2),
            op2(s1, PreferenceType::NumericIndifferent, "high", 0.9),
        ],
    );
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("high"));
}

#[test]
fn resolution_is_idempotent_on_an_unchanged_slot() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
            op(s1, PreferenceType::Acceptable, "o3"),
            op2(s1, PreferenceType::Worse, "o3", "o1"),
            op(s1, PreferenceType::Best, "o2"),
        ],
    );
    engine.run_wm_phase().unwrap();
    let slot = engine.graph().operator_slot(s1).unwrap();
    let first = engine.resolve_slot(slot, ResolveMode::ConsistencyCheck).unwrap();
    let second = engine.resolve_slot(slot, ResolveMode::ConsistencyCheck).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.impasse, ImpasseType::None);
}

#[test]
fn unresolved_candidates_tie_and_refresh_items() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
        ],
    );
    let DecisionOutcome::Impasse { goal: s2, impasse, .. } = cycle(&mut engine) else {
        panic!("expected a tie");
    };
    assert_eq!(impasse, ImpasseType::Tie);
    assert_eq!(engine.impasse_values(s2, &Symbol::str("choices")), vec![Symbol::str("multiple")]);

    // Same impasse on the same attribute: the sub-goal stays and its items
    // grow; the walk continues into S2, which has nothing to do.
    fire(&mut engine, s1, vec![op(s1, PreferenceType::Acceptable, "o3")]);
    let outcome = cycle(&mut engine);
    let DecisionOutcome::Impasse { goal: s3, supergoal, impasse, attribute } = outcome else {
        panic!("expected a state no-change below the tie");
    };
    assert_eq!(supergoal, s2);
    assert_eq!(impasse, ImpasseType::NoChange);
    assert_eq!(attribute, Symbol::str("state"));
    assert_eq!(engine.goal_stack(), vec![s1, s2, s3]);
    assert_eq!(
        engine.impasse_values(s2, &Symbol::str("item")),
        vec![Symbol::str("o1"), Symbol::str("o2"), Symbol::str("o3")]
    );
    assert_eq!(engine.impasse_values(s2, &Symbol::str("item-count")), vec![Symbol::Int(3)]);
}

// ---------------------------------------------------------------------------
// Forced selection and reconsideration
// ---------------------------------------------------------------------------

#[test]
fn forced_selection_overrides_a_tie() {
    let sink = Rc::new(RefCell::new(RecordingReinforcement::default()));
    let mut engine = test_engine().with_reinforcement(sink.clone());
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
        ],
    );
    engine.force_selection("o2");
    let outcome = cycle(&mut engine);
    assert_eq!(
        outcome,
        DecisionOutcome::Selected {
            goal: s1,
            value: Symbol::str("o2"),
            forced: true,
        }
    );
    assert_eq!(sink.borrow().rewards, vec![s1]);
}

#[test]
fn forced_selection_of_unknown_operator_falls_through() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
        ],
    );
    engine.force_selection("o9");
    let outcome = cycle(&mut engine);
    assert!(matches!(
        outcome,
        DecisionOutcome::Impasse {
            impasse: ImpasseType::Tie,
            ..
        }
    ));
    assert!(!engine.is_halted());
}

#[test]
fn operator_no_change_then_replacement() {
    let sink = Rc::new(RefCell::new(RecordingReinforcement::default()));
    let mut engine = test_engine().with_reinforcement(sink.clone());
    let s1 = engine.create_top_goal().unwrap();
    let first = fire(&mut engine, s1, vec![op(s1, PreferenceType::Acceptable, "o1")]);
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("o1"));

    // Nothing changed: the installed operator stays and the stack deepens.
    let DecisionOutcome::Impasse { goal: s2, impasse, attribute, .. } = cycle(&mut engine) else {
        panic!("expected an operator no-change");
    };
    assert_eq!(impasse, ImpasseType::NoChange);
    assert_eq!(attribute, Symbol::str("operator"));
    assert_eq!(engine.selected_operator(s1), Some(Symbol::str("o1")));

    // o1 loses its support; o2 replaces it and the sub-goal goes away.
    engine.retract_instantiation(first).unwrap();
    fire(&mut engine, s1, vec![op(s1, PreferenceType::Acceptable, "o2")]);
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("o2"));
    assert_eq!(engine.goal_stack(), vec![s1]);
    assert!(engine.graph().try_identifier(s2).is_none());
    assert_eq!(sink.borrow().removed_goals, vec![s2]);
}

#[test]
fn reconsider_reopens_a_supported_operator() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
            op2(s1, PreferenceType::Better, "o1", "o2"),
        ],
    );
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("o1"));

    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Reconsider, "o1"),
            op(s1, PreferenceType::Reject, "o1"),
        ],
    );
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("o2"));
}

#[test]
fn consistency_check_tracks_the_installed_operator() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(&mut engine, s1, vec![op(s1, PreferenceType::Acceptable, "o1")]);
    cycle(&mut engine);
    assert!(engine.context_slot_consistent(s1).unwrap());

    fire(&mut engine, s1, vec![op(s1, PreferenceType::Reject, "o1")]);
    engine.run_wm_phase().unwrap();
    assert!(!engine.context_slot_consistent(s1).unwrap());
}

// ---------------------------------------------------------------------------
// Working memory and the matcher
// ---------------------------------------------------------------------------

#[test]
fn acceptable_preference_wmes_mirror_proposals() {
    let matcher = Rc::new(RefCell::new(RecordingMatcher::default()));
    let mut engine = test_engine().with_matcher(matcher.clone());
    let s1 = engine.create_top_goal().unwrap();
    let inst = fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Require, "o2"),
        ],
    );
    engine.run_wm_phase().unwrap();

    let slot = engine.graph().operator_slot(s1).unwrap();
    assert_eq!(engine.graph().slot(slot).unwrap().acceptable_preference_wmes.len(), 2);
    let w = engine.acceptable_preference_wme(slot, &Symbol::str("o1")).unwrap();
    assert!(engine.graph().wme(w).unwrap().preference.is_some());
    assert!(
        matcher
            .borrow()
            .added
            .iter()
            .any(|r| r.acceptable && r.value == Symbol::str("o2"))
    );

    engine.retract_instantiation(inst).unwrap();
    engine.run_wm_phase().unwrap();
    assert!(engine.graph().slot(slot).unwrap().acceptable_preference_wmes.is_empty());
    assert_eq!(matcher.borrow().removed.iter().filter(|r| r.acceptable).count(), 2);
}

#[test]
fn missing_acceptable_preference_wme_halts() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let slot = engine.graph().operator_slot(s1).unwrap();
    let err = engine
        .acceptable_preference_wme(slot, &Symbol::str("ghost"))
        .unwrap_err();
    assert!(matches!(
        err,
        DecideError::Decision(DecisionError::MissingAcceptableWme { .. })
    ));
    assert!(engine.is_halted());
}

#[test]
fn attribute_impasse_on_ordinary_slot() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    fire(&mut engine, s1, vec![PreferenceSpec::require(s1, "color", "red")]);
    let blue = fire(
        &mut engine,
        s1,
        vec![PreferenceSpec::require(s1, "color", "blue")],
    );
    engine.run_wm_phase().unwrap();
    assert_no_dangling(&engine);

    let color = Symbol::str("color");
    let slot = engine.graph().find_slot(s1, &color).unwrap();
    let s = engine.graph().slot(slot).unwrap();
    assert_eq!(s.impasse_type, ImpasseType::ConstraintFailure);
    assert!(s.wmes.is_empty());
    let imp = s.impasse_id.unwrap();
    assert!(engine.graph().identifier(imp).unwrap().is_impasse);
    assert_eq!(engine.impasse_values(imp, &Symbol::str("object")), vec![Symbol::Id(s1)]);
    assert_eq!(engine.impasse_values(imp, &Symbol::str("attribute")), vec![color.clone()]);
    assert_eq!(
        engine.impasse_values(imp, &Symbol::str("item")),
        vec![Symbol::str("red"), Symbol::str("blue")]
    );
    assert_eq!(engine.stats().attribute_impasses_created, 1);

    engine.retract_instantiation(blue).unwrap();
    engine.run_wm_phase().unwrap();
    assert_no_dangling(&engine);
    assert_eq!(engine.slot_values(s1, &color), vec![Symbol::str("red")]);
    assert!(engine.graph().try_identifier(imp).is_none());
}

#[test]
fn o_supported_preference_outlives_its_firing() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let mode = Symbol::str("mode");
    let inst = fire(
        &mut engine,
        s1,
        vec![PreferenceSpec::acceptable(s1, "mode", "fast").o_supported()],
    );
    let pref = engine.graph().instantiation(inst).unwrap().preferences[0];
    engine.run_wm_phase().unwrap();

    engine.retract_instantiation(inst).unwrap();
    engine.run_wm_phase().unwrap();
    assert_eq!(engine.slot_values(s1, &mode), vec![Symbol::str("fast")]);

    engine.remove_preference(pref).unwrap();
    engine.run_wm_phase().unwrap();
    assert!(engine.slot_values(s1, &mode).is_empty());
    assert!(engine.graph().try_preference(pref).is_none());
    assert!(engine.graph().try_instantiation(inst).is_none());
    assert_eq!(engine.graph().instantiation_count(), 0);
}

// ---------------------------------------------------------------------------
// Ownership and garbage collection
// ---------------------------------------------------------------------------

#[test]
fn sole_value_of_retracted_preference_is_reclaimed() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let o = engine.make_identifier('O', 1);
    let inst = fire(&mut engine, s1, vec![PreferenceSpec::acceptable(s1, "thing", o)]);
    engine.run_wm_phase().unwrap();
    assert_no_dangling(&engine);
    assert!(engine.graph().try_identifier(o).is_some());

    engine.retract_instantiation(inst).unwrap();
    engine.run_wm_phase().unwrap();
    assert_no_dangling(&engine);
    assert!(engine.graph().try_identifier(o).is_none());
}

#[test]
fn reclaimed_identifier_value_is_rejected_before_anything_links() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let o = engine.make_identifier('O', 1);
    engine.do_buffered_wm_and_ownership_changes().unwrap();
    assert!(engine.graph().try_identifier(o).is_none());

    let prefs = engine.graph().preference_count();
    let wmes = engine.graph().wme_count();
    let spec = InstantiationSpec::new("propose", s1)
        .with_preference(PreferenceSpec::acceptable(s1, "a", "ok"))
        .with_preference(PreferenceSpec::acceptable(s1, "thing", o));
    let err = engine.add_instantiation(spec).unwrap_err();
    assert!(matches!(err, DecideError::Graph(_)));
    assert!(engine.add_input_wme(s1, "thing", o).is_err());

    assert!(!engine.is_halted());
    assert_eq!(engine.graph().preference_count(), prefs);
    assert_eq!(engine.graph().instantiation_count(), 0);
    assert_eq!(engine.graph().wme_count(), wmes);
    assert!(engine.graph().identifier(s1).unwrap().input_wmes.is_empty());
    assert!(engine.graph().find_slot(s1, &Symbol::str("a")).is_none());

    engine.run_wm_phase().unwrap();
    assert_no_dangling(&engine);
    fire(&mut engine, s1, vec![PreferenceSpec::acceptable(s1, "a", "ok")]);
    engine.run_wm_phase().unwrap();
    assert_eq!(engine.slot_values(s1, &Symbol::str("a")), vec![Symbol::str("ok")]);
}

#[test]
fn kept_wme_is_rejustified_by_the_surviving_preference() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let color = Symbol::str("color");
    let first = fire(&mut engine, s1, vec![PreferenceSpec::acceptable(s1, "color", "red")]);
    let second = fire(&mut engine, s1, vec![PreferenceSpec::acceptable(s1, "color", "red")]);
    let survivor = engine.graph().instantiation(second).unwrap().preferences[0];
    engine.run_wm_phase().unwrap();

    let slot = engine.graph().find_slot(s1, &color).unwrap();
    let w = engine.graph().slot(slot).unwrap().wmes[0];
    engine.retract_instantiation(first).unwrap();
    engine.run_wm_phase().unwrap();
    assert_no_dangling(&engine);

    let g = engine.graph();
    assert_eq!(g.slot(slot).unwrap().wmes, vec![w]);
    let trace = g.wme(w).unwrap().preference.unwrap();
    assert_eq!(trace, survivor);
    assert!(g.preference(trace).unwrap().in_tm);
    assert!(g.try_instantiation(first).is_none());
}

#[test]
fn unlinked_identifier_and_its_contents_are_deallocated() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let g2 = engine.make_identifier('G', 1);
    let child = engine.make_identifier('C', 1);
    engine.add_input_wme(g2, "color", "red").unwrap();
    engine.add_input_wme(g2, "child", child).unwrap();
    fire(&mut engine, s1, vec![PreferenceSpec::acceptable(g2, "size", "big")]);
    engine.run_wm_phase().unwrap();

    let g = engine.graph();
    assert!(g.try_identifier(g2).is_none());
    assert!(g.try_identifier(child).is_none());
    assert!(g.wmes().all(|(_, w)| w.id != g2));
    assert!(g.preferences().all(|(_, p)| p.id != g2));
    assert!(g.slots().all(|(_, s)| s.id != g2));
    assert_no_dangling(&engine);
}

#[test]
fn promotion_and_demotion_follow_the_shallowest_link() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let DecisionOutcome::Impasse { goal: s2, .. } = cycle(&mut engine) else {
        panic!("expected a state no-change");
    };

    let x = engine.make_identifier('X', 2);
    let y = engine.make_identifier('Y', 2);
    engine.add_input_wme(s2, "x", x).unwrap();
    engine.add_input_wme(x, "y", y).unwrap();
    engine.do_buffered_wm_and_ownership_changes().unwrap();
    assert_eq!(engine.graph().identifier(y).unwrap().level, 2);

    let shared = engine.add_input_wme(s1, "shared", x).unwrap();
    engine.do_buffered_wm_and_ownership_changes().unwrap();
    for id in [x, y] {
        assert_eq!(engine.graph().identifier(id).unwrap().level, 1);
    }
    assert!(engine.stats().promotions >= 1);

    engine.remove_input_wme(shared).unwrap();
    engine.do_buffered_wm_and_ownership_changes().unwrap();
    for id in [x, y] {
        assert_eq!(engine.graph().identifier(id).unwrap().level, 2);
    }
    assert_no_dangling(&engine);
}

#[test]
fn popping_a_goal_reclaims_its_local_structure() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let DecisionOutcome::Impasse { goal: s2, .. } = cycle(&mut engine) else {
        panic!("expected a state no-change");
    };
    let local = engine.make_identifier('L', 2);
    fire(&mut engine, s2, vec![PreferenceSpec::acceptable(s2, "scratch", local)]);
    engine.run_wm_phase().unwrap();
    assert!(engine.graph().try_identifier(local).is_some());

    fire(&mut engine, s1, vec![op(s1, PreferenceType::Acceptable, "go")]);
    assert_eq!(selected(&cycle(&mut engine)), Symbol::str("go"));
    assert!(engine.graph().try_identifier(s2).is_none());
    assert!(engine.graph().try_identifier(local).is_none());
}

#[test]
fn result_returned_to_supergoal_survives_the_subgoal() {
    let mut engine = test_engine();
    let s1 = engine.create_top_goal().unwrap();
    let DecisionOutcome::Impasse { goal: s2, .. } = cycle(&mut engine) else {
        panic!("expected a state no-change");
    };
    let answer = engine.make_identifier('A', 2);
    fire(
        &mut engine,
        s2,
        vec![PreferenceSpec::acceptable(s1, "answer", answer).o_supported()],
    );
    engine.run_wm_phase().unwrap();
    assert_eq!(engine.graph().identifier(answer).unwrap().level, 1);

    engine.clear_goal_stack().unwrap();
    assert!(engine.goal_stack().is_empty());
    assert_eq!(engine.graph().identifier_count(), 0);
    assert_eq!(engine.graph().wme_count(), 0);
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

struct BrokenSelector;

impl Selector for BrokenSelector {
    fn choose(&mut self, _candidates: &[ScoredCandidate]) -> usize {
        99
    }
}

#[test]
fn bad_selector_halts_until_reinitialized() {
    let mut engine = test_engine().with_selector(BrokenSelector);
    let s1 = engine.create_top_goal().unwrap();
    fire(
        &mut engine,
        s1,
        vec![
            op(s1, PreferenceType::Acceptable, "o1"),
            op(s1, PreferenceType::Acceptable, "o2"),
            op(s1, PreferenceType::UnaryIndifferent, "o1"),
            op(s1, PreferenceType::UnaryIndifferent, "o2"),
        ],
    );
    engine.run_wm_phase().unwrap();
    let err = engine.run_decision_phase().unwrap_err();
    assert!(matches!(
        err,
        DecideError::Decision(DecisionError::SelectorOutOfRange { index: 99, len: 2 })
    ));
    assert!(engine.is_halted());
    assert!(matches!(
        engine.run_decision_phase().unwrap_err(),
        DecideError::Decision(DecisionError::Halted)
    ));

    engine.reinitialize();
    assert!(!engine.is_halted());
    let s1 = engine.create_top_goal().unwrap();
    assert_eq!(engine.graph().name(s1), "S1");
}

#[test]
fn goal_depth_limit_is_fatal() {
    let mut engine = Engine::new(EngineConfig {
        max_goal_depth: 2,
        ..Default::default()
    })
    .unwrap();
    engine.create_top_goal().unwrap();
    assert!(matches!(cycle(&mut engine), DecisionOutcome::Impasse { .. }));
    let err = engine.run_decision_phase().unwrap_err();
    assert!(matches!(
        err,
        DecideError::Decision(DecisionError::GoalDepthExceeded { max_depth: 2 })
    ));
    assert!(engine.is_halted());
}

#[test]
fn decision_phase_needs_a_top_goal() {
    let mut engine = test_engine();
    let err = engine.run_decision_phase().unwrap_err();
    assert!(matches!(err, DecideError::Decision(DecisionError::NoTopGoal)));
    assert!(!engine.is_halted());
}
