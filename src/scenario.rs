//! TOML scenarios for the `decide` binary.
//!
//! A scenario is a list of cycles. Each cycle asserts a set of operator
//! preferences (on the top goal unless a preference names a deeper goal
//! level), optionally forces a selection, and runs one decision phase. By
//! default the previous cycle's preferences are retracted first.
//!
//! ```toml
//! name = "pick one"
//!
//! [[cycle]]
//! preferences = [
//!     { type = "acceptable", value = "north" },
//!     { type = "acceptable", value = "south" },
//!     { type = "better", value = "north", referent = "south" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::engine::{DecisionOutcome, Engine, EngineStats};
use crate::error::{DecideResult, ScenarioError};
use crate::graph::{
    GoalLevel, ImpasseType, InstId, InstantiationSpec, PreferenceSpec, PreferenceType, TOP_GOAL_LEVEL,
};
use crate::resolve::ResolveMode;
use crate::symbol::Symbol;

/// A constant as written in a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&ScenarioValue> for Symbol {
    fn from(v: &ScenarioValue) -> Self {
        match v {
            ScenarioValue::Int(i) => Symbol::Int(*i),
            ScenarioValue::Float(f) => Symbol::Float(*f),
            ScenarioValue::Str(s) => Symbol::str(s),
        }
    }
}

/// One operator preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceEntry {
    #[serde(rename = "type")]
    pub kind: PreferenceType,
    pub value: ScenarioValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referent: Option<ScenarioValue>,
    /// Goal level whose operator slot receives the preference.
    #[serde(default = "default_goal_level")]
    pub goal: GoalLevel,
}

fn default_goal_level() -> GoalLevel {
    TOP_GOAL_LEVEL
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleSpec {
    #[serde(default)]
    pub preferences: Vec<PreferenceEntry>,
    /// Operator to force for this decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<String>,
    /// Keep the previous cycle's preferences instead of retracting them.
    #[serde(default)]
    pub keep_previous: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "cycle")]
    pub cycles: Vec<CycleSpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> DecideResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ScenarioError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn parse(content: &str, origin: &str) -> DecideResult<Self> {
        let scenario = toml::from_str(content).map_err(|e| ScenarioError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Ok(scenario)
    }

    fn cycle(&self, index: usize) -> DecideResult<&CycleSpec> {
        index
            .checked_sub(1)
            .and_then(|i| self.cycles.get(i))
            .ok_or_else(|| {
                ScenarioError::NoSuchCycle {
                    index,
                    len: self.cycles.len(),
                }
                .into()
            })
    }
}

/// How one decision phase ended, with names instead of handles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OutcomeReport {
    Selected {
        goal: String,
        operator: String,
        forced: bool,
    },
    Impasse {
        goal: String,
        supergoal: String,
        impasse: ImpasseType,
        attribute: String,
        items: Vec<String>,
    },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: usize,
    pub outcome: OutcomeReport,
    /// Goal stack from the top down after the cycle.
    pub goals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub cycles: Vec<CycleReport>,
    pub stats: EngineStats,
}

/// Result of resolving one cycle's top-goal preferences without deciding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveReport {
    pub cycle: usize,
    pub impasse: ImpasseType,
    pub candidates: Vec<String>,
    pub forced: bool,
}

/// Run up to `limit` cycles of `scenario` on a fresh engine.
pub fn run(scenario: &Scenario, config: EngineConfig, limit: Option<usize>) -> DecideResult<ScenarioReport> {
    let mut engine = Engine::new(config)?;
    engine.create_top_goal()?;
    let mut previous: Vec<InstId> = Vec::new();
    let mut cycles = Vec::new();

    let limit = limit.unwrap_or(scenario.cycles.len());
    for (i, cycle) in scenario.cycles.iter().take(limit).enumerate() {
        let number = i + 1;
        if !cycle.keep_previous {
            for inst in previous.drain(..) {
                if engine.graph().try_instantiation(inst).is_some() {
                    engine.retract_instantiation(inst)?;
                }
            }
        }
        previous.extend(assert_cycle(&mut engine, cycle, number)?);
        if let Some(force) = &cycle.force {
            engine.force_selection(Symbol::str(force));
        }
        engine.run_wm_phase()?;
        let outcome = engine.run_decision_phase()?;
        let report = CycleReport {
            cycle: number,
            outcome: outcome_report(&engine, &outcome),
            goals: engine
                .goal_stack()
                .into_iter()
                .map(|g| engine.graph().name(g))
                .collect(),
        };
        tracing::info!(cycle = number, outcome = ?report.outcome, "cycle complete");
        cycles.push(report);
    }

    Ok(ScenarioReport {
        name: scenario.name.clone(),
        cycles,
        stats: engine.stats(),
    })
}

/// Resolve the top goal's operator slot after asserting cycle `index`
/// (1-based) on a fresh engine.
pub fn resolve(scenario: &Scenario, config: EngineConfig, index: usize, mode: ResolveMode) -> DecideResult<ResolveReport> {
    let cycle = scenario.cycle(index)?;
    let mut engine = Engine::new(config)?;
    let top = engine.create_top_goal()?;
    assert_cycle(&mut engine, cycle, index)?;
    engine.run_wm_phase()?;

    let slot = engine.graph().operator_slot(top)?;
    let res = engine.resolve_slot(slot, mode)?;
    let mut candidates = Vec::with_capacity(res.candidates.len());
    for p in &res.candidates {
        candidates.push(engine.graph().display(&engine.graph().preference(*p)?.value));
    }
    Ok(ResolveReport {
        cycle: index,
        impasse: res.impasse,
        candidates,
        forced: res.forced,
    })
}

/// Assert a cycle's preferences, one instantiation per goal level.
fn assert_cycle(engine: &mut Engine, cycle: &CycleSpec, number: usize) -> DecideResult<Vec<InstId>> {
    let mut by_level: BTreeMap<GoalLevel, Vec<&PreferenceEntry>> = BTreeMap::new();
    for entry in &cycle.preferences {
        by_level.entry(entry.goal).or_default().push(entry);
    }

    let operator = engine.graph().well_known().operator.clone();
    let mut insts = Vec::new();
    for (level, entries) in by_level {
        let Some(goal) = engine.goal_at_level(level) else {
            tracing::warn!(cycle = number, level, "no goal at this level; preferences skipped");
            continue;
        };
        let mut spec = InstantiationSpec::new(format!("cycle-{number}-level-{level}"), goal);
        for entry in entries {
            let mut pref = PreferenceSpec::new(entry.kind, goal, operator.clone(), Symbol::from(&entry.value));
            if let Some(referent) = &entry.referent {
                pref = pref.with_referent(Symbol::from(referent));
            }
            spec = spec.with_preference(pref);
        }
        insts.push(engine.add_instantiation(spec)?);
    }
    Ok(insts)
}

fn outcome_report(engine: &Engine, outcome: &DecisionOutcome) -> OutcomeReport {
    let graph = engine.graph();
    match outcome {
        DecisionOutcome::Selected { goal, value, forced } => OutcomeReport::Selected {
            goal: graph.name(*goal),
            operator: graph.display(value),
            forced: *forced,
        },
        DecisionOutcome::Impasse {
            goal,
            supergoal,
            impasse,
            attribute,
        } => OutcomeReport::Impasse {
            goal: graph.name(*goal),
            supergoal: graph.name(*supergoal),
            impasse: *impasse,
            attribute: graph.display(attribute),
            items: engine
                .impasse_values(*goal, &graph.well_known().item)
                .iter()
                .map(|v| graph.display(v))
                .collect(),
        },
        DecisionOutcome::Unchanged => OutcomeReport::Unchanged,
    }
}

impl ScenarioReport {
    pub fn to_json(&self) -> DecideResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            ScenarioError::Report {
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl std::fmt::Display for OutcomeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Selected { goal, operator, forced } => {
                write!(f, "{goal}: selected {operator}")?;
                if *forced {
                    write!(f, " (forced)")?;
                }
                Ok(())
            }
            Self::Impasse {
                goal,
                supergoal,
                impasse,
                attribute,
                items,
            } => write!(
                f,
                "{supergoal}: {impasse} impasse on {attribute}, new goal {goal} [{}]",
                items.join(", ")
            ),
            Self::Unchanged => write!(f, "no change"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name = "pick"

[[cycle]]
preferences = [
    { type = "acceptable", value = "north" },
    { type = "acceptable", value = "south" },
    { type = "better", value = "north", referent = "south" },
]

[[cycle]]
preferences = [
    { type = "acceptable", value = "east" },
    { type = "acceptable", value = "west" },
]
"#;

    #[test]
    fn parses_cycles_and_defaults() {
        let s = Scenario::parse(SCENARIO, "inline").unwrap();
        assert_eq!(s.name, "pick");
        assert_eq!(s.cycles.len(), 2);
        let first = &s.cycles[0].preferences[2];
        assert_eq!(first.kind, PreferenceType::Better);
        assert_eq!(first.goal, TOP_GOAL_LEVEL);
        assert_eq!(first.referent, Some(ScenarioValue::Str("south".into())));
    }

    #[test]
    fn run_selects_then_ties() {
        let s = Scenario::parse(SCENARIO, "inline").unwrap();
        let report = run(&s, EngineConfig::default(), None).unwrap();
        assert_eq!(
            report.cycles[0].outcome,
            OutcomeReport::Selected {
                goal: "S1".into(),
                operator: "north".into(),
                forced: false,
            }
        );
        // North lost its support, so the slot is decided again and ties.
        let OutcomeReport::Impasse { impasse, items, .. } = &report.cycles[1].outcome else {
            panic!("expected an impasse, got {:?}", report.cycles[1].outcome);
        };
        assert_eq!(*impasse, ImpasseType::Tie);
        assert_eq!(items, &vec!["east".to_string(), "west".to_string()]);
        assert_eq!(report.cycles[1].goals, vec!["S1".to_string(), "S2".to_string()]);
        assert!(report.to_json().unwrap().contains("\"kind\": \"impasse\""));
    }

    #[test]
    fn resolve_reports_candidates_without_deciding() {
        let s = Scenario::parse(SCENARIO, "inline").unwrap();
        let report = resolve(&s, EngineConfig::default(), 2, ResolveMode::ConsistencyCheck).unwrap();
        assert_eq!(report.impasse, ImpasseType::Tie);
        assert_eq!(report.candidates, vec!["east".to_string(), "west".to_string()]);

        let err = resolve(&s, EngineConfig::default(), 3, ResolveMode::Commit).unwrap_err();
        assert!(matches!(
            err,
            crate::error::DecideError::Scenario(ScenarioError::NoSuchCycle { index: 3, len: 2 })
        ));
    }

    #[test]
    fn malformed_scenario_is_a_parse_error() {
        let err = Scenario::parse("[[cycle]]\npreferences = [{ type = \"sideways\", value = 1 }]", "bad").unwrap_err();
        assert!(matches!(
            err,
            crate::error::DecideError::Scenario(ScenarioError::Parse { .. })
        ));
    }
}
