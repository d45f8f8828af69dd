//! Rich diagnostic error types for the decision kernel.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Internal invariant violations are
//! fatal: the engine halts on them (see [`DecideError::is_fatal`]). Impasses
//! are ordinary decision results and never show up here.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the decision kernel.
#[derive(Debug, Error, Diagnostic)]
pub enum DecideError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Gc(#[from] GcError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scenario(#[from] ScenarioError),
}

impl DecideError {
    /// Whether this error means the identifier graph is already inconsistent.
    ///
    /// Fatal errors halt the engine; everything else is reported to the caller
    /// and leaves the engine usable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Gc(_) => true,
            Self::Decision(e) => !matches!(e, DecisionError::Halted | DecisionError::NoTopGoal),
            Self::Graph(_) | Self::Config(_) | Self::Scenario(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("stale {kind} handle {handle}")]
    #[diagnostic(
        code(decide::graph::stale_handle),
        help(
            "The entry this handle pointed at has been reclaimed by the garbage \
             collector. Handles must not be kept across a flush unless the \
             entry is known to be reachable."
        )
    )]
    StaleHandle { kind: &'static str, handle: String },

    #[error("identifier {id} is not a goal on the goal stack")]
    #[diagnostic(
        code(decide::graph::not_a_goal),
        help("Instantiations must name a live goal as their match goal.")
    )]
    NotAGoal { id: String },

    #[error("preference type {kind} requires a referent")]
    #[diagnostic(
        code(decide::graph::missing_referent),
        help("Binary preferences (better, worse, binary/numeric indifferent) name a second value.")
    )]
    MissingReferent { kind: String },
}

// ---------------------------------------------------------------------------
// Ownership / GC errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GcError {
    #[error("tried to promote goal or impasse identifier {id} to level {level}")]
    #[diagnostic(
        code(decide::gc::promoted_goal),
        help(
            "Goal and impasse identifiers have fixed levels owned by the goal \
             stack. Some WME or preference links a shallower object to a goal; \
             the graph is inconsistent and the agent has been halted."
        )
    )]
    PromotedGoal { id: String, level: u32 },
}

// ---------------------------------------------------------------------------
// Decision errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DecisionError {
    #[error("context slot of goal {goal} produced {count} winners")]
    #[diagnostic(
        code(decide::decision::multiple_winners),
        help(
            "A context slot admits exactly one winner. This indicates a broken \
             exploration policy or corrupted preference lists; the agent has \
             been halted."
        )
    )]
    MultipleContextWinners { goal: String, count: usize },

    #[error("no acceptable-preference WME for value {value} in slot {slot}")]
    #[diagnostic(
        code(decide::decision::missing_acceptable_wme),
        help(
            "Every acceptable or require preference on a context slot is mirrored \
             by an acceptable-preference WME after a flush. Backtracing found \
             none; the agent has been halted."
        )
    )]
    MissingAcceptableWme { slot: String, value: String },

    #[error("goal stack depth exceeded max-goal-depth ({max_depth})")]
    #[diagnostic(
        code(decide::decision::goal_depth),
        help("Raise `max_goal_depth` in the engine configuration or fix the runaway impasse chain.")
    )]
    GoalDepthExceeded { max_depth: u32 },

    #[error("exploration policy chose index {index} from {len} candidates")]
    #[diagnostic(
        code(decide::decision::selector_out_of_range),
        help("A custom Selector must return an index into the candidate slice.")
    )]
    SelectorOutOfRange { index: usize, len: usize },

    #[error("engine is halted")]
    #[diagnostic(
        code(decide::decision::halted),
        help("A previous fatal error halted the agent. Call `Engine::reinitialize` to start over.")
    )]
    Halted,

    #[error("no top goal exists")]
    #[diagnostic(
        code(decide::decision::no_top_goal),
        help("Call `Engine::create_top_goal` before running phases that need a goal stack.")
    )]
    NoTopGoal,
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(code(decide::config::read), help("Ensure the file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(decide::config::parse),
        help("Check the TOML syntax. `decide config init` writes a file with every key.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config file: {path}")]
    #[diagnostic(code(decide::config::write), help("Check directory permissions."))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(decide::config::invalid), help("Check the EngineConfig fields. {message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Scenario errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ScenarioError {
    #[error("failed to read scenario file: {path}")]
    #[diagnostic(code(decide::scenario::read), help("Ensure the file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario {path}: {message}")]
    #[diagnostic(
        code(decide::scenario::parse),
        help("A scenario is a TOML file with `[[cycle]]` tables listing operator preferences.")
    )]
    Parse { path: String, message: String },

    #[error("scenario has no cycle {index} (it has {len})")]
    #[diagnostic(code(decide::scenario::no_such_cycle), help("Cycles are numbered from 1."))]
    NoSuchCycle { index: usize, len: usize },

    #[error("failed to serialize report: {message}")]
    #[diagnostic(code(decide::scenario::report))]
    Report { message: String },
}

/// Convenience alias for functions returning kernel results.
pub type DecideResult<T> = std::result::Result<T, DecideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_error_converts_and_is_fatal() {
        let err: DecideError = GcError::PromotedGoal {
            id: "S2".into(),
            level: 1,
        }
        .into();
        assert!(matches!(err, DecideError::Gc(GcError::PromotedGoal { .. })));
        assert!(err.is_fatal());
    }

    #[test]
    fn halted_and_misuse_are_not_fatal() {
        let halted: DecideError = DecisionError::Halted.into();
        assert!(!halted.is_fatal());
        let stale: DecideError = GraphError::StaleHandle {
            kind: "wme",
            handle: "w3.1".into(),
        }
        .into();
        assert!(!stale.is_fatal());
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = DecisionError::MultipleContextWinners {
            goal: "S1".into(),
            count: 2,
        };
        let msg = format!("{err}");
        assert!(msg.contains("S1"));
        assert!(msg.contains('2'));
    }
}
