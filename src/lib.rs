// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # decide-kernel
//!
//! The decision core of a production-rule architecture: preference
//! resolution, the goal/sub-goal stack, and link-count garbage collection of
//! working memory.
//!
//! ## Architecture
//!
//! - **Identifier graph** (`graph`): identifiers, slots, WMEs, preferences in
//!   generation-checked arenas
//! - **Preference resolution** (`resolve`): slot preferences to winners or an impasse
//! - **Ownership** (`gc`): link counts, promotion, demotion, reclamation
//! - **Decision procedure** (`decide`): context slots, sub-goals, attribute impasses
//! - **Goal dependency sets** (`gds`): retract sub-goals whose results went stale
//! - **Exploration** (`explore`): first/last/random/softmax/epsilon-greedy/boltzmann
//!
//! ## Library usage
//!
//! ```no_run
//! use decide_kernel::config::EngineConfig;
//! use decide_kernel::engine::{DecisionOutcome, Engine};
//! use decide_kernel::graph::{InstantiationSpec, PreferenceSpec};
//!
//! let mut engine = Engine::new(EngineConfig::default()).unwrap();
//! let s1 = engine.create_top_goal().unwrap();
//! engine
//!     .add_instantiation(
//!         InstantiationSpec::new("propose-wait", s1)
//!             .with_preference(PreferenceSpec::acceptable(s1, "operator", "wait")),
//!     )
//!     .unwrap();
//! engine.run_wm_phase().unwrap();
//! let outcome = engine.run_decision_phase().unwrap();
//! assert!(matches!(outcome, DecisionOutcome::Selected { .. }));
//! ```

pub mod arena;
pub mod config;
pub mod decide;
pub mod engine;
pub mod error;
pub mod explore;
pub mod gc;
pub mod gds;
pub mod graph;
pub mod hooks;
pub mod resolve;
pub mod scenario;
pub mod symbol;
pub mod wm;
