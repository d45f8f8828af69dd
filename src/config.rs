//! Engine configuration, stored as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DecideResult};
use crate::explore::SelectionPolicy;

/// How numeric-indifferent contributions to a candidate combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumericMode {
    #[default]
    Sum,
    Average,
}

/// Tie-break policy for fully indifferent candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationConfig {
    #[serde(default)]
    pub policy: SelectionPolicy,
    /// Exploration probability for `epsilon-greedy`, in `[0, 1]`.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Temperature for `boltzmann`; must be positive.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Fixed RNG seed. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_epsilon() -> f64 {
    0.1
}
fn default_temperature() -> f64 {
    25.0
}
fn default_true() -> bool {
    true
}
fn default_max_goal_depth() -> u32 {
    100
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            epsilon: default_epsilon(),
            temperature: default_temperature(),
            seed: None,
        }
    }
}

/// Configuration for the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub numeric_indifferent_mode: NumericMode,
    /// Value of a candidate with no numeric preferences.
    #[serde(default)]
    pub default_numeric_value: f64,
    /// Create impasse identifiers for constraint failures on ordinary slots.
    #[serde(default = "default_true")]
    pub attribute_impasses: bool,
    /// Track goal dependency sets for o-supported results of sub-goals.
    #[serde(default = "default_true")]
    pub gds: bool,
    /// Deepest goal level the stack may reach.
    #[serde(default = "default_max_goal_depth")]
    pub max_goal_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exploration: ExplorationConfig::default(),
            numeric_indifferent_mode: NumericMode::default(),
            default_numeric_value: 0.0,
            attribute_impasses: true,
            gds: true,
            max_goal_depth: default_max_goal_depth(),
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> DecideResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message }.into());
        let ex = &self.exploration;
        if !(0.0..=1.0).contains(&ex.epsilon) {
            return invalid(format!("epsilon must be in [0, 1], got {}", ex.epsilon));
        }
        if !ex.temperature.is_finite() || ex.temperature <= 0.0 {
            return invalid(format!("temperature must be positive, got {}", ex.temperature));
        }
        if !self.default_numeric_value.is_finite() {
            return invalid("default_numeric_value must be finite".into());
        }
        if self.max_goal_depth == 0 {
            return invalid("max_goal_depth must be at least 1".into());
        }
        Ok(())
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> DecideResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> DecideResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}
