//! Exploration: picking one winner among fully indifferent candidates.
//!
//! The resolver hands a [`Selector`] the surviving candidates together with
//! their combined numeric-indifferent values and gets back an index. The
//! stock implementation, [`Exploration`], covers the usual policies; tests
//! and embedders can plug in their own.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::ExplorationConfig;
use crate::symbol::Symbol;

/// Named tie-break policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    #[default]
    First,
    Last,
    RandomUniform,
    Softmax,
    EpsilonGreedy,
    Boltzmann,
}

impl SelectionPolicy {
    pub fn name(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
            Self::RandomUniform => "random-uniform",
            Self::Softmax => "softmax",
            Self::EpsilonGreedy => "epsilon-greedy",
            Self::Boltzmann => "boltzmann",
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "random-uniform" => Ok(Self::RandomUniform),
            "softmax" => Ok(Self::Softmax),
            "epsilon-greedy" => Ok(Self::EpsilonGreedy),
            "boltzmann" => Ok(Self::Boltzmann),
            other => Err(format!("unknown selection policy '{other}'")),
        }
    }
}

/// A candidate offered to a [`Selector`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub value: Symbol,
    /// Combined numeric-indifferent value (or the configured default).
    pub numeric_value: f64,
}

/// Chooses exactly one of a non-empty candidate list.
pub trait Selector {
    /// Index of the winner in `candidates`.
    fn choose(&mut self, candidates: &[ScoredCandidate]) -> usize;

    /// Name reported in traces.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Built-in selector driven by [`ExplorationConfig`].
pub struct Exploration {
    policy: SelectionPolicy,
    epsilon: f64,
    temperature: f64,
    rng: StdRng,
}

impl Exploration {
    pub fn new(config: &ExplorationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            policy: config.policy,
            epsilon: config.epsilon.clamp(0.0, 1.0),
            temperature: config.temperature,
            rng,
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    fn uniform(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Sample an index proportionally to `weights`; uniform when they carry
    /// no mass.
    fn weighted(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return self.uniform(weights.len());
        }
        let mut r = self.rng.gen_range(0.0..total);
        for (i, w) in weights.iter().enumerate() {
            if r < *w {
                return i;
            }
            r -= w;
        }
        weights.len() - 1
    }

    fn greedy(&mut self, candidates: &[ScoredCandidate]) -> usize {
        let best = candidates
            .iter()
            .map(|c| c.numeric_value)
            .fold(f64::NEG_INFINITY, f64::max);
        let ties: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.numeric_value == best)
            .map(|(i, _)| i)
            .collect();
        match ties.len() {
            0 => 0,
            1 => ties[0],
            n => ties[self.uniform(n)],
        }
    }
}

impl Selector for Exploration {
    fn choose(&mut self, candidates: &[ScoredCandidate]) -> usize {
        let len = candidates.len();
        if len <= 1 {
            return 0;
        }
        match self.policy {
            SelectionPolicy::First => 0,
            SelectionPolicy::Last => len - 1,
            SelectionPolicy::RandomUniform => self.uniform(len),
            SelectionPolicy::Softmax => {
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|c| c.numeric_value.max(0.0))
                    .collect();
                self.weighted(&weights)
            }
            SelectionPolicy::EpsilonGreedy => {
                if self.rng.gen_bool(self.epsilon) {
                    self.uniform(len)
                } else {
                    self.greedy(candidates)
                }
            }
            SelectionPolicy::Boltzmann => {
                let max = candidates
                    .iter()
                    .map(|c| c.numeric_value)
                    .fold(f64::NEG_INFINITY, f64::max);
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|c| ((c.numeric_value - max) / self.temperature).exp())
                    .collect();
                self.weighted(&weights)
            }
        }
    }

    fn name(&self) -> &str {
        self.policy.name()
    }
}
