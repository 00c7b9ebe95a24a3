//! Concrete probing
//!
//! Fallback for paths the solver cannot decide: run the routine on a fixed
//! sequence of candidate inputs and keep the first one whose execution
//! follows the target path. Boundary values are tried first, then
//! deterministic pseudo-random draws.

use pmetric_core::{Assignment, Domain, InputDecl, Value};
use std::time::Instant;

use crate::cfg::ControlFlowGraph;
use crate::interp::{self, Execution};
use crate::paths::PathSignature;

/// SplitMix64, enough for reproducible input sampling
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform-ish value in `min..=max`
    pub fn in_range(&mut self, min: i64, max: i64) -> i64 {
        let span = (i128::from(max) - i128::from(min) + 1) as u128;
        let offset = u128::from(self.next_u64()) % span;
        i64::try_from(i128::from(min) + offset as i128).unwrap_or(min)
    }

    fn sample(&mut self, domain: Domain) -> Value {
        match domain {
            Domain::Int { min, max } => Value::Int(self.in_range(min, max)),
            Domain::Bool => Value::Bool(self.next_u64() & 1 == 1),
        }
    }
}

/// Probing parameters
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    /// Pseudo-random draws after the boundary candidates
    pub attempts: usize,
    pub seed: u64,
    /// Node visits allowed per run
    pub fuel: usize,
    pub deadline: Option<Instant>,
}

/// Inputs at every domain's edges: all defaults, all minima, all maxima,
/// then each input alone at its minimum and maximum
pub fn boundary_candidates(inputs: &[InputDecl]) -> Vec<Assignment> {
    let defaults = || -> Assignment {
        inputs
            .iter()
            .map(|i| (i.name.clone(), i.domain.default_value()))
            .collect()
    };
    let low = |d: Domain| match d {
        Domain::Int { min, .. } => Value::Int(min),
        Domain::Bool => Value::Bool(false),
    };
    let high = |d: Domain| match d {
        Domain::Int { max, .. } => Value::Int(max),
        Domain::Bool => Value::Bool(true),
    };

    let mut candidates = vec![
        defaults(),
        inputs.iter().map(|i| (i.name.clone(), low(i.domain))).collect(),
        inputs.iter().map(|i| (i.name.clone(), high(i.domain))).collect(),
    ];
    for input in inputs {
        for value in [low(input.domain), high(input.domain)] {
            candidates.push(defaults().with(input.name.clone(), value));
        }
    }

    let mut unique: Vec<Assignment> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

/// Search for inputs whose run follows `target`
pub fn probe(
    cfg: &ControlFlowGraph,
    target: &PathSignature,
    config: &ProbeConfig,
) -> Option<(Assignment, Execution)> {
    let inputs = cfg.inputs();
    let mut rng = SplitMix64::new(config.seed);

    let random = (0..config.attempts).map(|_| {
        inputs
            .iter()
            .map(|i| (i.name.clone(), rng.sample(i.domain)))
            .collect::<Assignment>()
    });

    for candidate in boundary_candidates(inputs).into_iter().chain(random) {
        if config.deadline.is_some_and(|d| Instant::now() >= d) {
            return None;
        }
        let run = interp::execute(cfg, &candidate, config.fuel);
        if run.signature() == *target {
            return Some((candidate, run));
        }
    }
    None
}
