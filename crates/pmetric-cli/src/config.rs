//! `pmetric.toml` configuration
//!
//! Every field has a default, so an empty or missing file is valid.
//! Command-line flags override file values.

use anyhow::{Context, Result};
use pmetric_concolic::{EngineOptions, ExplorationBudget};
use pmetric_metrics::NOMINAL_POINTS_PER_MEMBER;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "pmetric.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub exploration: ExplorationConfig,
    pub sprint: SprintConfig,
}

/// Test-generation limits and engine tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorationConfig {
    /// Paths resolved per routine, 0 for unbounded
    pub max_paths: usize,
    /// Wall-clock limit per routine, 0 for unbounded
    pub max_duration_ms: u64,
    pub unroll_bound: usize,
    pub solver_timeout_ms: u64,
    pub probe_attempts: usize,
    pub seed: u64,
    pub replay_fuel: usize,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        let budget = ExplorationBudget::default();
        let options = EngineOptions::default();
        Self {
            max_paths: budget.max_paths.unwrap_or(0),
            max_duration_ms: budget
                .max_duration
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            unroll_bound: options.unroll_bound,
            solver_timeout_ms: u64::try_from(options.solver_timeout.as_millis()).unwrap_or(u64::MAX),
            probe_attempts: options.probe_attempts,
            seed: options.seed,
            replay_fuel: options.replay_fuel,
        }
    }
}

impl ExplorationConfig {
    pub fn budget(&self) -> ExplorationBudget {
        let mut budget = ExplorationBudget::unbounded();
        if self.max_paths > 0 {
            budget = budget.with_max_paths(self.max_paths);
        }
        if self.max_duration_ms > 0 {
            budget = budget.with_max_duration(Duration::from_millis(self.max_duration_ms));
        }
        budget
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            unroll_bound: self.unroll_bound,
            solver_timeout: Duration::from_millis(self.solver_timeout_ms),
            probe_attempts: self.probe_attempts,
            seed: self.seed,
            replay_fuel: self.replay_fuel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SprintConfig {
    /// Capacity of one fully available member
    pub points_per_member: f64,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            points_per_member: NOMINAL_POINTS_PER_MEMBER,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Explicit path, else `pmetric.toml` in the working directory, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            tracing::debug!(path = %fallback.display(), "using configuration from working directory");
            Self::from_file(&fallback)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_uses_engine_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.exploration.budget(), ExplorationBudget::default());
        assert_eq!(config.exploration.engine_options(), EngineOptions::default());
        assert_eq!(config.sprint.points_per_member, 10.0);
    }

    #[test]
    fn zero_limits_mean_unbounded() {
        let config = Config::from_toml(
            r#"
            [exploration]
            max_paths = 0
            max_duration_ms = 0
            unroll_bound = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.exploration.budget(), ExplorationBudget::unbounded());
        assert_eq!(config.exploration.engine_options().unroll_bound, 5);
        assert_eq!(config.exploration.probe_attempts, 32);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("[exploration]\nmax_pathz = 3\n").is_err());
    }

    #[test]
    fn sprint_rate_is_read() {
        let config = Config::from_toml("[sprint]\npoints_per_member = 8.0\n").unwrap();
        assert_eq!(config.sprint.points_per_member, 8.0);
    }
}
