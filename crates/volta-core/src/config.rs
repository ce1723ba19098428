//! Analysis configuration.
//!
//! Every option has a serde default so partial TOML files are valid:
//!
//! ```toml
//! [power_flow]
//! tolerance = 1e-8
//! control_q = "direct"
//!
//! [contingency.srap]
//! enabled = true
//! budget_mw = 800.0
//! ```

use crate::error::{VoltaError, VoltaResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reactive power limit handling inside the Newton loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReactivePowerControl {
    /// Ignore Qmin/Qmax
    #[default]
    NoControl,
    /// PV-type buses violating a limit become PQ with Q pinned at the bound
    Direct,
}

/// Newton-Raphson options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerFlowOptions {
    /// Convergence tolerance on the infinity norm of the mismatch (p.u.)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Outer iteration limit, also bounding backtracking retries
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Initial step multiplier
    #[serde(default = "default_mu0")]
    pub mu0: f64,
    /// Factor applied to the step multiplier on each failed trial
    #[serde(default = "default_backtrack_decay")]
    pub backtrack_decay: f64,
    #[serde(default)]
    pub control_q: ReactivePowerControl,
    /// Mismatch norm below which reactive limits are checked
    #[serde(default = "default_q_control_threshold")]
    pub q_control_threshold: f64,
    /// Rebuild the admittances from converter currents after every step
    #[serde(default)]
    pub model_converter_losses: bool,
    /// Leave single-bus islands unsolved
    #[serde(default = "default_true")]
    pub ignore_single_node_islands: bool,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iter: default_max_iter(),
            mu0: default_mu0(),
            backtrack_decay: default_backtrack_decay(),
            control_q: ReactivePowerControl::default(),
            q_control_threshold: default_q_control_threshold(),
            model_converter_losses: false,
            ignore_single_node_islands: true,
        }
    }
}

impl PowerFlowOptions {
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_q_control(mut self, control: ReactivePowerControl) -> Self {
        self.control_q = control;
        self
    }

    pub fn with_q_control_threshold(mut self, threshold: f64) -> Self {
        self.q_control_threshold = threshold;
        self
    }

    pub fn with_backtracking(mut self, mu0: f64, decay: f64) -> Self {
        self.mu0 = mu0;
        self.backtrack_decay = decay;
        self
    }

    pub fn with_converter_losses(mut self, enable: bool) -> Self {
        self.model_converter_losses = enable;
        self
    }

    pub fn validate(&self) -> VoltaResult<()> {
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(VoltaError::Config("tolerance must be positive".into()));
        }
        if self.max_iter == 0 {
            return Err(VoltaError::Config("max_iter must be at least 1".into()));
        }
        if self.mu0.is_nan() || self.mu0 <= 0.0 {
            return Err(VoltaError::Config("mu0 must be positive".into()));
        }
        if !(self.backtrack_decay > 0.0 && self.backtrack_decay < 1.0) {
            return Err(VoltaError::Config(
                "backtrack_decay must lie in (0, 1)".into(),
            ));
        }
        if self.q_control_threshold < self.tolerance {
            return Err(VoltaError::Config(
                "q_control_threshold must not be below tolerance".into(),
            ));
        }
        Ok(())
    }
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_max_iter() -> usize {
    25
}

fn default_mu0() -> f64 {
    1.0
}

fn default_backtrack_decay() -> f64 {
    0.05
}

fn default_q_control_threshold() -> f64 {
    1e-2
}

fn default_true() -> bool {
    true
}

/// PTDF/LODF options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearAnalysisOptions {
    /// Balance injections across the island instead of at the slack
    #[serde(default)]
    pub distributed_slack: bool,
    /// Zero LODF values outside [-1.2, 1.2]
    #[serde(default)]
    pub correct_values: bool,
    /// |1 - h_kk| below this marks a radial branch
    #[serde(default = "default_numerical_zero")]
    pub numerical_zero: f64,
}

impl Default for LinearAnalysisOptions {
    fn default() -> Self {
        Self {
            distributed_slack: false,
            correct_values: false,
            numerical_zero: default_numerical_zero(),
        }
    }
}

fn default_numerical_zero() -> f64 {
    1e-10
}

/// Which engine evaluates the contingencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContingencyEngine {
    /// PTDF/LODF superposition
    #[default]
    Linear,
    /// Full Newton-Raphson per contingency group
    PowerFlow,
}

/// SRAP (remedial action) options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrapOptions {
    #[serde(default)]
    pub enabled: bool,
    /// SRAP-adjusted rate as a multiple of the normal rate
    #[serde(default = "default_srap_max_loading")]
    pub max_loading: f64,
    /// Redispatch budget (MW)
    #[serde(default = "default_srap_budget")]
    pub budget_mw: f64,
    /// Candidates kept after ranking
    #[serde(default = "default_srap_top_n")]
    pub top_n: usize,
}

impl Default for SrapOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            max_loading: default_srap_max_loading(),
            budget_mw: default_srap_budget(),
            top_n: default_srap_top_n(),
        }
    }
}

fn default_srap_max_loading() -> f64 {
    1.4
}

fn default_srap_budget() -> f64 {
    1400.0
}

fn default_srap_top_n() -> usize {
    5
}

/// Contingency analysis options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyOptions {
    #[serde(default)]
    pub engine: ContingencyEngine,
    /// LODF/PTDF factors below this magnitude are skipped
    #[serde(default = "default_contribution_threshold")]
    pub contribution_threshold: f64,
    #[serde(default)]
    pub srap: SrapOptions,
}

impl Default for ContingencyOptions {
    fn default() -> Self {
        Self {
            engine: ContingencyEngine::default(),
            contribution_threshold: default_contribution_threshold(),
            srap: SrapOptions::default(),
        }
    }
}

fn default_contribution_threshold() -> f64 {
    1e-5
}

/// Aggregate configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub power_flow: PowerFlowOptions,
    #[serde(default)]
    pub linear: LinearAnalysisOptions,
    #[serde(default)]
    pub contingency: ContingencyOptions,
}

impl AnalysisConfig {
    pub fn from_toml_str(contents: &str) -> VoltaResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> VoltaResult<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> VoltaResult<String> {
        toml::to_string_pretty(self).map_err(|e| VoltaError::Config(e.to_string()))
    }

    pub fn validate(&self) -> VoltaResult<()> {
        self.power_flow.validate()?;
        if self.linear.numerical_zero < 0.0 {
            return Err(VoltaError::Config("numerical_zero must be >= 0".into()));
        }
        let srap = &self.contingency.srap;
        if srap.budget_mw < 0.0 {
            return Err(VoltaError::Config("srap budget_mw must be >= 0".into()));
        }
        if srap.max_loading < 1.0 {
            return Err(VoltaError::Config("srap max_loading must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.power_flow.mu0, 1.0);
        assert_eq!(cfg.power_flow.backtrack_decay, 0.05);
        assert_eq!(cfg.power_flow.q_control_threshold, 1e-2);
        assert_eq!(cfg.contingency.srap.top_n, 5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
            [power_flow]
            tolerance = 1e-8
            control_q = "direct"

            [contingency]
            engine = "power_flow"

            [contingency.srap]
            enabled = true
            budget_mw = 800.0
        "#;
        let cfg = AnalysisConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.power_flow.tolerance, 1e-8);
        assert_eq!(cfg.power_flow.control_q, ReactivePowerControl::Direct);
        assert_eq!(cfg.power_flow.max_iter, 25);
        assert_eq!(cfg.contingency.engine, ContingencyEngine::PowerFlow);
        assert!(cfg.contingency.srap.enabled);
        assert_eq!(cfg.contingency.srap.budget_mw, 800.0);
        assert_eq!(cfg.contingency.srap.max_loading, 1.4);
    }

    #[test]
    fn test_invalid_decay_rejected() {
        let toml = "[power_flow]\nbacktrack_decay = 1.5\n";
        let err = AnalysisConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, VoltaError::Config(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = AnalysisConfig::from_toml_str("[power_flow\n").unwrap_err();
        assert!(matches!(err, VoltaError::Parse(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let cfg = AnalysisConfig::default();
        let text = cfg.to_toml_string().unwrap();
        let back = AnalysisConfig::from_toml_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AnalysisConfig::load(&dir.path().join("volta.toml")).unwrap();
        assert_eq!(cfg, AnalysisConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volta.toml");
        std::fs::write(&path, "[linear]\ndistributed_slack = true\n").unwrap();
        let cfg = AnalysisConfig::load(&path).unwrap();
        assert!(cfg.linear.distributed_slack);
    }

    #[test]
    fn test_json_serialization() {
        let json = serde_json::to_string(&SrapOptions::default()).unwrap();
        assert!(json.contains("\"budget_mw\":1400.0"));
    }
}
