//! Gateway configuration, deserialized from `warden.toml`.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Extra writable root outside the workspace, validated at startup.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            temp_dir: None,
            shell: ShellConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_shell_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shell_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Size of the model's context window, in tokens.
    #[serde(default = "default_total_context_tokens")]
    pub total_context_tokens: usize,
    /// Fraction of the remaining context one tool result may occupy.
    #[serde(default = "default_max_context_percent")]
    pub max_context_percent: f64,
    /// Truncation never leaves a result smaller than this.
    #[serde(default = "default_min_token_floor")]
    pub min_token_floor: usize,
    /// Context usage fractions at which truncation tightens.
    #[serde(default = "default_moderate_threshold")]
    pub moderate_threshold: f64,
    #[serde(default = "default_aggressive_threshold")]
    pub aggressive_threshold: f64,
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_context_tokens: default_total_context_tokens(),
            max_context_percent: default_max_context_percent(),
            min_token_floor: default_min_token_floor(),
            moderate_threshold: default_moderate_threshold(),
            aggressive_threshold: default_aggressive_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

fn default_max_batch_size() -> usize {
    25
}

fn default_shell_timeout_secs() -> u64 {
    30
}

fn default_total_context_tokens() -> usize {
    200_000
}

fn default_max_context_percent() -> f64 {
    0.25
}

fn default_min_token_floor() -> usize {
    500
}

fn default_moderate_threshold() -> f64 {
    0.5
}

fn default_aggressive_threshold() -> f64 {
    0.7
}

fn default_critical_threshold() -> f64 {
    0.85
}
