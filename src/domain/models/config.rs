use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure for spec-refine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Convergence and sub-task execution settings
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// External sub-task commands
    #[serde(default)]
    pub subtasks: SubtasksConfig,

    /// Directory for finalized artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_output_dir() -> String {
    ".spec-refine/output".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            refinement: RefinementConfig::default(),
            subtasks: SubtasksConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".spec-refine/spec-refine.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for stderr logging
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling JSON log files (None = no file output)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Enable stderr logging
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Log file rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Convergence thresholds and sub-task execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RefinementConfig {
    /// Hard ceiling on iterations per automated phase
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Observations required before the stop condition is evaluated
    #[serde(default = "default_min_observations")]
    pub min_observations: u32,

    /// Stop once the open count has been unchanged this many times
    #[serde(default = "default_stable_threshold")]
    pub stable_threshold: u32,

    /// Stop once the open count is at or below this value
    #[serde(default = "default_open_threshold")]
    pub open_threshold: u32,

    /// Stop once the high ratio exceeds this value
    #[serde(default = "default_high_ratio_threshold")]
    pub high_ratio_threshold: f64,

    /// Retries per sub-task before the iteration fails
    #[serde(default = "default_max_subtask_retries")]
    pub max_subtask_retries: u32,

    /// Delay between sub-task retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Wall-clock limit for the research step in seconds
    #[serde(default = "default_research_timeout_secs")]
    pub research_timeout_secs: u64,

    /// Keep findings delivered before a research timeout
    #[serde(default = "default_true")]
    pub accept_partial_findings: bool,
}

const fn default_max_iterations() -> u32 {
    5
}

const fn default_min_observations() -> u32 {
    2
}

const fn default_stable_threshold() -> u32 {
    2
}

const fn default_open_threshold() -> u32 {
    3
}

const fn default_high_ratio_threshold() -> f64 {
    0.8
}

const fn default_max_subtask_retries() -> u32 {
    1
}

const fn default_retry_delay_ms() -> u64 {
    500
}

const fn default_research_timeout_secs() -> u64 {
    600
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            min_observations: default_min_observations(),
            stable_threshold: default_stable_threshold(),
            open_threshold: default_open_threshold(),
            high_ratio_threshold: default_high_ratio_threshold(),
            max_subtask_retries: default_max_subtask_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            research_timeout_secs: default_research_timeout_secs(),
            accept_partial_findings: true,
        }
    }
}

/// Commands implementing the sub-tasks out of process.
///
/// Unset steps fall back to the built-in analyzer and integrator; research
/// has no built-in and must be configured before `run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubtasksConfig {
    #[serde(default)]
    pub analyze: Option<CommandConfig>,
    #[serde(default)]
    pub research: Option<CommandConfig>,
    #[serde(default)]
    pub integrate: Option<CommandConfig>,
}

/// An external program invoked once per sub-task call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}
