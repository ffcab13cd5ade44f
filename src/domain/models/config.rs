use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for QAAP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Resource ceilings and control-loop timing
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Output file names
    #[serde(default)]
    pub output: OutputConfig,

    /// Workflow definition to load instead of the built-in one
    #[serde(default)]
    pub workflow: Option<PathBuf>,
}

/// Scheduler configuration. `None` caps mean "use everything available".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    #[serde(default)]
    pub max_cpus: Option<u32>,

    #[serde(default)]
    pub max_mem_gb: Option<f64>,

    #[serde(default)]
    pub max_disk_gb: Option<f64>,

    /// Overall wall-clock budget for the run
    #[serde(default)]
    pub max_time_secs: Option<u64>,

    /// Seconds between control-loop polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

const fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_cpus: None,
            max_mem_gb: None,
            max_disk_gb: None,
            max_time_secs: None,
            poll_interval_secs: default_poll_interval_secs(),
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

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Names of the files written into the output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputConfig {
    #[serde(default = "default_results_file")]
    pub results_file: String,

    #[serde(default = "default_summary_file")]
    pub summary_file: String,
}

fn default_results_file() -> String {
    "qaap-results.json".to_string()
}

fn default_summary_file() -> String {
    "qaap-summary.tsv".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_file: default_results_file(),
            summary_file: default_summary_file(),
        }
    }
}
