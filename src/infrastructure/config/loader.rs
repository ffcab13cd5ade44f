use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project configuration file, read from the working directory when present.
pub const PROJECT_CONFIG_FILE: &str = "qaap.yaml";

/// Prefix of configuration environment variables; nesting splits on `__`.
pub const ENV_PREFIX: &str = "QAAP_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_cpus: {0}. Must be at least 1")]
    InvalidMaxCpus(u32),

    #[error("Invalid {name}: {value}. Must be positive")]
    InvalidCap { name: &'static str, value: f64 },

    #[error("Invalid max_time_secs: {0}. Must be at least 1")]
    InvalidMaxTime(u64),

    #[error("Invalid poll_interval_secs: {0}. Must be at least 1")]
    InvalidPollInterval(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Output file name cannot be empty: {0}")]
    EmptyOutputName(&'static str),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. ./qaap.yaml (optional)
    /// 3. `config_file`, when given
    /// 4. Environment variables (QAAP_* prefix)
    ///
    /// Command-line flags are applied on top by the caller.
    pub fn load(config_file: Option<&Path>) -> Result<Config> {
        Self::load_with(Path::new(PROJECT_CONFIG_FILE), config_file)
    }

    fn load_with(project_file: &Path, config_file: Option<&Path>) -> Result<Config> {
        if let Some(path) = config_file {
            if !path.is_file() {
                anyhow::bail!("no such config file: {}", path.display());
            }
        }

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(project_file));
        if let Some(path) = config_file {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let scheduler = &config.scheduler;
        if let Some(cpus) = scheduler.max_cpus {
            if cpus == 0 {
                return Err(ConfigError::InvalidMaxCpus(cpus));
            }
        }
        for (name, cap) in [
            ("max_mem_gb", scheduler.max_mem_gb),
            ("max_disk_gb", scheduler.max_disk_gb),
        ] {
            if let Some(value) = cap {
                if value.is_nan() || value <= 0.0 {
                    return Err(ConfigError::InvalidCap { name, value });
                }
            }
        }
        if scheduler.max_time_secs == Some(0) {
            return Err(ConfigError::InvalidMaxTime(0));
        }
        if scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidPollInterval(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.output.results_file.trim().is_empty() {
            return Err(ConfigError::EmptyOutputName("results_file"));
        }
        if config.output.summary_file.trim().is_empty() {
            return Err(ConfigError::EmptyOutputName("summary_file"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{LoggingConfig, OutputConfig, SchedulerConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{text}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.scheduler.max_cpus, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.output.results_file, "qaap-results.json");
        assert_eq!(config.output.summary_file, "qaap-summary.tsv");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
scheduler:
  max_cpus: 8
  max_mem_gb: 16.5
  poll_interval_secs: 2
logging:
  level: debug
  format: json
  retention_days: 7
workflow: /etc/qaap/workflow.yaml
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.scheduler.max_cpus, Some(8));
        assert_eq!(config.scheduler.max_mem_gb, Some(16.5));
        assert_eq!(config.scheduler.max_disk_gb, None);
        assert_eq!(config.scheduler.poll_interval_secs, 2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.retention_days, 7);
        assert_eq!(
            config.workflow.as_deref(),
            Some(Path::new("/etc/qaap/workflow.yaml"))
        );

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config {
            scheduler: SchedulerConfig {
                max_cpus: Some(4),
                max_mem_gb: Some(8.0),
                max_disk_gb: Some(100.0),
                max_time_secs: Some(3600),
                poll_interval_secs: 1,
            },
            logging: LoggingConfig {
                level: "warn".to_string(),
                format: "json".to_string(),
                log_dir: None,
                retention_days: 30,
            },
            output: OutputConfig::default(),
            workflow: None,
        };
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_cpus() {
        let mut config = Config::default();
        config.scheduler.max_cpus = Some(0);

        let result = ConfigLoader::validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidMaxCpus(0)));
    }

    #[test]
    fn test_validate_non_positive_memory() {
        let mut config = Config::default();
        config.scheduler.max_mem_gb = Some(0.0);

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidCap { name, .. } => assert_eq!(name, "max_mem_gb"),
            other => panic!("Expected InvalidCap error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_time_and_poll() {
        let mut config = Config::default();
        config.scheduler.max_time_secs = Some(0);
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxTime(0)
        ));

        let mut config = Config::default();
        config.scheduler.poll_interval_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPollInterval(0)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            _ => panic!("Expected InvalidLogLevel error"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogFormat(format) => assert_eq!(format, "xml"),
            _ => panic!("Expected InvalidLogFormat error"),
        }
    }

    #[test]
    fn test_validate_empty_output_name() {
        let mut config = Config::default();
        config.output.summary_file = " ".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyOutputName("summary_file")
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        let project = yaml_file("scheduler:\n  max_cpus: 2\nlogging:\n  level: info\n  format: json\n");
        let explicit = yaml_file("scheduler:\n  max_cpus: 6\nlogging:\n  level: debug\n");

        let config = temp_env::with_vars_unset(
            ["QAAP_SCHEDULER__MAX_CPUS", "QAAP_LOGGING__LEVEL"],
            || ConfigLoader::load_with(project.path(), Some(explicit.path())).unwrap(),
        );

        assert_eq!(config.scheduler.max_cpus, Some(6), "Explicit file should win");
        assert_eq!(
            config.logging.level, "debug",
            "Explicit file should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Project value should persist when not overridden"
        );
    }

    #[test]
    fn test_env_override() {
        let project = yaml_file("scheduler:\n  max_cpus: 2\n");
        temp_env::with_vars(
            [
                ("QAAP_SCHEDULER__MAX_CPUS", Some("12")),
                ("QAAP_LOGGING__LEVEL", Some("trace")),
            ],
            || {
                let config = ConfigLoader::load_with(project.path(), None).unwrap();
                assert_eq!(config.scheduler.max_cpus, Some(12));
                assert_eq!(config.logging.level, "trace");
            },
        );
    }

    #[test]
    fn test_invalid_values_rejected_after_merge() {
        let project = yaml_file("scheduler:\n  poll_interval_secs: 0\n");
        let err = ConfigLoader::load_with(project.path(), None).unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = ConfigLoader::load_with(
            Path::new("/nonexistent/qaap.yaml"),
            Some(Path::new("/nonexistent/custom.yaml")),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "no such config file: /nonexistent/custom.yaml");
    }
}
