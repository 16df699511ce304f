use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::{CommandConfig, Config};

/// Project directory holding config, database and artifacts.
pub const PROJECT_DIR: &str = ".spec-refine";

/// Prefix for environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "SPEC_REFINE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Invalid min_observations: {0}. Must be between 1 and {1}")]
    InvalidMinObservations(u32, u32),

    #[error("Invalid high_ratio_threshold: {0}. Must be within (0, 1]")]
    InvalidHighRatio(f64),

    #[error("Invalid research_timeout_secs: {0}. Must be positive")]
    InvalidResearchTimeout(u64),

    #[error("Command for the {0} sub-task cannot be empty")]
    EmptyCommand(&'static str),

    #[error("Output directory cannot be empty")]
    EmptyOutputDir,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.spec-refine/config.yaml` (created by `init`)
    /// 3. `.spec-refine/local.yaml` (optional local overrides)
    /// 4. `SPEC_REFINE_*` environment variables
    pub fn load() -> Result<Config> {
        let project = Path::new(PROJECT_DIR);
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(project.join("config.yaml")))
            .merge(Yaml::file(project.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(&figment).context("Failed to extract configuration from figment")
    }

    /// Load configuration from a specific file; environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(&figment).with_context(|| format!("Failed to load config from {}", path.display()))
    }

    /// Load from `path` when given, otherwise the project-local layers.
    pub fn load_with_override(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    fn extract(figment: &Figment) -> Result<Config> {
        let config: Config = figment.extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let refinement = &config.refinement;
        if refinement.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(refinement.max_iterations));
        }
        if refinement.min_observations == 0 || refinement.min_observations > refinement.max_iterations + 1 {
            return Err(ConfigError::InvalidMinObservations(
                refinement.min_observations,
                refinement.max_iterations + 1,
            ));
        }
        let ratio = refinement.high_ratio_threshold;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ConfigError::InvalidHighRatio(ratio));
        }
        if refinement.research_timeout_secs == 0 {
            return Err(ConfigError::InvalidResearchTimeout(refinement.research_timeout_secs));
        }

        let commands: [(&'static str, &Option<CommandConfig>); 3] = [
            ("analyze", &config.subtasks.analyze),
            ("research", &config.subtasks.research),
            ("integrate", &config.subtasks.integrate),
        ];
        for (step, command) in commands {
            if command.as_ref().is_some_and(|c| c.program.trim().is_empty()) {
                return Err(ConfigError::EmptyCommand(step));
            }
        }

        if config.output_dir.trim().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::LogFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".spec-refine/spec-refine.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.refinement.max_iterations, 5);
        assert_eq!(config.refinement.open_threshold, 3);
        assert!(config.subtasks.research.is_none());
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/refine.db
logging:
  level: debug
  format: json
refinement:
  max_iterations: 8
  research_timeout_secs: 30
subtasks:
  research:
    program: ./research.sh
    args: [--fast]
    env:
      MODEL: small
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/refine.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.refinement.max_iterations, 8);
        assert_eq!(config.refinement.stable_threshold, 2);
        let research = config.subtasks.research.as_ref().unwrap();
        assert_eq!(research.args, vec!["--fast"]);
        assert_eq!(research.env.get("MODEL").map(String::as_str), Some("small"));
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_refinement_bounds() {
        let mut config = Config::default();
        config.refinement.max_iterations = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxIterations(0))
        ));

        let mut config = Config::default();
        config.refinement.high_ratio_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidHighRatio(_))
        ));

        let mut config = Config::default();
        config.refinement.min_observations = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMinObservations(0, 6))
        ));

        let mut config = Config::default();
        config.refinement.research_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidResearchTimeout(0))
        ));
    }

    #[test]
    fn test_validate_empty_command() {
        let mut config = Config::default();
        config.subtasks.analyze = Some(CommandConfig {
            program: "  ".to_string(),
            args: vec![],
            env: std::collections::HashMap::new(),
            working_dir: None,
        });
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyCommand("analyze"))
        ));
    }

    #[test]
    fn test_file_then_env_precedence() {
        let file = yaml_file("refinement:\n  max_iterations: 7\n  open_threshold: 1\nlogging:\n  level: warn\n");

        temp_env::with_vars(
            [
                ("SPEC_REFINE_REFINEMENT__MAX_ITERATIONS", Some("9")),
                ("SPEC_REFINE_DATABASE__PATH", Some("/tmp/env.db")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.refinement.max_iterations, 9, "env should win");
                assert_eq!(config.refinement.open_threshold, 1, "file value should persist");
                assert_eq!(config.logging.level, "warn");
                assert_eq!(config.database.path, "/tmp/env.db");
            },
        );
    }

    #[test]
    fn test_env_value_is_validated() {
        let file = yaml_file("output_dir: out\n");
        temp_env::with_var("SPEC_REFINE_LOGGING__LEVEL", Some("loud"), || {
            assert!(ConfigLoader::load_from_file(file.path()).is_err());
        });
    }

    #[test]
    fn test_hierarchical_merging() {
        let base = yaml_file("refinement:\n  max_iterations: 4\n  open_threshold: 2\n");
        let local = yaml_file("refinement:\n  max_iterations: 6\n");

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base.path()))
            .merge(Yaml::file(local.path()))
            .extract()
            .unwrap();

        assert_eq!(config.refinement.max_iterations, 6, "Override should win");
        assert_eq!(config.refinement.open_threshold, 2, "Base value should persist");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(ConfigLoader::load_from_file("/nonexistent/spec-refine.yaml").is_err());
    }
}
