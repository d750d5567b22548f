use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use phasegate_utils::error::ConfigError;
use phasegate_utils::types::ConfigSource;

use super::{CliArgs, Config, Defaults, TasksConfig};

/// Directory searched for during discovery
pub const CONFIG_DIR: &str = ".phasegate";
pub const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    defaults: Option<Defaults>,
    tasks: Option<TasksConfig>,
}

/// Copy `$field` from the file/CLI layer when present and record its source.
macro_rules! overlay {
    ($target:expr, $layer:expr, $attribution:expr, $source:expr, [$($field:ident),+ $(,)?]) => {
        $(
            if let Some(value) = $layer.$field.clone() {
                $target.$field = Some(value);
                $attribution.insert(stringify!($field).to_string(), $source.clone());
            }
        )+
    };
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults.
    ///
    /// Searches upward from the current working directory unless
    /// `cli_args.config_path` names a file explicitly.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("Failed to get current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Path-driven variant of [`Config::discover`], used by tests to avoid
    /// depending on the process working directory.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)?;
            tracing::debug!(path = %path.display(), "Loaded configuration file");

            if let Some(file_defaults) = file_config.defaults {
                overlay!(
                    config.defaults,
                    file_defaults,
                    config.source_attribution,
                    ConfigSource::Config,
                    [
                        confidence_threshold,
                        max_retry_attempts,
                        phase_timeout,
                        retry_delay,
                        output_root,
                        validation_depth,
                        glob_fallback,
                        retry_phases,
                        lock_ttl_seconds,
                    ]
                );
            }
            if let Some(tasks) = file_config.tasks {
                config.tasks = tasks;
            }
            config.config_file = Some(path.clone());
        }

        overlay!(
            config.defaults,
            cli_args,
            config.source_attribution,
            ConfigSource::Cli,
            [
                confidence_threshold,
                max_retry_attempts,
                phase_timeout,
                retry_delay,
                output_root,
                validation_depth,
                glob_fallback,
            ]
        );

        config.validate()?;
        Ok(config)
    }

    /// Walk upward from `start_dir` looking for `.phasegate/config.toml`.
    ///
    /// Stops at a repository root (`.git`, `.hg`, `.svn`) or the filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if [".git", ".hg", ".svn"].iter().any(|m| dir.join(m).exists()) {
                break;
            }
            current = dir.parent();
        }
        None
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidFile(format!("Failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasegate_utils::types::{PhaseId, ValidationDepth};
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let config_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join(CONFIG_FILE);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
        assert!(config.config_file.is_none());
        assert_eq!(config.confidence_threshold(), 9.0);
        assert_eq!(config.source_of("max_retry_attempts"), ConfigSource::Default);
    }

    #[test]
    fn test_file_values_and_attribution() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            r#"
[defaults]
confidence_threshold = 9.5
validation_depth = "institutional"
retry_phases = ["analysis", "validation"]

[tasks.discovery]
program = "./discover.sh"
args = ["{subject}", "{staging}"]
"#,
        );

        let config = Config::discover_from(temp.path(), &CliArgs::default()).unwrap();
        assert_eq!(config.confidence_threshold(), 9.5);
        assert_eq!(config.validation_depth(), ValidationDepth::Institutional);
        assert_eq!(
            config.retry_phases(),
            vec![PhaseId::Analysis, PhaseId::Validation]
        );
        assert_eq!(config.task_for(PhaseId::Discovery).program, "./discover.sh");
        assert_eq!(config.task_for(PhaseId::Analysis).program, "claude");
        assert_eq!(config.source_of("confidence_threshold"), ConfigSource::Config);
        assert_eq!(config.source_of("retry_delay"), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[defaults]\nmax_retry_attempts = 2\n");

        let cli = CliArgs {
            max_retry_attempts: Some(5),
            ..CliArgs::default()
        };
        let config = Config::discover_from(temp.path(), &cli).unwrap();
        assert_eq!(config.max_retry_attempts(), 5);
        assert_eq!(config.source_of("max_retry_attempts"), ConfigSource::Cli);
    }

    #[test]
    fn test_discovery_walks_upward_until_repo_root() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[defaults]\nretry_delay = 0\n");
        let nested = temp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        let found = Config::discover_config_file_from(&nested).unwrap();
        assert!(found.ends_with(".phasegate/config.toml"));
    }

    #[test]
    fn test_discovery_stops_at_repo_root() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[defaults]\n");
        let repo = temp.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert!(Config::discover_config_file_from(&repo).is_none());
    }

    #[test]
    fn test_explicit_missing_path_is_not_found() {
        let temp = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(temp.path().join("nope.toml")),
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::discover_from(temp.path(), &cli),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_and_unknown_keys() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[defaults]\nconfidence = 9.5\n");
        assert!(matches!(
            Config::discover_from(temp.path(), &CliArgs::default()),
            Err(ConfigError::InvalidFile(_))
        ));

        write_config(temp.path(), "[defaults\n");
        assert!(matches!(
            Config::discover_from(temp.path(), &CliArgs::default()),
            Err(ConfigError::InvalidFile(_))
        ));
    }

    #[test]
    fn test_out_of_range_file_value_rejected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[defaults]\nconfidence_threshold = 8.0\n");
        let err = Config::discover_from(temp.path(), &CliArgs::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "confidence_threshold"));
    }
}
