//! Configuration for the Kata engine.
//!
//! Settings are read from `kata.json` in the working directory. Every field
//! has a default, so a missing file (or an empty object) yields a usable
//! configuration.

use std::path::{Path, PathBuf};

use kata_sandbox::SandboxLimits;
use serde::{Deserialize, Serialize};

use crate::catalog::LevelFilter;
use crate::error::{KataError, Result};
use crate::progress::FileProgressStore;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "kata.json";

/// Default catalog file path.
fn default_catalog() -> String {
    "catalog.json".to_string()
}

/// Default address the server binds to.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default server port.
const fn default_port() -> u16 {
    3000
}

/// Main configuration for Kata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the exercise catalog.
    #[serde(default = "default_catalog")]
    pub catalog: String,

    /// Directory holding progress records. Defaults to the platform data
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_dir: Option<String>,

    /// Set opened by `kata serve` when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_set: Option<String>,

    /// Level filter applied when a session starts.
    #[serde(default)]
    pub default_filter: LevelFilter,

    /// Execution budgets for previews and validator scripts.
    #[serde(default)]
    pub sandbox: SandboxLimits,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            progress_dir: None,
            default_set: None,
            default_filter: LevelFilter::default(),
            sandbox: SandboxLimits::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `kata.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            KataError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `kata.json` from the given directory, or defaults if absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `KataError::ConfigParseError` if the file cannot be read or
    /// is not valid JSON, and `KataError::ConfigValidationError` if a value
    /// is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(KataError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| KataError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `KataError::ConfigValidationError` naming the first invalid
    /// field.
    pub fn validate(&self) -> Result<()> {
        if self.catalog.trim().is_empty() {
            return Err(KataError::config_validation(
                "catalog path must not be empty",
                "Provide the path of your exercise catalog in kata.json",
            ));
        }

        if self
            .progress_dir
            .as_deref()
            .is_some_and(|dir| dir.trim().is_empty())
        {
            return Err(KataError::config_validation(
                "progressDir must not be empty",
                "Remove progressDir from kata.json to use the default data directory",
            ));
        }

        let limits = [
            ("sandbox.maxSteps", self.sandbox.max_steps == 0),
            ("sandbox.maxCallDepth", self.sandbox.max_call_depth == 0),
            ("sandbox.maxConsoleLines", self.sandbox.max_console_lines == 0),
        ];
        if let Some((field, _)) = limits.iter().find(|(_, zero)| *zero) {
            return Err(KataError::config_validation(
                format!("{field} must be greater than 0"),
                format!("Set {field} to at least 1 in kata.json, or remove it to use the default"),
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(KataError::config_validation(
                "server.host must not be empty",
                "Set server.host to an address such as 127.0.0.1 in kata.json",
            ));
        }

        if self.server.port == 0 {
            return Err(KataError::config_validation(
                "server.port must be greater than 0",
                "Set server.port to a free port such as 3000 in kata.json",
            ));
        }

        Ok(())
    }

    /// Returns the directory progress records are stored in.
    ///
    /// # Errors
    ///
    /// Returns `KataError::ConfigValidationError` if no directory is
    /// configured and the platform has no data directory.
    pub fn resolved_progress_dir(&self) -> Result<PathBuf> {
        match &self.progress_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => FileProgressStore::default_dir().ok_or_else(|| {
                KataError::config_validation(
                    "no data directory is available on this platform",
                    "Set progressDir in kata.json or pass --progress-dir",
                )
            }),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(json.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.catalog, "catalog.json");
        assert_eq!(config.progress_dir, None);
        assert_eq!(config.default_set, None);
        assert_eq!(config.default_filter, LevelFilter::All);
        assert_eq!(config.sandbox, SandboxLimits::default());
        assert_eq!(config.server.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "catalog": "exercises/web.json",
            "progressDir": "/tmp/kata",
            "defaultSet": "HTML Basics",
            "defaultFilter": 3,
            "sandbox": { "maxSteps": 5000 },
            "server": { "port": 8080 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.catalog, "exercises/web.json");
        assert_eq!(config.progress_dir.as_deref(), Some("/tmp/kata"));
        assert_eq!(config.default_set.as_deref(), Some("HTML Basics"));
        assert_eq!(config.default_filter, LevelFilter::Level(3));
        assert_eq!(config.sandbox.max_steps, 5000);
        assert_eq!(
            config.sandbox.max_call_depth,
            SandboxLimits::default().max_call_depth
        );
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_default_filter_case_insensitive() {
        let config: Config = serde_json::from_str(r#"{"defaultFilter": "ALL"}"#).unwrap();
        assert_eq!(config.default_filter, LevelFilter::All);
    }

    #[test]
    fn test_invalid_default_filter_error() {
        let err = serde_json::from_str::<Config>(r#"{"defaultFilter": 9}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid level filter"), "{err}");
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config: Config =
            serde_json::from_str(r#"{"catalog": "c.json", "theme": "dark"}"#).unwrap();
        assert_eq!(config.catalog, "c.json");
    }

    #[test]
    fn test_load_from_file_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"catalog": "web.json"}"#);
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.catalog, "web.json");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "{ not valid json }");
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(
            matches!(&err, KataError::ConfigParseError { path: p, message } if *p == path && !message.is_empty()),
            "Expected ConfigParseError, got: {err:?}"
        );
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(Path::new("/nonexistent/path/kata.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_dir_finds_kata_json() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{"defaultSet": "CSS"}"#);
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.default_set.as_deref(), Some("CSS"));
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"server": {"port": 0}}"#);
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, KataError::ConfigValidationError { .. }));
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_config_validation_empty_catalog() {
        let config = Config {
            catalog: "  ".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("catalog path must not be empty"));
    }

    #[test]
    fn test_config_validation_zero_limits() {
        let mut config = Config::default();
        config.sandbox.max_call_depth = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sandbox.maxCallDepth must be greater than 0"));

        let mut config = Config::default();
        config.sandbox.max_console_lines = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sandbox.maxConsoleLines"));
    }

    #[test]
    fn test_config_validation_empty_progress_dir() {
        let config = Config {
            progress_dir: Some(String::new()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_progress_dir_prefers_configured() {
        let config = Config {
            progress_dir: Some("/srv/kata".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.resolved_progress_dir().unwrap(),
            PathBuf::from("/srv/kata")
        );
    }
}
