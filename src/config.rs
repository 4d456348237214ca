use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::mastery::selector::SelectorConfig;
use crate::mastery::updater::UpdaterConfig;
use crate::mastery::zpd::ZpdConfig;

pub const DEFAULT_SUBJECT: &str = "mathematics";

/// Every tunable of the engine. Missing fields in a config file fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub subject: String,
    pub updater: UpdaterConfig,
    pub zpd: ZpdConfig,
    pub selector: SelectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            updater: UpdaterConfig::default(),
            zpd: ZpdConfig::default(),
            selector: SelectorConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Set when `ENABLE_FILE_LOGS` is on; `LOG_DIR` defaults to `./logs`.
    pub log_dir: Option<PathBuf>,
    pub profile_dir: PathBuf,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_logs = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let log_dir = file_logs.then(|| {
            std::env::var("LOG_DIR")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./logs"))
        });

        let profile_dir = std::env::var("PROFILE_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./profiles"));

        let engine = match std::env::var("MASTERY_ENGINE_CONFIG") {
            Ok(path) if !path.trim().is_empty() => EngineConfig::from_file(Path::new(&path))?,
            _ => EngineConfig::default(),
        };

        Ok(Self {
            log_level,
            log_dir,
            profile_dir,
            engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"updater": {"learningRate": 0.1}}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert!((config.updater.learning_rate - 0.1).abs() < 1e-12);
        assert!((config.updater.success_threshold - 0.7).abs() < 1e-12);
        assert_eq!(config.subject, DEFAULT_SUBJECT);
        assert!((config.zpd.target_success_rate - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_config_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = EngineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
