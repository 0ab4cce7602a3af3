use crate::prediction::{
    DEFAULT_FILL_TARGET_RATIO, DEFAULT_MAX_CAPACITY_KG, DEFAULT_PROJECTION_HOURS,
    PredictionSettings,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_MODEL_PATHS: [&str; 3] = [
    "modelo_produccion",
    "public/modelo_produccion",
    "./modelo_produccion",
];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub model: Option<ModelSection>,
    #[serde(default)]
    pub prediction: Option<PredictionSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub backend: Option<BackendSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSection {
    /// Directories searched in order for `model.json` and `scaler_params.json`
    #[serde(default)]
    pub base_paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictionSection {
    pub projection_hours: Option<f64>,
    pub max_capacity_kg: Option<f64>,
    pub fill_target_ratio: Option<f64>,
    /// Container ids known to the model, in training order
    pub known_containers: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSection {
    /// Base URL of the REST backend, e.g. `http://localhost:3000/api`
    pub endpoint: String,
    pub token: Option<String>,
    /// Refresh interval in seconds (default: 30)
    pub refresh_interval_secs: Option<u64>,
    /// Readings fetched per container (default: 20)
    pub history_limit: Option<usize>,
    #[serde(default)]
    pub container_ids: Vec<u32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Model directories to try, falling back to the built-in search list.
    pub fn model_paths(&self) -> Vec<PathBuf> {
        match &self.model {
            Some(section) if !section.base_paths.is_empty() => section.base_paths.clone(),
            _ => DEFAULT_MODEL_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn prediction_settings(&self) -> PredictionSettings {
        let defaults = PredictionSettings::default();
        let Some(section) = &self.prediction else {
            return defaults;
        };
        PredictionSettings {
            projection_hours: section.projection_hours.unwrap_or(DEFAULT_PROJECTION_HOURS),
            max_capacity_kg: section.max_capacity_kg.unwrap_or(DEFAULT_MAX_CAPACITY_KG),
            fill_target_ratio: section
                .fill_target_ratio
                .unwrap_or(DEFAULT_FILL_TARGET_RATIO),
            known_containers: section
                .known_containers
                .clone()
                .unwrap_or(defaults.known_containers),
        }
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn backend(&self) -> Option<&BackendSection> {
        self.backend
            .as_ref()
            .filter(|section| !section.endpoint.trim().is_empty())
    }

    /// Returns the refresh interval as Duration (default: 30 seconds)
    pub fn refresh_interval(&self) -> Duration {
        let secs = self
            .backend
            .as_ref()
            .and_then(|s| s.refresh_interval_secs)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn history_limit(&self) -> usize {
        self.backend
            .as_ref()
            .and_then(|s| s.history_limit)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    /// Containers refreshed in the background, or empty if none are configured.
    pub fn container_ids(&self) -> &[u32] {
        self.backend
            .as_ref()
            .map(|s| s.container_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn backend_token(&self) -> Option<&str> {
        self.backend
            .as_ref()
            .and_then(|s| s.token.as_deref())
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(label: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("smartbin-config-{label}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn default_config_enables_backend_refresh() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        assert!(config.backend().is_some());
        assert!(!config.container_ids().is_empty());
        Ok(())
    }

    #[test]
    fn minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "minimal",
            r#"
[app]
name = "smartbin-forecast"

[logging]
level = "info"
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.model_paths().len(), DEFAULT_MODEL_PATHS.len());
        assert_eq!(config.prediction_settings(), PredictionSettings::default());
        assert!(config.backend().is_none());
        assert!(config.container_ids().is_empty());
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn prediction_section_overrides_settings() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "prediction",
            r#"
[app]
name = "smartbin-forecast"

[logging]
level = "debug"

[model]
base_paths = ["/opt/models/bins"]

[prediction]
projection_hours = 2.0
max_capacity_kg = 25.0
known_containers = [1, 2, 3]
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        let settings = config.prediction_settings();
        assert_eq!(settings.projection_hours, 2.0);
        assert_eq!(settings.max_capacity_kg, 25.0);
        assert_eq!(settings.fill_target_ratio, DEFAULT_FILL_TARGET_RATIO);
        assert_eq!(settings.known_containers, vec![1, 2, 3]);
        assert_eq!(config.model_paths(), vec![PathBuf::from("/opt/models/bins")]);
        Ok(())
    }

    #[test]
    fn empty_backend_endpoint_is_treated_as_missing() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "empty-backend",
            r#"
[app]
name = "smartbin-forecast"

[logging]
level = "info"

[backend]
endpoint = " "
token = ""
history_limit = 50
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert!(config.backend().is_none());
        assert!(config.backend_token().is_none());
        assert_eq!(config.history_limit(), 50);
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("smartbin-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config("invalid", "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
