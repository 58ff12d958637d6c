//! TOML-based service configuration.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::anomaly::IsolationForestParams;

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "GRID_INSIGHT_CONFIG";

/// Top-level service configuration parsed from TOML.
///
/// Every section has defaults, so an empty file (or no file at all) yields
/// the local development setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Listener, CORS, and request-size settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// On-disk locations for uploads and model artifacts.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Mock data and model hyperparameters.
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_addr: String,
    /// TCP port (must be > 0).
    pub port: u16,
    /// Browser origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Largest accepted request body, uploads included.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:3001".to_string(),
            ],
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory uploaded files are written to.
    pub upload_dir: PathBuf,
    /// Directory holding the two model artifact slots.
    pub artifact_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            artifact_dir: PathBuf::from("ml/models"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelsConfig {
    /// Hourly samples in the startup mock dataset (must be >= 2).
    pub mock_periods: usize,
    /// Expected outlier share for the isolation forest, in (0, 0.5].
    pub contamination: f64,
    /// Isolation trees per forest.
    pub n_estimators: usize,
    /// Sub-sample bound per tree.
    pub max_samples: usize,
    /// Seed for isolation-forest sampling.
    pub seed: u64,
    /// Hours averaged into each forecast.
    pub forecast_horizon_hours: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            mock_periods: 100,
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
            forecast_horizon_hours: 24,
        }
    }
}

impl ModelsConfig {
    pub fn detector_params(&self) -> IsolationForestParams {
        IsolationForestParams {
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            contamination: self.contamination,
            seed: self.seed,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"server.port"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    /// Loads `path`, else the file named by [`CONFIG_ENV`], else defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a named file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }
        match env::var(CONFIG_ENV) {
            Ok(p) if !p.is_empty() => Self::from_toml_file(Path::new(&p)),
            _ => Ok(Self::default()),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        let s = &self.server;
        check(s.port > 0, "server.port", "must be > 0");
        check(s.max_upload_bytes > 0, "server.max_upload_bytes", "must be > 0");

        let m = &self.models;
        check(m.mock_periods >= 2, "models.mock_periods", "must be >= 2");
        check(
            m.contamination > 0.0 && m.contamination <= 0.5,
            "models.contamination",
            "must be in (0.0, 0.5]",
        );
        check(m.n_estimators > 0, "models.n_estimators", "must be > 0");
        check(m.max_samples > 0, "models.max_samples", "must be > 0");
        check(
            m.forecast_horizon_hours > 0,
            "models.forecast_horizon_hours",
            "must be > 0",
        );

        errors
    }
}
