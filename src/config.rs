use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "bankcore.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// Maximum in-flight plus queued requests per user
    pub admission_limit: usize,
    /// Submission channel depth
    pub submit_queue: usize,
    /// Completion bus depth
    pub completion_queue: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            admission_limit: 10,
            submit_queue: 1024,
            completion_queue: 1024,
        }
    }
}

impl AppConfig {
    /// Load config from YAML file based on environment
    pub fn load(env: &str) -> Result<Self> {
        Self::load_from(format!("config/{}.yaml", env))
    }

    /// Load config from an explicit YAML file path.
    ///
    /// Missing fields fall back to their defaults; environment variable
    /// overrides and validation run after parsing.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self =
            serde_yaml::from_str(&content).context("Failed to parse config yaml")?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables take precedence over YAML config.
    ///
    /// Supported overrides:
    /// - BANKCORE_LOG_LEVEL: Log level (trace/debug/info/warn/error)
    /// - BANKCORE_ADMISSION_LIMIT: Per-user admission limit (usize)
    /// - BANKCORE_SUBMIT_QUEUE: Submission channel depth (usize)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BANKCORE_LOG_LEVEL") {
            tracing::info!(
                "Config override: log_level = {} (from BANKCORE_LOG_LEVEL)",
                level
            );
            self.log_level = level;
        }

        if let Ok(limit) = std::env::var("BANKCORE_ADMISSION_LIMIT")
            && let Ok(l) = limit.parse::<usize>()
        {
            tracing::info!(
                "Config override: gateway.admission_limit = {} (from BANKCORE_ADMISSION_LIMIT)",
                l
            );
            self.gateway.admission_limit = l;
        }

        if let Ok(depth) = std::env::var("BANKCORE_SUBMIT_QUEUE")
            && let Ok(d) = depth.parse::<usize>()
        {
            tracing::info!(
                "Config override: gateway.submit_queue = {} (from BANKCORE_SUBMIT_QUEUE)",
                d
            );
            self.gateway.submit_queue = d;
        }
    }

    /// Validate configuration at startup
    ///
    /// Returns an error if any critical configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}': must be one of {:?}",
                self.log_level,
                valid_levels
            );
        }

        if self.gateway.admission_limit == 0 {
            anyhow::bail!("Invalid gateway.admission_limit: must be > 0");
        }

        if self.gateway.submit_queue == 0 {
            anyhow::bail!("Invalid gateway.submit_queue: must be > 0");
        }

        if self.gateway.completion_queue == 0 {
            anyhow::bail!("Invalid gateway.completion_queue: must be > 0");
        }

        Ok(())
    }
}
