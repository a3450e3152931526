//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod types;

pub use types::{
    BackendConfig, EnumeratedOutput, EnumerationConfig, LoggingConfig, ServiceConfig,
    SyntheticConfig, SyntheticMode,
};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lamco-display-manager/config.toml";

/// Environment variable forcing a backend, checked before the config file
pub const DEBUG_BACKEND_ENV: &str = "LAMCO_DEBUG_MULTIMONITOR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend selection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Synthetic backend and fallback topology
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    /// Compositor-reported outputs
    #[serde(default)]
    pub enumeration: EnumerationConfig,
    /// Topology service tuning
    #[serde(default)]
    pub service: ServiceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            backend: BackendConfig::default(),
            synthetic: SyntheticConfig::default(),
            enumeration: EnumerationConfig::default(),
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend.kind.as_str() {
            "auto" | "xrandr" | "enumeration" | "synthetic" => {}
            _ => anyhow::bail!("Invalid backend: {}", self.backend.kind),
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        let synthetic = &self.synthetic;
        if synthetic.modes.is_empty() {
            anyhow::bail!("Synthetic topology needs at least one mode");
        }
        if let Some(mode) = synthetic
            .modes
            .iter()
            .find(|m| m.width == 0 || m.height == 0 || m.refresh <= 0.0)
        {
            anyhow::bail!(
                "Invalid synthetic mode: {}x{}@{}",
                mode.width,
                mode.height,
                mode.refresh
            );
        }
        if synthetic.crtcs == 0 {
            anyhow::bail!("Synthetic topology needs at least one CRTC");
        }
        if synthetic.outputs.is_empty() {
            anyhow::bail!("Synthetic topology needs at least one output");
        }

        // The enabled output must fit on the synthetic screen
        let preferred = &synthetic.modes[0];
        if preferred.width > synthetic.max_width || preferred.height > synthetic.max_height {
            anyhow::bail!(
                "Synthetic max screen {}x{} is smaller than preferred mode {}x{}",
                synthetic.max_width,
                synthetic.max_height,
                preferred.width,
                preferred.height
            );
        }

        if let Some(output) = self
            .enumeration
            .outputs
            .iter()
            .find(|o| o.width == 0 || o.height == 0)
        {
            anyhow::bail!(
                "Enumerated output {} has an empty rectangle",
                output.name.as_deref().unwrap_or("unknown")
            );
        }

        if self.service.queue_capacity == 0 {
            anyhow::bail!("service.queue_capacity must be at least 1");
        }
        if self.service.notifier_capacity == 0 {
            anyhow::bail!("service.notifier_capacity must be at least 1");
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, backend: Option<String>, display: Option<String>) -> Self {
        if let Some(kind) = backend {
            self.backend.kind = kind;
        }
        if display.is_some() {
            self.backend.display = display;
        }

        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert_eq!(config.backend.kind, "auto");
        assert_eq!(config.synthetic.crtcs, 2);
        assert_eq!(config.synthetic.outputs, vec!["LVDS", "VGA"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_backend() {
        let mut config = Config::default_config();
        config.backend.kind = "wayland".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_crtcs() {
        let mut config = Config::default_config();
        config.synthetic.crtcs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_size_mode() {
        let mut config = Config::default_config();
        config.synthetic.modes[1].height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_queue() {
        let mut config = Config::default_config();
        config.service.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_overrides() {
        let config = Config::default_config()
            .with_overrides(Some("synthetic".to_string()), Some(":1".to_string()));
        assert_eq!(config.backend.kind, "synthetic");
        assert_eq!(config.backend.display.as_deref(), Some(":1"));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[backend]
kind = "enumeration"

[[enumeration.outputs]]
name = "eDP-1"
x = 0
y = 0
width = 2560
height = 1600

[[enumeration.outputs]]
x = 2560
y = 0
width = 1920
height = 1080
refresh = 144.0
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.backend.kind, "enumeration");
        assert_eq!(config.enumeration.outputs.len(), 2);
        assert_eq!(config.enumeration.outputs[0].refresh, 60.0);
        assert_eq!(config.enumeration.outputs[1].name, None);
        assert_eq!(config.service.queue_capacity, 32);
    }

    #[test]
    fn test_load_rejects_invalid_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"loud\"").unwrap();
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/lamco-display-manager.toml").is_err());
    }
}
