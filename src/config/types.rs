//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend to use ("auto", "xrandr", "enumeration", "synthetic")
    pub kind: String,

    /// X11 display name (None = $DISPLAY)
    #[serde(default)]
    pub display: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "auto".to_string(),
            display: None,
        }
    }
}

/// A mode offered by the synthetic backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticMode {
    /// Horizontal resolution
    pub width: u32,

    /// Vertical resolution
    pub height: u32,

    /// Refresh rate in Hz
    #[serde(default = "default_refresh")]
    pub refresh: f32,
}

fn default_refresh() -> f32 {
    60.0
}

/// Synthetic backend topology
///
/// Also the fallback whenever the selected backend reports no outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Modes every synthetic output supports; the first one is preferred
    pub modes: Vec<SyntheticMode>,

    /// Number of CRTCs
    pub crtcs: usize,

    /// Output names; the first output starts enabled, the rest disabled
    pub outputs: Vec<String>,

    /// Maximum screen width
    pub max_width: u32,

    /// Maximum screen height
    pub max_height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            modes: vec![
                SyntheticMode {
                    width: 1024,
                    height: 768,
                    refresh: 60.0,
                },
                SyntheticMode {
                    width: 1280,
                    height: 720,
                    refresh: 60.0,
                },
                SyntheticMode {
                    width: 1920,
                    height: 1080,
                    refresh: 60.0,
                },
            ],
            crtcs: 2,
            outputs: vec!["LVDS".to_string(), "VGA".to_string()],
            max_width: 8192,
            max_height: 8192,
        }
    }
}

/// One rectangle reported by a compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumeratedOutput {
    /// Connector name ("unknown" when absent)
    #[serde(default)]
    pub name: Option<String>,

    /// Left edge
    pub x: i32,

    /// Top edge
    pub y: i32,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Refresh rate in Hz
    #[serde(default = "default_refresh")]
    pub refresh: f32,

    /// Physical width in millimeters
    #[serde(default)]
    pub width_mm: u32,

    /// Physical height in millimeters
    #[serde(default)]
    pub height_mm: u32,
}

/// Compositor output enumeration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumerationConfig {
    /// Reported rectangles, in compositor order
    #[serde(default)]
    pub outputs: Vec<EnumeratedOutput>,
}

/// Topology service tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Pending command capacity
    pub queue_capacity: usize,

    /// Change notification channel capacity
    pub notifier_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            notifier_capacity: 16,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for daily-rotated log files (None = stdout only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
