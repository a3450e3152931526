//! Display Backends
//!
//! A backend turns one hardware source into [`Resources`] and, when it can,
//! writes CRTC configurations back.
//!
//! | Backend | Source | Writable |
//! |---------|--------|----------|
//! | [`XrandrBackend`] | X server RandR extension | yes |
//! | [`EnumerationBackend`] | rectangles reported by a compositor | no |
//! | [`SyntheticBackend`] | in-memory topology | yes |
//!
//! The backend is picked once by [`select_backend`] and kept for the process
//! lifetime.

pub mod edid;
mod enumeration;
mod synthetic;
#[cfg(feature = "xrandr")]
mod xrandr;

pub use enumeration::{
    resources_from_outputs, EnumerationBackend, OutputSource, SharedOutputSource,
};
pub use synthetic::{SyntheticBackend, SyntheticHandle};
#[cfg(feature = "xrandr")]
pub use xrandr::XrandrBackend;

use std::fmt;
use std::str::FromStr;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, DEBUG_BACKEND_ENV};
use crate::topology::{CrtcId, ModeId, OutputId, PowerSaveMode, Resources, ScreenSize, Transform};

/// Backend result type
pub type Result<T> = std::result::Result<T, BackendError>;

/// Backend error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Could not reach the display server
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Reading resources failed
    #[error("Probe failed: {0}")]
    Probe(String),

    /// The hardware refused a write
    #[error("Hardware write failed: {0}")]
    Write(String),

    /// Backend cannot perform this operation
    #[error("Not supported by {0} backend")]
    Unsupported(BackendKind),
}

/// Which hardware source a backend reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// X server RandR extension
    Xrandr,
    /// Compositor output enumeration
    Enumeration,
    /// In-memory topology
    Synthetic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Xrandr => "xrandr",
            BackendKind::Enumeration => "enumeration",
            BackendKind::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xrandr" => Ok(BackendKind::Xrandr),
            "enumeration" => Ok(BackendKind::Enumeration),
            "synthetic" => Ok(BackendKind::Synthetic),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// New scan-out parameters for an enabled CRTC
#[derive(Debug, Clone, PartialEq)]
pub struct CrtcModeSet {
    /// Mode to drive
    pub mode: ModeId,
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Transform
    pub transform: Transform,
    /// Outputs to drive, all showing the same image
    pub outputs: Vec<OutputId>,
}

/// One CRTC write of an apply pass
#[derive(Debug, Clone, PartialEq)]
pub struct CrtcWrite {
    /// Target CRTC
    pub crtc: CrtcId,
    /// New parameters, `None` to disable
    pub config: Option<CrtcModeSet>,
}

impl CrtcWrite {
    /// Disable a CRTC
    pub fn disable(crtc: CrtcId) -> Self {
        Self { crtc, config: None }
    }

    /// True when this write turns the CRTC off
    pub fn is_disable(&self) -> bool {
        self.config.is_none()
    }
}

/// Final flag state of one output after an apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFlags {
    /// Target output
    pub output: OutputId,
    /// Primary flag
    pub is_primary: bool,
    /// Presentation flag
    pub is_presentation: bool,
}

/// Callback fired by a hot-plug watcher; returning `false` stops the watcher
pub type HotplugCallback = Box<dyn Fn() -> bool + Send + 'static>;

/// Hardware source strategy
///
/// All ids passed in refer to `current`, the resources of the generation
/// the write was validated against.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayBackend: Send {
    /// Which source this backend reads
    fn kind(&self) -> BackendKind;

    /// Whether configuration writes are possible
    fn is_writable(&self) -> bool;

    /// Read the complete current resources
    fn probe(&mut self) -> Result<Resources>;

    /// Resize the screen before enabling CRTCs that need the room
    fn set_screen_size(&mut self, current: &Resources, size: ScreenSize) -> Result<()>;

    /// Enable or disable one CRTC
    fn write_crtc(&mut self, current: &Resources, write: &CrtcWrite) -> Result<()>;

    /// Store primary/presentation flags for every output
    fn write_output_flags(&mut self, current: &Resources, flags: &[OutputFlags]) -> Result<()>;

    /// Change the overall power state
    fn set_power_save_mode(&mut self, mode: PowerSaveMode) -> Result<()>;

    /// Start watching for hardware changes
    ///
    /// Returns `None` when the source never changes on its own.
    fn watch_hotplug(&mut self, notify: HotplugCallback) -> Result<Option<JoinHandle<()>>>;
}

/// Pick the backend for this process
///
/// Order: the `LAMCO_DEBUG_MULTIMONITOR` override, then the configured kind,
/// then capability detection (XRandR when a display connection works,
/// enumeration when the config lists outputs, synthetic otherwise).
pub fn select_backend(config: &Config) -> Box<dyn DisplayBackend> {
    let requested = std::env::var(DEBUG_BACKEND_ENV)
        .ok()
        .map(|value| {
            let kind = value.parse().unwrap_or(BackendKind::Synthetic);
            info!("{}={} forces {} backend", DEBUG_BACKEND_ENV, value, kind);
            kind
        })
        .or_else(|| config.backend.kind.parse().ok());

    match requested {
        Some(kind) => build_backend(kind, config),
        None => detect_backend(config),
    }
}

fn build_backend(kind: BackendKind, config: &Config) -> Box<dyn DisplayBackend> {
    match kind {
        BackendKind::Xrandr => open_xrandr(config).unwrap_or_else(|e| {
            warn!("XRandR backend unavailable ({}), using synthetic backend", e);
            Box::new(SyntheticBackend::new(config.synthetic.clone()))
        }),
        BackendKind::Enumeration => Box::new(EnumerationBackend::from_config(&config.enumeration)),
        BackendKind::Synthetic => Box::new(SyntheticBackend::new(config.synthetic.clone())),
    }
}

fn detect_backend(config: &Config) -> Box<dyn DisplayBackend> {
    match open_xrandr(config) {
        Ok(backend) => {
            info!("Detected XRandR display server");
            return backend;
        }
        Err(e) => debug!("XRandR not available: {}", e),
    }

    if !config.enumeration.outputs.is_empty() {
        info!(
            "Using {} compositor-reported outputs",
            config.enumeration.outputs.len()
        );
        return Box::new(EnumerationBackend::from_config(&config.enumeration));
    }

    info!("No display hardware source found, using synthetic backend");
    Box::new(SyntheticBackend::new(config.synthetic.clone()))
}

#[cfg(feature = "xrandr")]
fn open_xrandr(config: &Config) -> Result<Box<dyn DisplayBackend>> {
    let backend = XrandrBackend::connect(config.backend.display.as_deref())?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "xrandr"))]
fn open_xrandr(_config: &Config) -> Result<Box<dyn DisplayBackend>> {
    Err(BackendError::Unsupported(BackendKind::Xrandr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("XRandR".parse::<BackendKind>(), Ok(BackendKind::Xrandr));
        assert_eq!("synthetic".parse::<BackendKind>(), Ok(BackendKind::Synthetic));
        assert!("auto".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Enumeration.to_string(), "enumeration");
    }

    #[test]
    fn test_select_explicit_synthetic() {
        // Only meaningful when the debug override is not set in the test env
        if std::env::var(DEBUG_BACKEND_ENV).is_ok() {
            return;
        }
        let mut config = Config::default_config();
        config.backend.kind = "synthetic".to_string();
        let backend = select_backend(&config);
        assert_eq!(backend.kind(), BackendKind::Synthetic);
        assert!(backend.is_writable());
    }

    #[test]
    fn test_select_explicit_enumeration() {
        if std::env::var(DEBUG_BACKEND_ENV).is_ok() {
            return;
        }
        let mut config = Config::default_config();
        config.backend.kind = "enumeration".to_string();
        let backend = select_backend(&config);
        assert_eq!(backend.kind(), BackendKind::Enumeration);
        assert!(!backend.is_writable());
    }

    #[test]
    fn test_crtc_write_disable() {
        let write = CrtcWrite::disable(CrtcId(3));
        assert!(write.is_disable());
        assert_eq!(write.crtc, CrtcId(3));
    }
}
