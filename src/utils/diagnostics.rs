//! System Diagnostics
//!
//! Logs the host and display environment at startup so bug reports show
//! which backend was likely to be picked and why.

use sysinfo::System;
use tracing::info;

use crate::config::{Config, DEBUG_BACKEND_ENV};

/// System information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Operating system name (e.g., "Linux", "Ubuntu")
    pub os_name: String,
    /// Operating system version string
    pub os_version: String,

    /// Kernel version string
    pub kernel_version: String,

    /// Number of logical CPU cores
    pub cpu_count: usize,

    /// Total system memory in megabytes
    pub total_memory_mb: u64,

    /// System hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Gather system information
    pub fn gather() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        Self {
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            cpu_count: sys.cpus().len(),
            total_memory_mb: sys.total_memory() / 1024 / 1024,
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Log system information
    pub fn log(&self) {
        info!("=== System Information ===");
        info!("  OS: {} {}", self.os_name, self.os_version);
        info!("  Kernel: {}", self.kernel_version);
        info!("  Hostname: {}", self.hostname);
        info!("  CPUs: {}", self.cpu_count);
        info!("  Memory: {} MB", self.total_memory_mb);
    }
}

/// Display-related environment of this process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayEnvironment {
    /// `$DISPLAY`
    pub x11_display: Option<String>,
    /// `$WAYLAND_DISPLAY`
    pub wayland_display: Option<String>,
    /// `$XDG_SESSION_TYPE`
    pub session_type: Option<String>,
    /// Backend forced through the debug variable
    pub forced_backend: Option<String>,
}

impl DisplayEnvironment {
    /// Read from the process environment
    pub fn detect() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            x11_display: var("DISPLAY"),
            wayland_display: var("WAYLAND_DISPLAY"),
            session_type: var("XDG_SESSION_TYPE"),
            forced_backend: var(DEBUG_BACKEND_ENV),
        }
    }

    /// True when no display server is reachable by name
    pub fn is_headless(&self) -> bool {
        self.x11_display.is_none() && self.wayland_display.is_none()
    }

    /// Log the environment
    pub fn log(&self) {
        let or_unset = |v: &Option<String>| v.clone().unwrap_or_else(|| "unset".to_string());

        info!("=== Display Environment ===");
        info!("  DISPLAY: {}", or_unset(&self.x11_display));
        info!("  WAYLAND_DISPLAY: {}", or_unset(&self.wayland_display));
        info!("  Session type: {}", or_unset(&self.session_type));
        if let Some(forced) = &self.forced_backend {
            info!("  {}: {} (overrides config)", DEBUG_BACKEND_ENV, forced);
        }
        if self.is_headless() {
            info!("  No display server named; expect the synthetic backend");
        }
    }
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics(config: &Config) {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║          Startup Diagnostics                              ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    SystemInfo::gather().log();
    DisplayEnvironment::detect().log();

    info!("=== Manager Configuration ===");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    info!("  Backend: {}", config.backend.kind);
    info!(
        "  Fallback: {} outputs, {} CRTCs, max {}x{}",
        config.synthetic.outputs.len(),
        config.synthetic.crtcs,
        config.synthetic.max_width,
        config.synthetic.max_height
    );
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");

    info!("╚════════════════════════════════════════════════════════════╝");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_info_gather() {
        let info = SystemInfo::gather();
        assert!(!info.os_name.is_empty());
        assert!(!info.hostname.is_empty());
    }

    #[test]
    fn test_headless_detection() {
        let env = DisplayEnvironment::default();
        assert!(env.is_headless());

        let env = DisplayEnvironment {
            x11_display: Some(":0".to_string()),
            ..Default::default()
        };
        assert!(!env.is_headless());
    }
}
