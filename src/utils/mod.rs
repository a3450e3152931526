//! Utility Functions and Diagnostics
//!
//! Startup diagnostics and user-friendly error formatting.
//!
//! ## Diagnostics
//!
//! ```rust
//! use lamco_display_manager::utils::{DisplayEnvironment, SystemInfo};
//!
//! let sys_info = SystemInfo::gather();
//! sys_info.log();
//!
//! let env = DisplayEnvironment::detect();
//! if env.is_headless() {
//!     println!("No display server; the synthetic backend will be used");
//! }
//! ```
//!
//! ## Error Formatting
//!
//! [`format_user_error`] turns an `anyhow::Error` into a boxed message with
//! troubleshooting hints. Topology errors (stale serial, validation,
//! unsupported operation) get their own sections.

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{log_startup_diagnostics, DisplayEnvironment, SystemInfo};
pub use errors::format_user_error;
