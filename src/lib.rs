//! # lamco-display-manager
//!
//! Display topology manager for Linux: discovers outputs, derives logical
//! monitors and applies whole-topology reconfigurations atomically.
//!
//! # Architecture
//!
//! ```text
//! lamco-display-manager
//!   ├─> Backend (XRandR / compositor enumeration / synthetic)
//!   ├─> Topology (immutable generations: modes, CRTCs, outputs, logical monitors)
//!   ├─> Configuration (validate → plan → commit)
//!   ├─> DisplayManager (generation ownership, serial checks, fallback)
//!   └─> TopologyService (single writer thread + change notifications)
//! ```
//!
//! # Data Flow
//!
//! **Probe Path:** Backend → Resources → Topology → watch/broadcast → Readers
//!
//! **Apply Path:** Client request + serial → validate → plan → Backend writes
//! → re-probe → new generation
//!
//! **Hot-plug Path:** Backend event → TopologyService → re-probe → new
//! generation (only when something changed)

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Display backends
///
/// The [`backend::DisplayBackend`] trait and its three strategies: XRandR
/// hardware access, read-only compositor enumeration, and an in-memory
/// synthetic backend used for headless runs and as the empty-probe fallback.
pub mod backend;

/// Manager configuration
pub mod config;

/// Configuration requests
///
/// Whole-topology apply requests, their validation against a generation and
/// the ordered plan of backend writes that realises them.
pub mod configuration;

/// Topology ownership and change notification
///
/// Key features:
/// - **DisplayManager**: owns the current generation and the backend
/// - **TopologyService**: single-writer thread behind an async handle
/// - **ChangeNotifier**: watch channel, broadcast events and callbacks
pub mod manager;

/// Display topology model
pub mod topology;

/// Utility functions
pub mod utils;

pub use manager::{DisplayManager, TopologyError, TopologyHandle, TopologyService};
pub use topology::{LogicalMonitor, Topology};
