//! Display Manager
//!
//! The context object owning the backend and the current topology
//! generation.
//!
//! # Overview
//!
//! ```text
//!  apply(serial, request) ─┐
//!                          ├─> DisplayManager ──> Backend ──> probe
//!  hardware change ────────┘         │                          │
//!                                    │<──── Topology N+1 <───────┘
//!                                    └──> ChangeNotifier ──> observers
//! ```
//!
//! [`DisplayManager`] is a plain `&mut self` state machine. Callers that need
//! the two triggers serialised across threads go through
//! [`TopologyService`], which owns the manager on one thread.
//!
//! # Example
//!
//! ```
//! use lamco_display_manager::backend::SyntheticBackend;
//! use lamco_display_manager::config::SyntheticConfig;
//! use lamco_display_manager::configuration::ApplyRequest;
//! use lamco_display_manager::manager::DisplayManager;
//! use lamco_display_manager::topology::{CrtcId, ModeId, OutputId};
//!
//! let backend = SyntheticBackend::new(SyntheticConfig::default());
//! let mut manager = DisplayManager::new(Box::new(backend), SyntheticConfig::default(), 8);
//!
//! let serial = manager.serial();
//! let request = ApplyRequest::new()
//!     .enable(CrtcId(0), ModeId(2), 0, 0, &[OutputId(0)])
//!     .primary(OutputId(0));
//! manager.apply(serial, &request).unwrap();
//!
//! assert_eq!(manager.serial(), serial + 1);
//! assert_eq!(manager.screen_size().width, 1920);
//! ```

mod notifier;
mod service;

pub use notifier::{ChangeNotifier, ListenerId, TopologyChanged};
pub use service::{TopologyCommand, TopologyHandle, TopologyService};

use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{
    select_backend, BackendError, BackendKind, DisplayBackend, HotplugCallback, SyntheticBackend,
};
use crate::config::{Config, SyntheticConfig};
use crate::configuration::{self, ApplyReport, ApplyRequest, ValidationError};
use crate::topology::{
    LogicalMonitor, Output, PowerSaveMode, Resources, ScreenSize, Topology, TopologyOrigin,
};

/// Manager result type
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors returned to configuration clients
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// Request broke a validation rule
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Request was built against an older generation
    #[error("Stale configuration serial {got}, current is {expected}")]
    StaleRequest {
        /// Current serial
        expected: u64,
        /// Serial in the request
        got: u64,
    },

    /// Operation not available
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Backend refused a non-configuration write
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Topology service is gone
    #[error("Topology service stopped")]
    ServiceStopped,
}

/// Result of a successful apply
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    /// Serial of the generation built after the apply
    pub serial: u64,
    /// Per-write results
    pub report: ApplyReport,
}

/// Owner of the backend and the current topology generation
pub struct DisplayManager {
    backend: Box<dyn DisplayBackend>,
    fallback: SyntheticConfig,
    /// Writable stand-in while the backend reports no outputs
    stand_in: Option<SyntheticBackend>,
    current: Arc<Topology>,
    notifier: ChangeNotifier,
}

impl DisplayManager {
    /// Probe `backend` and publish the first generation
    ///
    /// # Arguments
    ///
    /// * `backend` - Hardware source, fixed for the manager's lifetime
    /// * `fallback` - Topology used whenever the backend reports no outputs
    /// * `notifier_capacity` - Buffered change signals per async subscriber
    pub fn new(
        mut backend: Box<dyn DisplayBackend>,
        fallback: SyntheticConfig,
        notifier_capacity: usize,
    ) -> Self {
        let mut stand_in = None;
        let (resources, origin) = probe_or_fallback(backend.as_mut(), &mut stand_in, &fallback);
        let current = Arc::new(Topology::build(1, origin, resources));
        log_generation(&current, backend.kind());

        Self {
            backend,
            fallback,
            stand_in,
            notifier: ChangeNotifier::new(Arc::clone(&current), notifier_capacity),
            current,
        }
    }

    /// Select a backend from `config` and probe it
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            select_backend(config),
            config.synthetic.clone(),
            config.service.notifier_capacity,
        )
    }

    /// Current generation
    pub fn current(&self) -> Arc<Topology> {
        Arc::clone(&self.current)
    }

    /// Current serial
    pub fn serial(&self) -> u64 {
        self.current.serial()
    }

    /// Logical monitors of the current generation
    pub fn logical_monitors(&self) -> &[LogicalMonitor] {
        self.current.logical_monitors()
    }

    /// Outputs of the current generation
    pub fn outputs(&self) -> &[Output] {
        self.current.outputs()
    }

    /// Index of the primary logical monitor
    pub fn primary_index(&self) -> Option<usize> {
        self.current.primary_index()
    }

    /// Current screen size
    pub fn screen_size(&self) -> ScreenSize {
        self.current.screen_size()
    }

    /// Largest screen the backend can drive
    pub fn max_screen_size(&self) -> ScreenSize {
        self.current.max_screen_size()
    }

    /// Selected backend
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Change notification registry
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Apply a complete configuration
    ///
    /// # Arguments
    ///
    /// * `serial` - Serial of the generation the request was built against
    /// * `request` - Full replacement configuration
    ///
    /// # Errors
    ///
    /// Fails without touching the topology when the request asks for
    /// persistence, quotes a stale serial, targets a read-only backend, or
    /// breaks a validation rule. Individual CRTC write failures do not fail
    /// the call; they are listed in the outcome's report.
    ///
    /// A fallback generation is written to its synthetic stand-in, whatever
    /// the real backend is.
    pub fn apply(&mut self, serial: u64, request: &ApplyRequest) -> Result<ApplyOutcome> {
        let result = self.try_apply(serial, request);
        if let Err(e) = &result {
            warn!("Rejected configuration request: {}", e);
        }
        result
    }

    fn try_apply(&mut self, serial: u64, request: &ApplyRequest) -> Result<ApplyOutcome> {
        if request.persistent {
            return Err(TopologyError::Unsupported(
                "persistent configuration".to_string(),
            ));
        }

        if serial != self.current.serial() {
            return Err(TopologyError::StaleRequest {
                expected: self.current.serial(),
                got: serial,
            });
        }

        if self.stand_in.is_none() && !self.backend.is_writable() {
            return Err(TopologyError::Unsupported(format!(
                "{} backend is read-only",
                self.backend.kind()
            )));
        }

        configuration::validate(&self.current, request)?;

        let plan = configuration::plan(&self.current, request);
        debug!(
            "Applying {} disables and {} enables, screen {}x{}",
            plan.disables.len(),
            plan.enables.len(),
            plan.screen_size.width,
            plan.screen_size.height
        );
        let report = match self.stand_in.as_mut() {
            Some(stand_in) => configuration::commit(stand_in, &self.current, &plan),
            None => configuration::commit(self.backend.as_mut(), &self.current, &plan),
        };

        let (resources, origin) = self.refresh_resources();
        self.publish(resources, origin);

        Ok(ApplyOutcome {
            serial: self.current.serial(),
            report,
        })
    }

    /// Re-probe after the backend reported a hardware change
    ///
    /// Returns true when a new generation was published.
    pub fn handle_hardware_change(&mut self) -> bool {
        let (resources, origin) = self.refresh_resources();

        if origin == self.current.origin() && &resources == self.current.raw() {
            debug!("Hardware change left the topology as it was");
            return false;
        }

        self.publish(resources, origin);
        true
    }

    /// Change the overall power state, then refresh the topology
    pub fn set_power_save_mode(&mut self, mode: PowerSaveMode) -> Result<()> {
        match self.stand_in.as_mut() {
            Some(stand_in) => stand_in.set_power_save_mode(mode)?,
            None if self.backend.is_writable() => self.backend.set_power_save_mode(mode)?,
            None => {
                return Err(TopologyError::Unsupported(format!(
                    "{} backend cannot change power state",
                    self.backend.kind()
                )))
            }
        }
        info!("Power save mode set to {}", mode);
        self.handle_hardware_change();
        Ok(())
    }

    /// Start the backend's hot-plug watcher, if it has one
    pub fn watch_hotplug(
        &mut self,
        notify: HotplugCallback,
    ) -> std::result::Result<Option<JoinHandle<()>>, BackendError> {
        self.backend.watch_hotplug(notify)
    }

    fn refresh_resources(&mut self) -> (Resources, TopologyOrigin) {
        probe_or_fallback(self.backend.as_mut(), &mut self.stand_in, &self.fallback)
    }

    fn publish(&mut self, resources: Resources, origin: TopologyOrigin) {
        let next = Arc::new(Topology::build(
            self.current.serial() + 1,
            origin,
            resources,
        ));
        log_generation(&next, self.backend.kind());

        self.current = Arc::clone(&next);
        self.notifier.publish(next);
    }
}

/// Read the backend, switching to or from the synthetic stand-in
///
/// The stand-in lives for as long as the backend stays empty, so changes
/// applied to a fallback generation survive later refreshes.
fn probe_or_fallback(
    backend: &mut dyn DisplayBackend,
    stand_in: &mut Option<SyntheticBackend>,
    fallback: &SyntheticConfig,
) -> (Resources, TopologyOrigin) {
    match backend.probe() {
        Ok(resources) if !resources.is_empty() => {
            if stand_in.take().is_some() {
                info!("{} backend reports outputs again", backend.kind());
            }
            return (resources, TopologyOrigin::Backend);
        }
        Ok(_) => warn!("{} backend reported no outputs", backend.kind()),
        Err(e) => warn!("{} probe failed: {}", backend.kind(), e),
    }

    let stand_in = stand_in.get_or_insert_with(|| {
        info!("Using synthetic fallback topology");
        SyntheticBackend::new(fallback.clone())
    });
    let resources = stand_in
        .probe()
        .unwrap_or_else(|_| SyntheticBackend::default_resources(fallback));
    (resources, TopologyOrigin::Fallback)
}

fn log_generation(topology: &Topology, kind: BackendKind) {
    info!(
        "Topology generation {} ({} backend{}): {} logical monitors, {} outputs, screen {}x{}",
        topology.serial(),
        kind,
        if topology.is_fallback() { ", fallback" } else { "" },
        topology.logical_monitors().len(),
        topology.outputs().len(),
        topology.screen_size().width,
        topology.screen_size().height
    );
}
