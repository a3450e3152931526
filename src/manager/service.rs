//! Topology Service
//!
//! Runs a [`DisplayManager`] on a dedicated thread behind a bounded command
//! queue. Apply requests and hardware-change notifications are handled one
//! at a time in arrival order; readers take the current generation from a
//! `watch` channel without going through the queue.
//!
//! Hardware changes also raise a shared pending flag before they are queued,
//! so a full queue delays the re-query instead of losing it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::{ApplyOutcome, DisplayManager, Result, TopologyChanged, TopologyError};
use crate::configuration::ApplyRequest;
use crate::topology::{PowerSaveMode, Topology};

/// Work for the topology thread
#[derive(Debug)]
pub enum TopologyCommand {
    /// Apply a configuration
    Apply {
        /// Serial the request was built against
        serial: u64,
        /// The configuration
        request: ApplyRequest,
        /// Result channel
        reply: oneshot::Sender<Result<ApplyOutcome>>,
    },
    /// Backend reported a hardware change
    HardwareChanged,
    /// Change the overall power state
    SetPowerSave {
        /// New state
        mode: PowerSaveMode,
        /// Result channel
        reply: oneshot::Sender<Result<()>>,
    },
    /// Stop the thread
    Shutdown,
}

/// Cloneable client of a running [`TopologyService`]
#[derive(Debug, Clone)]
pub struct TopologyHandle {
    commands: mpsc::Sender<TopologyCommand>,
    topology: watch::Receiver<Arc<Topology>>,
    events: broadcast::Sender<TopologyChanged>,
    hardware_pending: Arc<AtomicBool>,
}

impl TopologyHandle {
    /// Current generation
    pub fn current(&self) -> Arc<Topology> {
        self.topology.borrow().clone()
    }

    /// Current serial
    pub fn serial(&self) -> u64 {
        self.topology.borrow().serial()
    }

    /// Apply a configuration built against generation `serial`
    pub async fn apply(&self, serial: u64, request: ApplyRequest) -> Result<ApplyOutcome> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(TopologyCommand::Apply {
                serial,
                request,
                reply,
            })
            .await
            .map_err(|_| TopologyError::ServiceStopped)?;
        response.await.map_err(|_| TopologyError::ServiceStopped)?
    }

    /// Change the overall power state
    pub async fn set_power_save_mode(&self, mode: PowerSaveMode) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(TopologyCommand::SetPowerSave { mode, reply })
            .await
            .map_err(|_| TopologyError::ServiceStopped)?;
        response.await.map_err(|_| TopologyError::ServiceStopped)?
    }

    /// Report a hardware change; callable from any thread
    ///
    /// Returns false once the service has stopped.
    pub fn hardware_changed(&self) -> bool {
        send_hardware_changed(&self.commands, &self.hardware_pending)
    }

    /// Receive change signals
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyChanged> {
        self.events.subscribe()
    }

    /// Follow the current generation
    pub fn watch(&self) -> watch::Receiver<Arc<Topology>> {
        self.topology.clone()
    }

    /// Ask the service thread to stop
    pub async fn shutdown(&self) {
        // Already stopped is fine
        let _ = self.commands.send(TopologyCommand::Shutdown).await;
    }
}

fn send_hardware_changed(
    commands: &mpsc::Sender<TopologyCommand>,
    pending: &AtomicBool,
) -> bool {
    // Raised first: the service checks it after every command
    pending.store(true, Ordering::Release);

    match commands.try_send(TopologyCommand::HardwareChanged) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("Command queue full, hardware change left pending");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Owner thread for a [`DisplayManager`]
pub struct TopologyService;

impl TopologyService {
    /// Start the service thread and the backend's hot-plug watcher
    ///
    /// # Arguments
    ///
    /// * `manager` - Manager moved onto the service thread
    /// * `queue_capacity` - Pending command capacity
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn spawn(
        mut manager: DisplayManager,
        queue_capacity: usize,
    ) -> std::io::Result<(TopologyHandle, JoinHandle<()>)> {
        let (commands, queue) = mpsc::channel(queue_capacity.max(1));
        let hardware_pending = Arc::new(AtomicBool::new(false));

        let handle = TopologyHandle {
            commands: commands.clone(),
            topology: manager.notifier().watch(),
            events: manager.notifier().events(),
            hardware_pending: Arc::clone(&hardware_pending),
        };

        // The watcher must not keep the queue open on its own
        let weak = commands.downgrade();
        let pending = Arc::clone(&hardware_pending);
        let watcher = manager.watch_hotplug(Box::new(move || {
            weak.upgrade()
                .map_or(false, |commands| send_hardware_changed(&commands, &pending))
        }));
        match watcher {
            Ok(Some(_)) => info!("Watching {} backend for hot-plug", manager.backend_kind()),
            Ok(None) => debug!("{} backend has no hot-plug source", manager.backend_kind()),
            Err(e) => warn!("Hot-plug watcher not started: {}", e),
        }

        let thread = std::thread::Builder::new()
            .name("topology".to_string())
            .spawn(move || run(manager, queue, hardware_pending))?;

        Ok((handle, thread))
    }
}

fn run(
    mut manager: DisplayManager,
    mut queue: mpsc::Receiver<TopologyCommand>,
    hardware_pending: Arc<AtomicBool>,
) {
    debug!("Topology service started at serial {}", manager.serial());

    while let Some(command) = queue.blocking_recv() {
        match command {
            TopologyCommand::Apply {
                serial,
                request,
                reply,
            } => {
                let _ = reply.send(manager.apply(serial, &request));
            }
            TopologyCommand::HardwareChanged => {
                hardware_pending.store(false, Ordering::Release);
                manager.handle_hardware_change();
            }
            TopologyCommand::SetPowerSave { mode, reply } => {
                let _ = reply.send(manager.set_power_save_mode(mode));
            }
            TopologyCommand::Shutdown => break,
        }

        // Changes reported while the queue was full
        if hardware_pending.swap(false, Ordering::AcqRel) {
            debug!("Handling hardware change left pending");
            manager.handle_hardware_change();
        }
    }

    info!("Topology service stopped at serial {}", manager.serial());
}
