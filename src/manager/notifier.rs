//! Change Notification
//!
//! Publishes each new generation and tells observers that the topology
//! changed. Observers get no payload beyond the new serial; they re-query.
//!
//! Three ways to observe:
//! - [`ChangeNotifier::connect`]: synchronous callback, run on the manager's
//!   thread right after publication
//! - [`ChangeNotifier::subscribe`]: async broadcast of [`TopologyChanged`]
//! - [`ChangeNotifier::watch`]: `watch` receiver always holding the current
//!   generation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::topology::Topology;

/// Topology changed signal
///
/// The serial is advisory. By the time a subscriber reads the signal, later
/// generations may already be current, and a lagging receiver skips signals
/// entirely. Observers re-query the current generation on every signal and
/// never rebuild state from the serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyChanged {
    /// Serial of the generation that triggered the signal
    pub serial: u64,
}

/// Handle for disconnecting a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Generation publisher and observer registry
pub struct ChangeNotifier {
    topology_tx: watch::Sender<Arc<Topology>>,
    events_tx: broadcast::Sender<TopologyChanged>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl ChangeNotifier {
    /// Create with the first generation already published
    pub fn new(initial: Arc<Topology>, capacity: usize) -> Self {
        let (topology_tx, _) = watch::channel(initial);
        let (events_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            topology_tx,
            events_tx,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Currently published generation
    pub fn current(&self) -> Arc<Topology> {
        self.topology_tx.borrow().clone()
    }

    /// Register a callback fired after every publication
    pub fn connect<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns false if it was not registered
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    /// Receive change signals asynchronously
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyChanged> {
        self.events_tx.subscribe()
    }

    /// Sender used to hand out more change subscriptions
    pub fn events(&self) -> broadcast::Sender<TopologyChanged> {
        self.events_tx.clone()
    }

    /// Follow the current generation
    pub fn watch(&self) -> watch::Receiver<Arc<Topology>> {
        self.topology_tx.subscribe()
    }

    /// Make `topology` current, then signal observers
    pub(crate) fn publish(&self, topology: Arc<Topology>) {
        let serial = topology.serial();
        self.topology_tx.send_replace(topology);

        // Callbacks may connect or disconnect; run them outside the lock
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }

        // No subscribers is fine
        let receivers = self.events_tx.send(TopologyChanged { serial }).unwrap_or(0);
        trace!(
            "Published generation {} to {} subscribers",
            serial,
            receivers
        );
    }
}
