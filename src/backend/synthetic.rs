//! Synthetic Backend
//!
//! Keeps a topology in memory and applies writes to it directly. Used for
//! headless and nested sessions, as the fallback when the real backend
//! reports nothing, and by tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::debug;

use super::{
    BackendError, BackendKind, CrtcWrite, DisplayBackend, HotplugCallback, OutputFlags, Result,
};
use crate::config::SyntheticConfig;
use crate::topology::{
    CrtcId, PowerSaveMode, Rect, Resources, ResourcesBuilder, ScreenSize, Transform,
};

/// Physical size reported for the enabled synthetic panel
const PANEL_SIZE_MM: (u32, u32) = (222, 125);

#[derive(Debug)]
struct SyntheticState {
    resources: Resources,
    failing_crtcs: HashSet<CrtcId>,
}

/// In-memory display backend
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticBackend {
    /// Create from a synthetic topology description
    pub fn new(config: SyntheticConfig) -> Self {
        Self::with_resources(Self::default_resources(&config))
    }

    /// Create from prepared resources
    pub fn with_resources(resources: Resources) -> Self {
        Self {
            state: Arc::new(Mutex::new(SyntheticState {
                resources,
                failing_crtcs: HashSet::new(),
            })),
        }
    }

    /// Build the deterministic topology described by `config`
    ///
    /// Every output supports every mode and CRTC and may clone every other
    /// output. The first output is enabled on the first CRTC with the first
    /// mode and flagged primary; the rest start disabled.
    pub fn default_resources(config: &SyntheticConfig) -> Resources {
        let mut builder =
            ResourcesBuilder::new(ScreenSize::new(config.max_width, config.max_height));

        let modes: Vec<_> = config
            .modes
            .iter()
            .map(|m| builder.mode(m.width, m.height, m.refresh))
            .collect();

        let crtcs: Vec<_> = (0..config.crtcs.max(1))
            .map(|_| builder.crtc_with_transforms(Transform::ALL.iter().copied().collect()))
            .collect();

        let outputs: Vec<_> = config
            .outputs
            .iter()
            .map(|name| builder.output(name, &modes, &crtcs))
            .collect();

        for (i, &a) in outputs.iter().enumerate() {
            for &b in &outputs[i + 1..] {
                builder.clones(a, b);
            }
        }

        if let (Some(&output), Some(&mode), Some(&crtc)) =
            (outputs.first(), modes.first(), crtcs.first())
        {
            builder
                .enable(crtc, mode, 0, 0, &[output])
                .primary(output)
                .physical_size(output, PANEL_SIZE_MM.0, PANEL_SIZE_MM.1);
        }

        builder.build()
    }

    /// Handle for changing the simulated hardware from outside the manager
    pub fn handle(&self) -> SyntheticHandle {
        SyntheticHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Shared access to a [`SyntheticBackend`]'s hardware state
#[derive(Debug, Clone)]
pub struct SyntheticHandle {
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticHandle {
    /// Replace the simulated hardware, as if monitors were plugged or unplugged
    pub fn replace(&self, resources: Resources) {
        self.state.lock().resources = resources;
    }

    /// Current simulated hardware
    pub fn resources(&self) -> Resources {
        self.state.lock().resources.clone()
    }

    /// Make every later write to `crtc` fail
    pub fn fail_crtc_writes(&self, crtc: CrtcId) {
        self.state.lock().failing_crtcs.insert(crtc);
    }
}

impl DisplayBackend for SyntheticBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn probe(&mut self) -> Result<Resources> {
        Ok(self.state.lock().resources.clone())
    }

    fn set_screen_size(&mut self, _current: &Resources, size: ScreenSize) -> Result<()> {
        self.state.lock().resources.screen_size = size;
        Ok(())
    }

    fn write_crtc(&mut self, _current: &Resources, write: &CrtcWrite) -> Result<()> {
        let mut state = self.state.lock();

        if state.failing_crtcs.contains(&write.crtc) {
            return Err(BackendError::Write(format!("{} rejected the configuration", write.crtc)));
        }

        let resources = &mut state.resources;
        let index = write.crtc.index();
        if index >= resources.crtcs.len() {
            return Err(BackendError::Write(format!("{} does not exist", write.crtc)));
        }

        let Some(set) = &write.config else {
            let crtc = &mut resources.crtcs[index];
            crtc.rect = Rect::default();
            crtc.current_mode = None;
            crtc.transform = Transform::Normal;
            for output in resources.outputs.iter_mut() {
                if output.crtc == Some(write.crtc) {
                    output.crtc = None;
                }
            }
            debug!("Synthetic {} disabled", write.crtc);
            return Ok(());
        };

        let mode = resources
            .modes
            .get(set.mode.index())
            .ok_or_else(|| BackendError::Write(format!("{} does not exist", set.mode)))?;
        let (width, height) = set.transform.apply_to_size(mode.width, mode.height);

        let crtc = &mut resources.crtcs[index];
        crtc.rect = Rect::new(set.x, set.y, width, height);
        crtc.current_mode = Some(set.mode);
        crtc.transform = set.transform;

        for output in resources.outputs.iter_mut() {
            if set.outputs.contains(&output.id) {
                output.crtc = Some(write.crtc);
            } else if output.crtc == Some(write.crtc) {
                output.crtc = None;
            }
        }

        debug!("Synthetic {} now {}", write.crtc, crtc.rect);
        Ok(())
    }

    fn write_output_flags(&mut self, _current: &Resources, flags: &[OutputFlags]) -> Result<()> {
        let mut state = self.state.lock();
        for flag in flags {
            if let Some(output) = state.resources.outputs.get_mut(flag.output.index()) {
                output.is_primary = flag.is_primary;
                output.is_presentation = flag.is_presentation;
            }
        }
        Ok(())
    }

    fn set_power_save_mode(&mut self, mode: PowerSaveMode) -> Result<()> {
        self.state.lock().resources.power_save_mode = mode;
        Ok(())
    }

    fn watch_hotplug(&mut self, _notify: HotplugCallback) -> Result<Option<JoinHandle<()>>> {
        Ok(None)
    }
}
