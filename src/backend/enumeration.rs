//! Compositor Output Enumeration Backend
//!
//! Builds resources from a plain list of rectangles: one CRTC and one output
//! per rectangle, modes shared between rectangles with the same timing.
//! Read-only; the compositor owns the real configuration.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::RwLock;

use super::{
    BackendError, BackendKind, CrtcWrite, DisplayBackend, HotplugCallback, OutputFlags, Result,
};
use crate::config::{EnumeratedOutput, EnumerationConfig};
use crate::topology::{ModeId, PowerSaveMode, Resources, ResourcesBuilder, ScreenSize};

/// Something that can list the compositor's current outputs
pub trait OutputSource: Send + Sync {
    /// Current output rectangles, in compositor order
    fn outputs(&self) -> Vec<EnumeratedOutput>;
}

/// Output list updated by whoever talks to the compositor
#[derive(Debug, Clone, Default)]
pub struct SharedOutputSource {
    outputs: Arc<RwLock<Vec<EnumeratedOutput>>>,
}

impl SharedOutputSource {
    /// Create with an initial list
    pub fn new(outputs: Vec<EnumeratedOutput>) -> Self {
        Self {
            outputs: Arc::new(RwLock::new(outputs)),
        }
    }

    /// Replace the list
    pub fn set(&self, outputs: Vec<EnumeratedOutput>) {
        *self.outputs.write() = outputs;
    }
}

impl OutputSource for SharedOutputSource {
    fn outputs(&self) -> Vec<EnumeratedOutput> {
        self.outputs.read().clone()
    }
}

/// Read-only backend over a compositor output list
pub struct EnumerationBackend {
    source: Box<dyn OutputSource>,
}

impl EnumerationBackend {
    /// Create over any output source
    pub fn new(source: Box<dyn OutputSource>) -> Self {
        Self { source }
    }

    /// Create over the outputs listed in the config file
    pub fn from_config(config: &EnumerationConfig) -> Self {
        Self::new(Box::new(SharedOutputSource::new(config.outputs.clone())))
    }
}

/// Convert a rectangle list into resources
pub fn resources_from_outputs(outputs: &[EnumeratedOutput]) -> Resources {
    let extents = outputs.iter().fold((0i64, 0i64), |(w, h), o| {
        (
            w.max(o.x as i64 + o.width as i64),
            h.max(o.y as i64 + o.height as i64),
        )
    });
    let max = ScreenSize::new(
        extents.0.clamp(0, u32::MAX as i64) as u32,
        extents.1.clamp(0, u32::MAX as i64) as u32,
    );

    let mut builder = ResourcesBuilder::new(max);
    let mut known_modes: Vec<(u32, u32, f32, ModeId)> = Vec::new();

    for (i, reported) in outputs.iter().enumerate() {
        let mode = find_or_create_mode(&mut builder, &mut known_modes, reported);
        let crtc = builder.crtc();
        let name = reported.name.as_deref().unwrap_or("unknown");
        let output = builder.output(name, &[mode], &[crtc]);

        builder
            .enable(crtc, mode, reported.x, reported.y, &[output])
            .physical_size(output, reported.width_mm, reported.height_mm);
        if i == 0 {
            builder.primary(output);
        }
    }

    let mut resources = builder.build();
    resources.power_save_mode = PowerSaveMode::Unsupported;
    resources
}

fn find_or_create_mode(
    builder: &mut ResourcesBuilder,
    known: &mut Vec<(u32, u32, f32, ModeId)>,
    reported: &EnumeratedOutput,
) -> ModeId {
    if let Some(&(_, _, _, id)) = known.iter().find(|(w, h, r, _)| {
        *w == reported.width && *h == reported.height && *r == reported.refresh
    }) {
        return id;
    }

    let id = builder.mode(reported.width, reported.height, reported.refresh);
    known.push((reported.width, reported.height, reported.refresh, id));
    id
}

impl DisplayBackend for EnumerationBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Enumeration
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn probe(&mut self) -> Result<Resources> {
        Ok(resources_from_outputs(&self.source.outputs()))
    }

    fn set_screen_size(&mut self, _current: &Resources, _size: ScreenSize) -> Result<()> {
        Err(BackendError::Unsupported(BackendKind::Enumeration))
    }

    fn write_crtc(&mut self, _current: &Resources, _write: &CrtcWrite) -> Result<()> {
        Err(BackendError::Unsupported(BackendKind::Enumeration))
    }

    fn write_output_flags(&mut self, _current: &Resources, _flags: &[OutputFlags]) -> Result<()> {
        Err(BackendError::Unsupported(BackendKind::Enumeration))
    }

    fn set_power_save_mode(&mut self, _mode: PowerSaveMode) -> Result<()> {
        Err(BackendError::Unsupported(BackendKind::Enumeration))
    }

    fn watch_hotplug(&mut self, _notify: HotplugCallback) -> Result<Option<JoinHandle<()>>> {
        Ok(None)
    }
}
