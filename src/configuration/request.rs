//! Apply Requests
//!
//! A request describes the complete desired configuration. CRTCs it does not
//! mention are turned off.

use serde::{Deserialize, Serialize};

use crate::topology::{CrtcId, ModeId, OutputId, Transform};

/// Desired state of one CRTC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrtcAssignment {
    /// Target CRTC
    pub crtc: CrtcId,
    /// Mode to drive, `None` to disable
    #[serde(default)]
    pub mode: Option<ModeId>,
    /// Left edge
    #[serde(default)]
    pub x: i32,
    /// Top edge
    #[serde(default)]
    pub y: i32,
    /// Transform
    #[serde(default)]
    pub transform: Transform,
    /// Outputs to drive; the first one leads a clone group
    #[serde(default)]
    pub outputs: Vec<OutputId>,
}

impl CrtcAssignment {
    /// True when the assignment turns the CRTC off
    pub fn is_disable(&self) -> bool {
        self.mode.is_none()
    }
}

/// Flag changes for one output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPropertyChange {
    /// Target output
    pub output: OutputId,
    /// New primary flag, `None` keeps the current one
    #[serde(default)]
    pub primary: Option<bool>,
    /// New presentation flag, `None` keeps the current one
    #[serde(default)]
    pub presentation: Option<bool>,
}

/// A complete configuration request
///
/// ```
/// use lamco_display_manager::configuration::ApplyRequest;
/// use lamco_display_manager::topology::{CrtcId, ModeId, OutputId};
///
/// let request = ApplyRequest::new()
///     .enable(CrtcId(0), ModeId(2), 0, 0, &[OutputId(0)])
///     .disable(CrtcId(1))
///     .primary(OutputId(0));
/// assert_eq!(request.crtcs.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    /// Ask for the configuration to survive restarts (always refused)
    #[serde(default)]
    pub persistent: bool,
    /// CRTC assignments
    #[serde(default)]
    pub crtcs: Vec<CrtcAssignment>,
    /// Output flag changes
    #[serde(default)]
    pub outputs: Vec<OutputPropertyChange>,
}

impl ApplyRequest {
    /// Empty request; applying it turns every CRTC off
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistent flag
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Drive `outputs` from `crtc` with `mode` at (x, y)
    pub fn enable(self, crtc: CrtcId, mode: ModeId, x: i32, y: i32, outputs: &[OutputId]) -> Self {
        self.enable_transformed(crtc, mode, x, y, Transform::Normal, outputs)
    }

    /// Drive `outputs` from `crtc` with `mode` at (x, y) under `transform`
    pub fn enable_transformed(
        mut self,
        crtc: CrtcId,
        mode: ModeId,
        x: i32,
        y: i32,
        transform: Transform,
        outputs: &[OutputId],
    ) -> Self {
        self.crtcs.push(CrtcAssignment {
            crtc,
            mode: Some(mode),
            x,
            y,
            transform,
            outputs: outputs.to_vec(),
        });
        self
    }

    /// Turn `crtc` off
    pub fn disable(mut self, crtc: CrtcId) -> Self {
        self.crtcs.push(CrtcAssignment {
            crtc,
            mode: None,
            x: 0,
            y: 0,
            transform: Transform::Normal,
            outputs: Vec::new(),
        });
        self
    }

    /// Flag `output` primary
    pub fn primary(self, output: OutputId) -> Self {
        self.output_properties(output, Some(true), None)
    }

    /// Set or clear the presentation flag of `output`
    pub fn presentation(self, output: OutputId, presentation: bool) -> Self {
        self.output_properties(output, None, Some(presentation))
    }

    /// Add an output property entry
    pub fn output_properties(
        mut self,
        output: OutputId,
        primary: Option<bool>,
        presentation: Option<bool>,
    ) -> Self {
        self.outputs.push(OutputPropertyChange {
            output,
            primary,
            presentation,
        });
        self
    }
}
