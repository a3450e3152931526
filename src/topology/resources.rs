//! Raw Probe Results
//!
//! [`Resources`] is what a backend probe returns: the complete set of modes,
//! CRTCs and outputs plus screen limits. [`ResourcesBuilder`] assembles one
//! by hand for the synthetic backend and for tests.

use serde::{Deserialize, Serialize};

use super::types::{
    Crtc, CrtcId, Mode, ModeId, Output, OutputId, PowerSaveMode, Rect, ScreenSize,
    SubpixelOrder, Transform, TransformSet,
};

/// Everything a backend probe reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// All modes referenced by CRTCs and outputs
    pub modes: Vec<Mode>,
    /// All CRTCs, used or not
    pub crtcs: Vec<Crtc>,
    /// Connected outputs only
    pub outputs: Vec<Output>,
    /// Current screen size
    pub screen_size: ScreenSize,
    /// Largest screen the backend can drive
    pub max_screen_size: ScreenSize,
    /// Overall power state
    pub power_save_mode: PowerSaveMode,
}

impl Resources {
    /// True when the probe found nothing to display on
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Bounding extents of every active CRTC, clamped at the origin
    pub fn crtc_extents(&self) -> ScreenSize {
        let mut width = 0i64;
        let mut height = 0i64;

        for crtc in self.crtcs.iter().filter(|c| c.is_active()) {
            width = width.max(crtc.rect.right());
            height = height.max(crtc.rect.bottom());
        }

        ScreenSize::new(
            width.clamp(0, u32::MAX as i64) as u32,
            height.clamp(0, u32::MAX as i64) as u32,
        )
    }

    /// Check the structural invariants of a probe result
    ///
    /// - every id matches its array position
    /// - a CRTC has a non-empty rectangle iff it has a current mode
    /// - every reference points inside the arrays
    /// - an output's CRTC is one of its possible CRTCs
    pub fn check_invariants(&self) -> Result<(), String> {
        for (i, mode) in self.modes.iter().enumerate() {
            if mode.id.index() != i {
                return Err(format!("{} stored at position {}", mode.id, i));
            }
        }

        for (i, crtc) in self.crtcs.iter().enumerate() {
            if crtc.id.index() != i {
                return Err(format!("{} stored at position {}", crtc.id, i));
            }
            if crtc.rect.is_empty() != crtc.current_mode.is_none() {
                return Err(format!(
                    "{} has rectangle {} but mode {:?}",
                    crtc.id, crtc.rect, crtc.current_mode
                ));
            }
            if let Some(mode) = crtc.current_mode {
                if mode.index() >= self.modes.len() {
                    return Err(format!("{} references missing {}", crtc.id, mode));
                }
            }
        }

        for (i, output) in self.outputs.iter().enumerate() {
            if output.id.index() != i {
                return Err(format!("{} stored at position {}", output.id, i));
            }
            if let Some(mode) = output.modes.iter().find(|m| m.index() >= self.modes.len()) {
                return Err(format!("{} references missing {}", output.id, mode));
            }
            if let Some(crtc) = output
                .possible_crtcs
                .iter()
                .find(|c| c.index() >= self.crtcs.len())
            {
                return Err(format!("{} references missing {}", output.id, crtc));
            }
            if let Some(clone) = output
                .possible_clones
                .iter()
                .find(|o| o.index() >= self.outputs.len())
            {
                return Err(format!("{} references missing {}", output.id, clone));
            }
            if let Some(crtc) = output.crtc {
                if !output.can_use_crtc(crtc) {
                    return Err(format!(
                        "{} is driven by {} outside its possible CRTCs",
                        output.id, crtc
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Builder for hand-made resources
///
/// ```
/// use lamco_display_manager::topology::{ResourcesBuilder, ScreenSize};
///
/// let mut builder = ResourcesBuilder::new(ScreenSize::new(8192, 8192));
/// let mode = builder.mode(1920, 1080, 60.0);
/// let crtc = builder.crtc();
/// let output = builder.output("HDMI-1", &[mode], &[crtc]);
/// builder.enable(crtc, mode, 0, 0, &[output]);
/// let resources = builder.build();
/// assert_eq!(resources.screen_size, ScreenSize::new(1920, 1080));
/// ```
#[derive(Debug, Clone)]
pub struct ResourcesBuilder {
    resources: Resources,
    next_winsys_id: u64,
}

impl ResourcesBuilder {
    /// Start an empty set of resources
    pub fn new(max_screen_size: ScreenSize) -> Self {
        Self {
            resources: Resources {
                max_screen_size,
                power_save_mode: PowerSaveMode::On,
                ..Resources::default()
            },
            next_winsys_id: 1,
        }
    }

    fn winsys_id(&mut self) -> u64 {
        let id = self.next_winsys_id;
        self.next_winsys_id += 1;
        id
    }

    /// Add a mode
    pub fn mode(&mut self, width: u32, height: u32, refresh_rate: f32) -> ModeId {
        let id = ModeId::from(self.resources.modes.len());
        let winsys_id = self.winsys_id();
        self.resources.modes.push(Mode {
            id,
            winsys_id,
            name: format!("{}x{}", width, height),
            width,
            height,
            refresh_rate,
        });
        id
    }

    /// Add an unused CRTC supporting only the normal transform
    pub fn crtc(&mut self) -> CrtcId {
        self.crtc_with_transforms(Transform::Normal.into())
    }

    /// Add an unused CRTC with a transform capability set
    pub fn crtc_with_transforms(&mut self, all_transforms: TransformSet) -> CrtcId {
        let id = CrtcId::from(self.resources.crtcs.len());
        let winsys_id = self.winsys_id();
        self.resources.crtcs.push(Crtc {
            id,
            winsys_id,
            rect: Rect::default(),
            current_mode: None,
            transform: Transform::Normal,
            all_transforms,
        });
        id
    }

    /// Add a detached output; the first mode is the preferred one
    pub fn output(&mut self, name: &str, modes: &[ModeId], possible_crtcs: &[CrtcId]) -> OutputId {
        let id = OutputId::from(self.resources.outputs.len());
        let winsys_id = self.winsys_id();
        self.resources.outputs.push(Output {
            id,
            winsys_id,
            name: name.to_string(),
            vendor: "unknown".to_string(),
            product: "unknown".to_string(),
            serial: String::new(),
            width_mm: 0,
            height_mm: 0,
            subpixel_order: SubpixelOrder::Unknown,
            modes: modes.to_vec(),
            preferred_mode: modes.first().copied(),
            possible_crtcs: possible_crtcs.to_vec(),
            possible_clones: Vec::new(),
            crtc: None,
            is_primary: false,
            is_presentation: false,
        });
        id
    }

    /// Set an output's physical size
    pub fn physical_size(&mut self, output: OutputId, width_mm: u32, height_mm: u32) -> &mut Self {
        if let Some(o) = self.resources.outputs.get_mut(output.index()) {
            o.width_mm = width_mm;
            o.height_mm = height_mm;
        }
        self
    }

    /// Let two outputs share a CRTC
    pub fn clones(&mut self, a: OutputId, b: OutputId) -> &mut Self {
        self.one_way_clone(a, b);
        self.one_way_clone(b, a);
        self
    }

    /// Let `output` share a CRTC with `clone`, without the reverse
    pub fn one_way_clone(&mut self, output: OutputId, clone: OutputId) -> &mut Self {
        if let Some(o) = self.resources.outputs.get_mut(output.index()) {
            if !o.possible_clones.contains(&clone) {
                o.possible_clones.push(clone);
            }
        }
        self
    }

    /// Drive `outputs` from `crtc` with `mode` at (x, y)
    pub fn enable(
        &mut self,
        crtc: CrtcId,
        mode: ModeId,
        x: i32,
        y: i32,
        outputs: &[OutputId],
    ) -> &mut Self {
        let Some(m) = self.resources.modes.get(mode.index()) else {
            return self;
        };
        let (width, height) = (m.width, m.height);

        if let Some(c) = self.resources.crtcs.get_mut(crtc.index()) {
            c.rect = Rect::new(x, y, width, height);
            c.current_mode = Some(mode);
        }
        for output in outputs {
            if let Some(o) = self.resources.outputs.get_mut(output.index()) {
                o.crtc = Some(crtc);
            }
        }
        self
    }

    /// Flag an output as primary
    pub fn primary(&mut self, output: OutputId) -> &mut Self {
        if let Some(o) = self.resources.outputs.get_mut(output.index()) {
            o.is_primary = true;
        }
        self
    }

    /// Flag an output as presentation
    pub fn presentation(&mut self, output: OutputId) -> &mut Self {
        if let Some(o) = self.resources.outputs.get_mut(output.index()) {
            o.is_presentation = true;
        }
        self
    }

    /// Finish, computing the current screen size from the active CRTCs
    pub fn build(mut self) -> Resources {
        self.resources.screen_size = self.resources.crtc_extents();
        self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_heads() -> Resources {
        let mut b = ResourcesBuilder::new(ScreenSize::new(4096, 4096));
        let hd = b.mode(1920, 1080, 60.0);
        let sxga = b.mode(1280, 1024, 60.0);
        let c0 = b.crtc();
        let c1 = b.crtc();
        let a = b.output("DP-1", &[hd, sxga], &[c0, c1]);
        let o = b.output("DP-2", &[sxga], &[c0, c1]);
        b.enable(c0, hd, 0, 0, &[a]);
        b.enable(c1, sxga, 1920, 0, &[o]);
        b.build()
    }

    #[test]
    fn test_builder_satisfies_invariants() {
        let resources = two_heads();
        assert!(resources.check_invariants().is_ok());
        assert_eq!(resources.screen_size, ScreenSize::new(3200, 1080));
    }

    #[test]
    fn test_invariant_rect_without_mode() {
        let mut resources = two_heads();
        resources.crtcs[1].current_mode = None;
        assert!(resources.check_invariants().is_err());
    }

    #[test]
    fn test_invariant_crtc_outside_possible_set() {
        let mut resources = two_heads();
        resources.outputs[0].possible_crtcs = vec![CrtcId(1)];
        let err = resources.check_invariants().unwrap_err();
        assert!(err.contains("outside its possible CRTCs"));
    }

    #[test]
    fn test_extents_ignore_inactive_crtcs() {
        let mut b = ResourcesBuilder::new(ScreenSize::new(4096, 4096));
        b.mode(800, 600, 60.0);
        b.crtc();
        let resources = b.build();
        assert_eq!(resources.crtc_extents(), ScreenSize::new(0, 0));
    }

    #[test]
    fn test_clones_are_symmetric() {
        let mut b = ResourcesBuilder::new(ScreenSize::new(4096, 4096));
        let m = b.mode(800, 600, 60.0);
        let c = b.crtc();
        let x = b.output("A", &[m], &[c]);
        let y = b.output("B", &[m], &[c]);
        b.clones(x, y);
        let resources = b.build();
        assert!(resources.outputs[0].can_clone(y));
        assert!(resources.outputs[1].can_clone(x));
    }
}
