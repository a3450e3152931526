//! Topology Generations
//!
//! A [`Topology`] is one immutable generation: probe results, the logical
//! monitors derived from them and the serial they were published under.
//! Generations are never patched; the manager builds the next one from a
//! fresh probe and swaps it in whole.

use serde::{Deserialize, Serialize};

use super::logical::{build_logical_monitors, LogicalMonitor};
use super::resources::Resources;
use super::types::{
    Crtc, CrtcId, Mode, ModeId, Output, OutputId, PowerSaveMode, Rect, ScreenSize, Transform,
};

/// Where a generation's resources came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyOrigin {
    /// Read from the selected backend
    Backend,
    /// Backend reported nothing; synthetic stand-in resources
    Fallback,
}

/// One published generation of the display topology
#[derive(Debug, Clone)]
pub struct Topology {
    serial: u64,
    origin: TopologyOrigin,
    resources: Resources,
    logical_monitors: Vec<LogicalMonitor>,
    primary_index: Option<usize>,
    crtc_monitor: Vec<Option<usize>>,
}

impl Topology {
    /// Build a generation from probe results
    pub fn build(serial: u64, origin: TopologyOrigin, resources: Resources) -> Self {
        let layout = build_logical_monitors(&resources.modes, &resources.crtcs, &resources.outputs);

        Self {
            serial,
            origin,
            resources,
            logical_monitors: layout.monitors,
            primary_index: layout.primary_index,
            crtc_monitor: layout.crtc_monitor,
        }
    }

    /// Generation serial
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Where the resources came from
    pub fn origin(&self) -> TopologyOrigin {
        self.origin
    }

    /// True when this generation is the synthetic stand-in for an empty probe
    pub fn is_fallback(&self) -> bool {
        self.origin == TopologyOrigin::Fallback
    }

    /// Raw probe results this generation was built from
    pub fn raw(&self) -> &Resources {
        &self.resources
    }

    /// All modes
    pub fn modes(&self) -> &[Mode] {
        &self.resources.modes
    }

    /// All CRTCs
    pub fn crtcs(&self) -> &[Crtc] {
        &self.resources.crtcs
    }

    /// Connected outputs
    pub fn outputs(&self) -> &[Output] {
        &self.resources.outputs
    }

    /// Logical monitors
    pub fn logical_monitors(&self) -> &[LogicalMonitor] {
        &self.logical_monitors
    }

    /// Index of the primary logical monitor
    pub fn primary_index(&self) -> Option<usize> {
        self.primary_index
    }

    /// Primary logical monitor
    pub fn primary_monitor(&self) -> Option<&LogicalMonitor> {
        self.primary_index.and_then(|i| self.logical_monitors.get(i))
    }

    /// Current screen size
    pub fn screen_size(&self) -> ScreenSize {
        self.resources.screen_size
    }

    /// Largest screen the backend can drive
    pub fn max_screen_size(&self) -> ScreenSize {
        self.resources.max_screen_size
    }

    /// Overall power state
    pub fn power_save_mode(&self) -> PowerSaveMode {
        self.resources.power_save_mode
    }

    /// Look up a mode
    pub fn mode(&self, id: ModeId) -> Option<&Mode> {
        self.resources.modes.get(id.index())
    }

    /// Look up a CRTC
    pub fn crtc(&self, id: CrtcId) -> Option<&Crtc> {
        self.resources.crtcs.get(id.index())
    }

    /// Look up an output
    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.resources.outputs.get(id.index())
    }

    /// Find an output by connector name
    pub fn output_by_name(&self, name: &str) -> Option<&Output> {
        self.resources.outputs.iter().find(|o| o.name == name)
    }

    /// Index of the logical monitor a CRTC contributes to
    pub fn logical_monitor_for_crtc(&self, id: CrtcId) -> Option<usize> {
        self.crtc_monitor.get(id.index()).copied().flatten()
    }

    /// Index of the logical monitor an output is shown on
    pub fn logical_monitor_for_output(&self, id: OutputId) -> Option<usize> {
        self.output(id)
            .and_then(|o| o.crtc)
            .and_then(|c| self.logical_monitor_for_crtc(c))
    }

    /// Logical monitor containing a point
    pub fn logical_monitor_at(&self, x: i32, y: i32) -> Option<&LogicalMonitor> {
        self.logical_monitors.iter().find(|m| m.rect.contains(x, y))
    }

    /// Serialisable snapshot for IPC layers
    pub fn resources(&self) -> ResourcesView {
        ResourcesView::from_topology(self)
    }
}

/// Flat, index-keyed snapshot of one generation
///
/// Mirrors what a configuration client needs to build an apply request:
/// every reference is an index into the same snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesView {
    /// Serial to quote back in an apply request
    pub serial: u64,
    /// CRTC records
    pub crtcs: Vec<CrtcView>,
    /// Output records
    pub outputs: Vec<OutputView>,
    /// Mode records
    pub modes: Vec<ModeView>,
    /// Largest screen the backend can drive
    pub max_screen_size: ScreenSize,
}

/// CRTC record of a [`ResourcesView`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrtcView {
    /// Index
    pub id: u32,
    /// Backend id
    pub winsys_id: u64,
    /// Scanned-out rectangle
    pub rect: Rect,
    /// Current mode index, `None` when unused
    pub current_mode: Option<u32>,
    /// Active transform number
    pub transform: u32,
    /// Supported transform numbers
    pub transforms: Vec<u32>,
}

/// Output record of a [`ResourcesView`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputView {
    /// Index
    pub id: u32,
    /// Backend id
    pub winsys_id: u64,
    /// Current CRTC index
    pub current_crtc: Option<u32>,
    /// Possible CRTC indices
    pub possible_crtcs: Vec<u32>,
    /// Connector name
    pub name: String,
    /// Supported mode indices
    pub modes: Vec<u32>,
    /// Clonable output indices
    pub clones: Vec<u32>,
    /// Extended properties
    pub properties: OutputProperties,
}

/// Output properties of a [`ResourcesView`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputProperties {
    /// EDID vendor
    pub vendor: String,
    /// EDID product
    pub product: String,
    /// EDID serial
    pub serial: String,
    /// Primary flag
    pub primary: bool,
    /// Presentation flag
    pub presentation: bool,
}

/// Mode record of a [`ResourcesView`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeView {
    /// Index
    pub id: u32,
    /// Backend id
    pub winsys_id: u64,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
    /// Refresh rate in Hz
    pub frequency: f64,
}

impl ResourcesView {
    fn from_topology(topology: &Topology) -> Self {
        let crtcs = topology
            .crtcs()
            .iter()
            .map(|crtc| CrtcView {
                id: crtc.id.0,
                winsys_id: crtc.winsys_id,
                rect: crtc.rect,
                current_mode: crtc.current_mode.map(|m| m.0),
                transform: crtc.transform.wire_id(),
                transforms: crtc.all_transforms.iter().map(Transform::wire_id).collect(),
            })
            .collect();

        let outputs = topology
            .outputs()
            .iter()
            .map(|output| OutputView {
                id: output.id.0,
                winsys_id: output.winsys_id,
                current_crtc: output.crtc.map(|c| c.0),
                possible_crtcs: output.possible_crtcs.iter().map(|c| c.0).collect(),
                name: output.name.clone(),
                modes: output.modes.iter().map(|m| m.0).collect(),
                clones: output.possible_clones.iter().map(|o| o.0).collect(),
                properties: OutputProperties {
                    vendor: output.vendor.clone(),
                    product: output.product.clone(),
                    serial: output.serial.clone(),
                    primary: output.is_primary,
                    presentation: output.is_presentation,
                },
            })
            .collect();

        let modes = topology
            .modes()
            .iter()
            .map(|mode| ModeView {
                id: mode.id.0,
                winsys_id: mode.winsys_id,
                width: mode.width,
                height: mode.height,
                frequency: mode.refresh_rate as f64,
            })
            .collect();

        Self {
            serial: topology.serial(),
            crtcs,
            outputs,
            modes,
            max_screen_size: topology.max_screen_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ResourcesBuilder;

    fn sample() -> Topology {
        let mut b = ResourcesBuilder::new(ScreenSize::new(8192, 8192));
        let hd = b.mode(1920, 1080, 60.0);
        let sxga = b.mode(1280, 1024, 75.0);
        let c0 = b.crtc_with_transforms(Transform::Normal | Transform::Rotate90);
        let c1 = b.crtc();
        let c2 = b.crtc();
        let a = b.output("DP-1", &[hd, sxga], &[c0, c1]);
        let o = b.output("DP-2", &[sxga], &[c1]);
        b.enable(c0, hd, 0, 0, &[a]).primary(a);
        b.enable(c1, sxga, 1920, 0, &[o]);
        let _ = c2;
        Topology::build(7, TopologyOrigin::Backend, b.build())
    }

    #[test]
    fn test_queries() {
        let t = sample();
        assert_eq!(t.serial(), 7);
        assert!(!t.is_fallback());
        assert_eq!(t.logical_monitors().len(), 2);
        assert_eq!(t.primary_index(), Some(0));
        assert_eq!(t.screen_size(), ScreenSize::new(3200, 1080));
        assert_eq!(t.max_screen_size(), ScreenSize::new(8192, 8192));
        assert_eq!(t.output_by_name("DP-2").map(|o| o.id), Some(OutputId(1)));
    }

    #[test]
    fn test_crtc_to_monitor_mapping() {
        let t = sample();
        assert_eq!(t.logical_monitor_for_crtc(CrtcId(0)), Some(0));
        assert_eq!(t.logical_monitor_for_crtc(CrtcId(1)), Some(1));
        assert_eq!(t.logical_monitor_for_crtc(CrtcId(2)), None);
        assert_eq!(t.logical_monitor_for_crtc(CrtcId(99)), None);
        assert_eq!(t.logical_monitor_for_output(OutputId(1)), Some(1));
    }

    #[test]
    fn test_monitor_at_point() {
        let t = sample();
        assert_eq!(t.logical_monitor_at(2000, 500).map(|m| m.index), Some(1));
        assert!(t.logical_monitor_at(2000, 1050).is_none());
    }

    #[test]
    fn test_resources_view_uses_indices() {
        let view = sample().resources();
        assert_eq!(view.serial, 7);
        assert_eq!(view.crtcs[0].transforms, vec![0, 1]);
        assert_eq!(view.crtcs[2].current_mode, None);
        assert_eq!(view.outputs[1].current_crtc, Some(1));
        assert_eq!(view.outputs[0].modes, vec![0, 1]);
        assert!(view.outputs[0].properties.primary);
        assert_eq!(view.modes[1].frequency, 75.0);
    }

    #[test]
    fn test_resources_view_serializes() {
        let json = serde_json::to_string(&sample().resources()).unwrap();
        assert!(json.contains("\"name\":\"DP-1\""));
    }
}
