//! XRandR Backend
//!
//! Reads and writes the X server's screen resources through the RandR
//! extension.
//!
//! Probing reads modes first so CRTCs and outputs can refer to them by
//! position. Output clone lists name outputs by XID, some of which are not
//! built yet when an output is read, so clones are resolved in a second pass
//! once every connected output has its index.

use std::collections::HashMap;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::dpms::{ConnectionExt as DpmsConnectionExt, DPMSMode};
use x11rb::protocol::randr::{
    self, ConnectionExt as RandrConnectionExt, GetScreenResourcesCurrentReply, NotifyMask, Rotation, SetConfig,
};
use x11rb::protocol::render::SubPixel;
use x11rb::protocol::xproto::{ConnectionExt as XprotoConnectionExt, Window};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::edid;
use super::{
    BackendError, BackendKind, CrtcWrite, DisplayBackend, HotplugCallback, OutputFlags, Result,
};
use crate::topology::{
    Crtc, CrtcId, Mode, ModeId, Output, OutputId, PowerSaveMode, Rect, Resources, ScreenSize,
    SubpixelOrder, Transform, TransformSet,
};

/// Lowest RandR version with GetScreenResourcesCurrent and output primary
const RANDR_MAJOR: u32 = 1;
const RANDR_MINOR: u32 = 3;

/// DPI used to derive the physical screen size on resize
const SCREEN_DPI: f64 = 96.0;

fn connection_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::Connection(e.to_string())
}

fn probe_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::Probe(e.to_string())
}

fn write_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::Write(e.to_string())
}

/// RandR-backed display backend
pub struct XrandrBackend {
    conn: RustConnection,
    display: Option<String>,
    root: Window,
    config_timestamp: u32,
    edid_atom: u32,
    /// Presentation flags by output XID; X has no such property
    presentation: HashMap<u32, bool>,
}

impl XrandrBackend {
    /// Connect to an X server and check for RandR 1.3+
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(display).map_err(connection_error)?;

        if conn
            .extension_information(randr::X11_EXTENSION_NAME)
            .map_err(connection_error)?
            .is_none()
        {
            return Err(BackendError::Connection(
                "X server has no RandR extension".to_string(),
            ));
        }

        let version = conn
            .randr_query_version(RANDR_MAJOR, RANDR_MINOR)
            .map_err(connection_error)?
            .reply()
            .map_err(connection_error)?;
        if (version.major_version, version.minor_version) < (RANDR_MAJOR, RANDR_MINOR) {
            return Err(BackendError::Connection(format!(
                "RandR {}.{} is too old",
                version.major_version, version.minor_version
            )));
        }

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| BackendError::Connection(format!("no screen {}", screen_num)))?;

        let edid_atom = conn
            .intern_atom(false, b"EDID")
            .map_err(connection_error)?
            .reply()
            .map_err(connection_error)?
            .atom;

        info!(
            "Connected to X server (RandR {}.{})",
            version.major_version, version.minor_version
        );

        Ok(Self {
            conn,
            display: display.map(str::to_string),
            root,
            config_timestamp: x11rb::CURRENT_TIME,
            edid_atom,
            presentation: HashMap::new(),
        })
    }

    fn read_modes(res: &GetScreenResourcesCurrentReply) -> (Vec<Mode>, HashMap<u32, ModeId>) {
        let mut modes = Vec::with_capacity(res.modes.len());
        let mut by_xid = HashMap::with_capacity(res.modes.len());
        let mut names = res.names.as_slice();

        for (i, info) in res.modes.iter().enumerate() {
            let len = (info.name_len as usize).min(names.len());
            let (name, rest) = names.split_at(len);
            names = rest;

            let id = ModeId::from(i);
            by_xid.insert(info.id, id);
            modes.push(Mode {
                id,
                winsys_id: info.id as u64,
                name: String::from_utf8_lossy(name).into_owned(),
                width: info.width as u32,
                height: info.height as u32,
                refresh_rate: refresh_rate(info.dot_clock, info.htotal, info.vtotal),
            });
        }

        (modes, by_xid)
    }

    fn read_crtcs(
        &self,
        res: &GetScreenResourcesCurrentReply,
        modes: &HashMap<u32, ModeId>,
    ) -> Result<(Vec<Crtc>, HashMap<u32, CrtcId>)> {
        let mut crtcs = Vec::with_capacity(res.crtcs.len());
        let mut by_xid = HashMap::with_capacity(res.crtcs.len());

        for (i, &xid) in res.crtcs.iter().enumerate() {
            let info = self
                .conn
                .randr_get_crtc_info(xid, res.config_timestamp)
                .map_err(probe_error)?
                .reply()
                .map_err(probe_error)?;

            let id = CrtcId::from(i);
            by_xid.insert(xid, id);

            let current_mode = modes.get(&info.mode).copied();
            let rect = match current_mode {
                Some(_) => Rect::new(
                    info.x as i32,
                    info.y as i32,
                    info.width as u32,
                    info.height as u32,
                ),
                None => Rect::default(),
            };

            crtcs.push(Crtc {
                id,
                winsys_id: xid as u64,
                rect,
                current_mode,
                transform: transform_from_rotation(info.rotation).unwrap_or_default(),
                all_transforms: transforms_from_rotations(info.rotations),
            });
        }

        Ok((crtcs, by_xid))
    }

    fn read_outputs(
        &self,
        res: &GetScreenResourcesCurrentReply,
        modes: &HashMap<u32, ModeId>,
        crtcs: &HashMap<u32, CrtcId>,
    ) -> Result<Vec<Output>> {
        let primary = self
            .conn
            .randr_get_output_primary(self.root)
            .map_err(probe_error)?
            .reply()
            .map_err(probe_error)?
            .output;

        let mut outputs = Vec::new();
        let mut raw_clones: Vec<Vec<u32>> = Vec::new();

        for &xid in &res.outputs {
            let info = self
                .conn
                .randr_get_output_info(xid, res.config_timestamp)
                .map_err(probe_error)?
                .reply()
                .map_err(probe_error)?;

            if info.connection != randr::Connection::CONNECTED {
                continue;
            }

            let output_modes: Vec<ModeId> = info
                .modes
                .iter()
                .filter_map(|m| modes.get(m).copied())
                .collect();
            let preferred_mode = if info.num_preferred > 0 {
                output_modes.first().copied()
            } else {
                None
            };
            let possible_crtcs: Vec<CrtcId> = info
                .crtcs
                .iter()
                .filter_map(|c| crtcs.get(c).copied())
                .collect();
            let crtc = crtcs
                .get(&info.crtc)
                .copied()
                .filter(|c| possible_crtcs.contains(c));

            let identity = self.read_edid(xid).unwrap_or_default();

            outputs.push(Output {
                id: OutputId::from(outputs.len()),
                winsys_id: xid as u64,
                name: String::from_utf8_lossy(&info.name).into_owned(),
                vendor: identity.vendor.unwrap_or_else(|| "unknown".to_string()),
                product: identity.product.unwrap_or_else(|| "unknown".to_string()),
                serial: identity.serial.unwrap_or_default(),
                width_mm: info.mm_width,
                height_mm: info.mm_height,
                subpixel_order: subpixel_order(info.subpixel_order),
                modes: output_modes,
                preferred_mode,
                possible_crtcs,
                possible_clones: Vec::new(),
                crtc,
                is_primary: xid == primary,
                is_presentation: self.presentation.get(&xid).copied().unwrap_or(false),
            });
            // Placeholders until every connected output has an index
            raw_clones.push(info.clones);
        }

        let by_xid: HashMap<u32, OutputId> = outputs
            .iter()
            .map(|o| (o.winsys_id as u32, o.id))
            .collect();
        for (output, clones) in outputs.iter_mut().zip(raw_clones) {
            output.possible_clones = clones
                .iter()
                .filter_map(|xid| by_xid.get(xid).copied())
                .collect();
        }

        Ok(outputs)
    }

    fn read_edid(&self, output: u32) -> Option<edid::EdidIdentity> {
        let reply = self
            .conn
            .randr_get_output_property(output, self.edid_atom, x11rb::NONE, 0, 128, false, false)
            .ok()?
            .reply()
            .ok()?;

        if reply.format != 8 {
            return None;
        }
        edid::parse(&reply.data)
    }

    fn read_power_save_mode(&self) -> PowerSaveMode {
        let capable = self
            .conn
            .dpms_capable()
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map_or(false, |reply| reply.capable);
        if !capable {
            return PowerSaveMode::Unsupported;
        }

        let Some(info) = self
            .conn
            .dpms_info()
            .ok()
            .and_then(|cookie| cookie.reply().ok())
        else {
            return PowerSaveMode::Unsupported;
        };

        match info.power_level {
            DPMSMode::ON => PowerSaveMode::On,
            DPMSMode::STANDBY => PowerSaveMode::Standby,
            DPMSMode::SUSPEND => PowerSaveMode::Suspend,
            DPMSMode::OFF => PowerSaveMode::Off,
            _ => PowerSaveMode::Unsupported,
        }
    }

    fn xid<T>(items: &[T], index: usize, what: &str, winsys_id: impl Fn(&T) -> u64) -> Result<u32> {
        items
            .get(index)
            .map(|item| winsys_id(item) as u32)
            .ok_or_else(|| BackendError::Write(format!("{} {} does not exist", what, index)))
    }
}

impl DisplayBackend for XrandrBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Xrandr
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn probe(&mut self) -> Result<Resources> {
        let res = self
            .conn
            .randr_get_screen_resources_current(self.root)
            .map_err(probe_error)?
            .reply()
            .map_err(probe_error)?;
        self.config_timestamp = res.config_timestamp;

        let (modes, mode_ids) = Self::read_modes(&res);
        let (crtcs, crtc_ids) = self.read_crtcs(&res, &mode_ids)?;
        let outputs = self.read_outputs(&res, &mode_ids, &crtc_ids)?;

        let range = self
            .conn
            .randr_get_screen_size_range(self.root)
            .map_err(probe_error)?
            .reply()
            .map_err(probe_error)?;

        let mut resources = Resources {
            modes,
            crtcs,
            outputs,
            screen_size: ScreenSize::default(),
            max_screen_size: ScreenSize::new(range.max_width as u32, range.max_height as u32),
            power_save_mode: self.read_power_save_mode(),
        };
        resources.screen_size = resources.crtc_extents();

        debug!(
            "XRandR probe: {} modes, {} CRTCs, {} connected outputs",
            resources.modes.len(),
            resources.crtcs.len(),
            resources.outputs.len()
        );
        Ok(resources)
    }

    fn set_screen_size(&mut self, _current: &Resources, size: ScreenSize) -> Result<()> {
        // X rejects a zero-sized screen; keep the old one when nothing is lit
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        let width = u16::try_from(size.width).map_err(write_error)?;
        let height = u16::try_from(size.height).map_err(write_error)?;
        let mm = |px: u32| ((px as f64) * 25.4 / SCREEN_DPI).round() as u32;

        self.conn
            .randr_set_screen_size(self.root, width, height, mm(size.width), mm(size.height))
            .map_err(write_error)?
            .check()
            .map_err(write_error)?;
        Ok(())
    }

    fn write_crtc(&mut self, current: &Resources, write: &CrtcWrite) -> Result<()> {
        let crtc = Self::xid(&current.crtcs, write.crtc.index(), "CRTC", |c: &Crtc| {
            c.winsys_id
        })?;

        let (x, y, mode, rotation, outputs) = match &write.config {
            None => (0i16, 0i16, 0u32, Rotation::ROTATE0, Vec::new()),
            Some(set) => {
                let mode = Self::xid(&current.modes, set.mode.index(), "mode", |m: &Mode| {
                    m.winsys_id
                })?;
                let outputs = set
                    .outputs
                    .iter()
                    .map(|o| {
                        Self::xid(&current.outputs, o.index(), "output", |o: &Output| {
                            o.winsys_id
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (
                    i16::try_from(set.x).map_err(write_error)?,
                    i16::try_from(set.y).map_err(write_error)?,
                    mode,
                    rotation_from_transform(set.transform),
                    outputs,
                )
            }
        };

        let reply = self
            .conn
            .randr_set_crtc_config(
                crtc,
                x11rb::CURRENT_TIME,
                self.config_timestamp,
                x,
                y,
                mode,
                rotation,
                &outputs,
            )
            .map_err(write_error)?
            .reply()
            .map_err(write_error)?;

        if reply.status != SetConfig::SUCCESS {
            return Err(BackendError::Write(format!(
                "{} refused with status {:?}",
                write.crtc, reply.status
            )));
        }
        Ok(())
    }

    fn write_output_flags(&mut self, current: &Resources, flags: &[OutputFlags]) -> Result<()> {
        let mut primary = x11rb::NONE;

        for flag in flags {
            let xid = Self::xid(&current.outputs, flag.output.index(), "output", |o: &Output| {
                o.winsys_id
            })?;
            if flag.is_primary && primary == x11rb::NONE {
                primary = xid;
            }
            self.presentation.insert(xid, flag.is_presentation);
        }

        self.conn
            .randr_set_output_primary(self.root, primary)
            .map_err(write_error)?
            .check()
            .map_err(write_error)?;
        Ok(())
    }

    fn set_power_save_mode(&mut self, mode: PowerSaveMode) -> Result<()> {
        let level = match mode {
            PowerSaveMode::On => DPMSMode::ON,
            PowerSaveMode::Standby => DPMSMode::STANDBY,
            PowerSaveMode::Suspend => DPMSMode::SUSPEND,
            PowerSaveMode::Off => DPMSMode::OFF,
            PowerSaveMode::Unsupported => {
                return Err(BackendError::Write("cannot request unsupported power state".into()))
            }
        };

        self.conn
            .dpms_force_level(level)
            .map_err(write_error)?
            .check()
            .map_err(write_error)?;
        Ok(())
    }

    fn watch_hotplug(&mut self, notify: HotplugCallback) -> Result<Option<JoinHandle<()>>> {
        // Separate connection so the watcher never steals replies from probes
        let (conn, screen_num) =
            RustConnection::connect(self.display.as_deref()).map_err(connection_error)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| BackendError::Connection(format!("no screen {}", screen_num)))?;

        conn.randr_select_input(
            root,
            NotifyMask::SCREEN_CHANGE | NotifyMask::OUTPUT_CHANGE | NotifyMask::CRTC_CHANGE,
        )
        .map_err(connection_error)?
        .check()
        .map_err(connection_error)?;

        let handle = std::thread::Builder::new()
            .name("xrandr-hotplug".to_string())
            .spawn(move || loop {
                match conn.wait_for_event() {
                    Ok(Event::RandrScreenChangeNotify(_)) | Ok(Event::RandrNotify(_)) => {
                        debug!("RandR change notification");
                        if !notify() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("RandR event connection lost: {}", e);
                        break;
                    }
                }
            })
            .map_err(connection_error)?;

        Ok(Some(handle))
    }
}

/// Refresh rate from a mode's dot clock and totals
fn refresh_rate(dot_clock: u32, htotal: u16, vtotal: u16) -> f32 {
    let total = htotal as f64 * vtotal as f64;
    if total == 0.0 {
        0.0
    } else {
        (dot_clock as f64 / total) as f32
    }
}

fn rotation_from_transform(transform: Transform) -> Rotation {
    let rotate = match transform {
        Transform::Normal | Transform::Flipped => Rotation::ROTATE0,
        Transform::Rotate90 | Transform::Flipped90 => Rotation::ROTATE90,
        Transform::Rotate180 | Transform::Flipped180 => Rotation::ROTATE180,
        Transform::Rotate270 | Transform::Flipped270 => Rotation::ROTATE270,
    };
    match transform {
        Transform::Flipped
        | Transform::Flipped90
        | Transform::Flipped180
        | Transform::Flipped270 => rotate | Rotation::REFLECT_X,
        _ => rotate,
    }
}

fn transform_from_rotation(rotation: Rotation) -> Option<Transform> {
    Transform::ALL
        .iter()
        .copied()
        .find(|&t| u16::from(rotation_from_transform(t)) == u16::from(rotation))
}

fn transforms_from_rotations(rotations: Rotation) -> TransformSet {
    let supported = u16::from(rotations);
    Transform::ALL
        .iter()
        .copied()
        .filter(|&t| {
            let needed = u16::from(rotation_from_transform(t));
            supported & needed == needed
        })
        .collect()
}

fn subpixel_order(order: SubPixel) -> SubpixelOrder {
    match order {
        SubPixel::HORIZONTAL_RGB => SubpixelOrder::HorizontalRgb,
        SubPixel::HORIZONTAL_BGR => SubpixelOrder::HorizontalBgr,
        SubPixel::VERTICAL_RGB => SubpixelOrder::VerticalRgb,
        SubPixel::VERTICAL_BGR => SubpixelOrder::VerticalBgr,
        SubPixel::NONE => SubpixelOrder::None,
        _ => SubpixelOrder::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_rate() {
        let rate = refresh_rate(148_500_000, 2200, 1125);
        assert!((rate - 60.0).abs() < 0.01);
        assert_eq!(refresh_rate(148_500_000, 0, 1125), 0.0);
    }

    #[test]
    fn test_rotation_round_trip() {
        for transform in Transform::ALL {
            let rotation = rotation_from_transform(transform);
            assert_eq!(transform_from_rotation(rotation), Some(transform));
        }
    }

    #[test]
    fn test_rotations_to_capability_set() {
        let set = transforms_from_rotations(Rotation::ROTATE0 | Rotation::ROTATE180);
        assert!(set.contains(Transform::Normal));
        assert!(set.contains(Transform::Rotate180));
        assert!(!set.contains(Transform::Rotate90));
        assert!(!set.contains(Transform::Flipped));

        let all = transforms_from_rotations(
            Rotation::ROTATE0
                | Rotation::ROTATE90
                | Rotation::ROTATE180
                | Rotation::ROTATE270
                | Rotation::REFLECT_X,
        );
        assert_eq!(all.len(), 8);
    }

    #[test]
    fn test_subpixel_mapping() {
        assert_eq!(subpixel_order(SubPixel::HORIZONTAL_RGB), SubpixelOrder::HorizontalRgb);
        assert_eq!(subpixel_order(SubPixel::UNKNOWN), SubpixelOrder::Unknown);
    }
}
