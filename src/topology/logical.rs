//! Logical Monitor Builder
//!
//! Derives the flat list of logical monitors from the CRTCs of one
//! generation. CRTCs scanning out the exact same rectangle collapse into one
//! logical monitor; output flags are folded upward afterwards.
//!
//! ```text
//!  CRTC 0 (0,0 1920x1080) ─┐
//!                          ├─> Logical monitor 0 (0,0 1920x1080)
//!  CRTC 2 (0,0 1920x1080) ─┘
//!  CRTC 1 (1920,0 1280x1024) ──> Logical monitor 1 (1920,0 1280x1024)
//!  CRTC 3 (unused)              (skipped)
//! ```

use serde::{Deserialize, Serialize};

use super::types::{Crtc, CrtcId, Mode, Output, Rect};

/// A rectangle of the overall display area as seen by window placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalMonitor {
    /// Position in the logical monitor list
    pub index: usize,
    /// Area covered
    pub rect: Rect,
    /// At least one contributing output is primary
    pub is_primary: bool,
    /// Every contributing output is a presentation output
    pub is_presentation: bool,
    /// Refresh rate of the first contributing CRTC's mode
    pub refresh_rate: f32,
    /// Backend id of the representative output (primary one if any)
    pub output_id: Option<u64>,
    /// CRTCs scanning out this rectangle
    pub crtcs: Vec<CrtcId>,
}

/// Result of one builder run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalLayout {
    /// Logical monitors in CRTC order
    pub monitors: Vec<LogicalMonitor>,
    /// Index of the primary logical monitor
    pub primary_index: Option<usize>,
    /// Logical monitor index for each CRTC, `None` for unused CRTCs
    pub crtc_monitor: Vec<Option<usize>>,
}

/// Build logical monitors from CRTC and output state
///
/// Pure and deterministic: the same inputs always give the same monitors in
/// the same order.
pub fn build_logical_monitors(modes: &[Mode], crtcs: &[Crtc], outputs: &[Output]) -> LogicalLayout {
    let mut monitors: Vec<LogicalMonitor> = Vec::with_capacity(crtcs.len());
    let mut crtc_monitor = vec![None; crtcs.len()];

    for (position, crtc) in crtcs.iter().enumerate() {
        let Some(mode) = crtc.current_mode else {
            continue;
        };

        if let Some(existing) = monitors.iter_mut().find(|m| m.rect == crtc.rect) {
            existing.crtcs.push(crtc.id);
            crtc_monitor[position] = Some(existing.index);
            continue;
        }

        let index = monitors.len();
        monitors.push(LogicalMonitor {
            index,
            rect: crtc.rect,
            is_primary: false,
            // Narrowed by every output below, never widened
            is_presentation: true,
            refresh_rate: modes.get(mode.index()).map_or(0.0, |m| m.refresh_rate),
            output_id: None,
            crtcs: vec![crtc.id],
        });
        crtc_monitor[position] = Some(index);
    }

    let mut primary_index = None;

    for output in outputs {
        let Some(crtc) = output.crtc else {
            continue;
        };
        let Some(index) = crtc_monitor.get(crtc.index()).copied().flatten() else {
            // Output claims a CRTC that drives nothing
            continue;
        };

        let monitor = &mut monitors[index];
        monitor.is_primary |= output.is_primary;
        monitor.is_presentation &= output.is_presentation;

        if output.is_primary || monitor.output_id.is_none() {
            monitor.output_id = Some(output.winsys_id);
        }

        if monitor.is_primary {
            primary_index = Some(index);
        }
    }

    LogicalLayout {
        monitors,
        primary_index,
        crtc_monitor,
    }
}
