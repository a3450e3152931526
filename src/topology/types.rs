//! Topology Data Model
//!
//! Modes, CRTCs and outputs as read from a display backend. Ids are positions
//! in the arrays of one generation; `winsys_id` keeps the backend's own id
//! (an XID for XRandR, a synthetic counter otherwise).

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning generation's array
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " {}"), self.0)
            }
        }
    };
}

index_id!(
    /// Index of a [`Mode`] in the current generation
    ModeId,
    "mode"
);
index_id!(
    /// Index of a [`Crtc`] in the current generation
    CrtcId,
    "CRTC"
);
index_id!(
    /// Index of an [`Output`] in the current generation
    OutputId,
    "output"
);

/// Rectangle in screen coordinates
///
/// A rectangle with zero width or height is empty; unused CRTCs carry the
/// all-zero rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Create a rectangle
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Check whether a point falls inside the rectangle
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (x as i64) >= self.x as i64
            && (x as i64) < self.right()
            && (y as i64) >= self.y as i64
            && (y as i64) < self.bottom()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Output transform (rotation and reflection)
///
/// Bit values make the enum usable as a capability set; [`Transform::wire_id`]
/// gives the conventional 0-7 numbering (normal, 90, 180, 270, flipped,
/// flipped-90, flipped-180, flipped-270).
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    /// No transform
    Normal = 1 << 0,
    /// Rotated 90 degrees counter-clockwise
    Rotate90 = 1 << 1,
    /// Rotated 180 degrees
    Rotate180 = 1 << 2,
    /// Rotated 270 degrees counter-clockwise
    Rotate270 = 1 << 3,
    /// Mirrored around the vertical axis
    Flipped = 1 << 4,
    /// Mirrored, then rotated 90 degrees
    Flipped90 = 1 << 5,
    /// Mirrored, then rotated 180 degrees
    Flipped180 = 1 << 6,
    /// Mirrored, then rotated 270 degrees
    Flipped270 = 1 << 7,
}

/// Set of transforms a CRTC can scan out with
pub type TransformSet = BitFlags<Transform>;

impl Default for Transform {
    fn default() -> Self {
        Transform::Normal
    }
}

impl Transform {
    /// All eight transforms, in wire order
    pub const ALL: [Transform; 8] = [
        Transform::Normal,
        Transform::Rotate90,
        Transform::Rotate180,
        Transform::Rotate270,
        Transform::Flipped,
        Transform::Flipped90,
        Transform::Flipped180,
        Transform::Flipped270,
    ];

    /// Conventional transform number (0-7)
    pub fn wire_id(self) -> u32 {
        (self as u8).trailing_zeros()
    }

    /// Parse a conventional transform number
    pub fn from_wire_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// True for transforms that swap width and height
    pub fn is_rotated(self) -> bool {
        matches!(
            self,
            Transform::Rotate90 | Transform::Rotate270 | Transform::Flipped90 | Transform::Flipped270
        )
    }

    /// Size of a `width` x `height` mode once this transform is applied
    pub fn apply_to_size(self, width: u32, height: u32) -> (u32, u32) {
        if self.is_rotated() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// Subpixel layout of a panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubpixelOrder {
    /// Layout not reported
    #[default]
    Unknown,
    /// No subpixels (e.g. projector)
    None,
    /// Horizontal RGB stripes
    HorizontalRgb,
    /// Horizontal BGR stripes
    HorizontalBgr,
    /// Vertical RGB stripes
    VerticalRgb,
    /// Vertical BGR stripes
    VerticalBgr,
}

/// Overall display power state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerSaveMode {
    /// Backend cannot report or change power state
    #[default]
    Unsupported,
    /// Displays on
    On,
    /// Standby
    Standby,
    /// Suspend
    Suspend,
    /// Displays off
    Off,
}

impl std::str::FromStr for PowerSaveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(PowerSaveMode::On),
            "standby" => Ok(PowerSaveMode::Standby),
            "suspend" => Ok(PowerSaveMode::Suspend),
            "off" => Ok(PowerSaveMode::Off),
            other => Err(format!("unknown power save mode: {}", other)),
        }
    }
}

impl fmt::Display for PowerSaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerSaveMode::Unsupported => "unsupported",
            PowerSaveMode::On => "on",
            PowerSaveMode::Standby => "standby",
            PowerSaveMode::Suspend => "suspend",
            PowerSaveMode::Off => "off",
        };
        f.write_str(name)
    }
}

/// Screen dimensions in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ScreenSize {
    /// Create a screen size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A display timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    /// Index in this generation
    pub id: ModeId,
    /// Backend mode id
    pub winsys_id: u64,
    /// Backend mode name, empty when the backend has none
    pub name: String,
    /// Horizontal resolution
    pub width: u32,
    /// Vertical resolution
    pub height: u32,
    /// Refresh rate in Hz
    pub refresh_rate: f32,
}

/// A scan-out engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crtc {
    /// Index in this generation
    pub id: CrtcId,
    /// Backend CRTC id
    pub winsys_id: u64,
    /// Area of the screen scanned out; all zero when unused
    pub rect: Rect,
    /// Mode being driven, `None` when unused
    pub current_mode: Option<ModeId>,
    /// Active transform
    pub transform: Transform,
    /// Transforms this CRTC supports
    pub all_transforms: TransformSet,
}

impl Crtc {
    /// True when the CRTC drives a mode
    pub fn is_active(&self) -> bool {
        self.current_mode.is_some()
    }
}

/// A physical connector with something plugged in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Index in this generation
    pub id: OutputId,
    /// Backend output id
    pub winsys_id: u64,
    /// Connector name (e.g. "HDMI-1")
    pub name: String,
    /// Vendor code from EDID
    pub vendor: String,
    /// Product name from EDID
    pub product: String,
    /// Serial from EDID
    pub serial: String,
    /// Physical width in millimeters
    pub width_mm: u32,
    /// Physical height in millimeters
    pub height_mm: u32,
    /// Subpixel layout
    pub subpixel_order: SubpixelOrder,
    /// Supported modes, preferred first when known
    pub modes: Vec<ModeId>,
    /// Preferred mode
    pub preferred_mode: Option<ModeId>,
    /// CRTCs this output can be attached to
    pub possible_crtcs: Vec<CrtcId>,
    /// Outputs that can share a CRTC with this one
    pub possible_clones: Vec<OutputId>,
    /// CRTC currently driving this output
    pub crtc: Option<CrtcId>,
    /// Default-focus monitor flag
    pub is_primary: bool,
    /// Audience-facing monitor flag
    pub is_presentation: bool,
}

impl Output {
    /// Check whether this output supports a mode
    pub fn supports_mode(&self, mode: ModeId) -> bool {
        self.modes.contains(&mode)
    }

    /// Check whether this output can be driven by a CRTC
    pub fn can_use_crtc(&self, crtc: CrtcId) -> bool {
        self.possible_crtcs.contains(&crtc)
    }

    /// Check whether this output can share a CRTC with `other`
    pub fn can_clone(&self, other: OutputId) -> bool {
        self.possible_clones.contains(&other)
    }
}
