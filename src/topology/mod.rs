//! Display Topology Model
//!
//! The data model shared by every part of the manager.
//!
//! # Overview
//!
//! ```text
//!   Backend probe ──> Resources ──> Topology (generation N)
//!                                     ├─ modes / CRTCs / outputs
//!                                     ├─ logical monitors (derived)
//!                                     └─ serial
//! ```
//!
//! - **Mode**: width/height/refresh timing
//! - **CRTC**: scan-out engine; drives one rectangle of the screen
//! - **Output**: connector with its own mode list, possible CRTCs and clones
//! - **Logical monitor**: deduplicated rectangle seen by window placement
//!
//! A [`Topology`] is immutable. Readers hold an `Arc<Topology>` and never keep
//! ids across generations: after a "topology changed" notification they
//! re-query.

mod logical;
mod resources;
mod store;
mod types;

pub use logical::{build_logical_monitors, LogicalLayout, LogicalMonitor};
pub use resources::{Resources, ResourcesBuilder};
pub use store::{
    CrtcView, ModeView, OutputProperties, OutputView, ResourcesView, Topology, TopologyOrigin,
};
pub use types::{
    Crtc, CrtcId, Mode, ModeId, Output, OutputId, PowerSaveMode, Rect, ScreenSize,
    SubpixelOrder, Transform, TransformSet,
};
