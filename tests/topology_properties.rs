//! Property tests for topology generations
//!
//! Random apply requests against the synthetic backend: accepted requests
//! must publish a consistent generation, rejected ones must publish nothing.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use lamco_display_manager::backend::SyntheticBackend;
use lamco_display_manager::config::SyntheticConfig;
use lamco_display_manager::configuration::ApplyRequest;
use lamco_display_manager::manager::DisplayManager;
use lamco_display_manager::topology::{
    build_logical_monitors, CrtcId, ModeId, OutputId, Rect, Topology,
};

#[derive(Debug, Clone)]
struct Assignment {
    mode: Option<u32>,
    x: i32,
    y: i32,
    outputs: Vec<u32>,
}

fn assignment() -> impl Strategy<Value = Assignment> {
    (
        prop::option::of(0u32..4),
        0i32..9000,
        0i32..9000,
        prop::collection::vec(0u32..3, 0..3),
    )
        .prop_map(|(mode, x, y, outputs)| Assignment { mode, x, y, outputs })
}

fn request_from(assignments: &[Option<Assignment>], primary: Option<u32>) -> ApplyRequest {
    let mut request = ApplyRequest::new();
    for (crtc, assignment) in assignments.iter().enumerate() {
        let Some(a) = assignment else { continue };
        let crtc = CrtcId(crtc as u32);
        request = match a.mode {
            Some(mode) => {
                let outputs: Vec<OutputId> = a.outputs.iter().copied().map(OutputId).collect();
                request.enable(crtc, ModeId(mode), a.x, a.y, &outputs)
            }
            None => request.disable(crtc),
        };
    }
    if let Some(output) = primary {
        request = request.primary(OutputId(output));
    }
    request
}

fn assert_consistent(topology: &Topology) -> Result<(), TestCaseError> {
    prop_assert!(topology.raw().check_invariants().is_ok());

    for crtc in topology.crtcs() {
        prop_assert_eq!(crtc.rect.is_empty(), crtc.current_mode.is_none());
    }
    for output in topology.outputs() {
        if let Some(crtc) = output.crtc {
            prop_assert!(output.possible_crtcs.contains(&crtc));
        }
    }

    let distinct: HashSet<Rect> = topology
        .crtcs()
        .iter()
        .filter(|c| c.current_mode.is_some())
        .map(|c| c.rect)
        .collect();
    prop_assert_eq!(topology.logical_monitors().len(), distinct.len());

    let primaries = topology
        .logical_monitors()
        .iter()
        .filter(|m| m.is_primary)
        .count();
    prop_assert!(primaries <= 1);
    Ok(())
}

proptest! {
    #[test]
    fn apply_publishes_consistent_generation_or_nothing(
        assignments in prop::collection::vec(prop::option::of(assignment()), 0..3),
        primary in prop::option::of(0u32..2),
    ) {
        let backend = SyntheticBackend::new(SyntheticConfig::default());
        let mut manager = DisplayManager::new(Box::new(backend), SyntheticConfig::default(), 4);
        let before = manager.current();

        let request = request_from(&assignments, primary);
        match manager.apply(before.serial(), &request) {
            Ok(outcome) => {
                prop_assert_eq!(outcome.serial, before.serial() + 1);
                prop_assert!(outcome.report.is_complete());
                assert_consistent(&manager.current())?;
            }
            Err(_) => {
                prop_assert!(Arc::ptr_eq(&before, &manager.current()));
            }
        }
    }

    #[test]
    fn logical_monitors_are_deterministic(
        assignments in prop::collection::vec(prop::option::of(assignment()), 0..3),
    ) {
        let backend = SyntheticBackend::new(SyntheticConfig::default());
        let mut manager = DisplayManager::new(Box::new(backend), SyntheticConfig::default(), 4);
        let _ = manager.apply(1, &request_from(&assignments, None));

        let topology = manager.current();
        let first = build_logical_monitors(topology.modes(), topology.crtcs(), topology.outputs());
        let second = build_logical_monitors(topology.modes(), topology.crtcs(), topology.outputs());
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.monitors.as_slice(), topology.logical_monitors());
    }

    #[test]
    fn serial_only_moves_forward(steps in prop::collection::vec(any::<bool>(), 1..8)) {
        let backend = SyntheticBackend::new(SyntheticConfig::default());
        let hardware = backend.handle();
        let mut manager = DisplayManager::new(Box::new(backend), SyntheticConfig::default(), 4);

        let mut last = manager.serial();
        for apply in steps {
            if apply {
                let request = ApplyRequest::new()
                    .enable(CrtcId(0), ModeId(2), 0, 0, &[OutputId(0)]);
                prop_assert!(manager.apply(last, &request).is_ok());
            } else {
                hardware.replace(hardware.resources());
                manager.handle_hardware_change();
            }
            prop_assert!(manager.serial() >= last);
            last = manager.serial();
        }
    }
}
