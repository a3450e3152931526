//! Configuration Commit
//!
//! Turns a validated request into backend writes. The request replaces the
//! whole configuration: CRTCs it does not name are disabled, outputs it does
//! not attach lose their CRTC and their primary flag.
//!
//! Write order:
//!
//! 1. disables (requested, untouched active CRTCs, and CRTCs that would not
//!    fit the new screen while being moved)
//! 2. screen resize
//! 3. enables
//! 4. restores of moved CRTCs whose enable failed, growing the screen again
//!    when their old position needs it
//! 5. output flags

use tracing::{debug, info, warn};

use super::request::ApplyRequest;
use crate::backend::{BackendError, CrtcModeSet, CrtcWrite, DisplayBackend, OutputFlags};
use crate::topology::{CrtcId, Resources, ScreenSize, Topology};

/// Backend writes for one apply pass
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyPlan {
    /// CRTCs to turn off before resizing
    pub disables: Vec<CrtcWrite>,
    /// Screen size covering every enabled CRTC
    pub screen_size: ScreenSize,
    /// CRTCs to program after resizing
    pub enables: Vec<CrtcWrite>,
    /// Prior configuration of CRTCs disabled only to make room for their move
    pub restores: Vec<CrtcWrite>,
    /// Final flags for every output
    pub output_flags: Vec<OutputFlags>,
}

/// What happened during [`commit`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// CRTCs the backend refused, each left in its prior state
    pub failed_crtcs: Vec<(CrtcId, BackendError)>,
    /// Screen resize failure
    pub screen_size_error: Option<BackendError>,
    /// Output flag failure
    pub output_flags_error: Option<BackendError>,
    /// Failed CRTCs that were put back where they were before the apply
    pub restored_crtcs: Vec<CrtcId>,
}

impl ApplyReport {
    /// True when every write went through
    pub fn is_complete(&self) -> bool {
        self.failed_crtcs.is_empty()
            && self.screen_size_error.is_none()
            && self.output_flags_error.is_none()
    }
}

/// Compute the writes for a validated request
pub fn plan(current: &Topology, request: &ApplyRequest) -> ApplyPlan {
    let mut touched_crtcs = vec![false; current.crtcs().len()];
    let mut touched_outputs = vec![false; current.outputs().len()];
    let mut disables = Vec::new();
    let mut enables = Vec::new();
    let mut right = 0i64;
    let mut bottom = 0i64;

    for assignment in &request.crtcs {
        let Some(crtc) = current.crtc(assignment.crtc) else {
            continue;
        };
        touched_crtcs[crtc.id.index()] = true;

        let Some(mode) = assignment.mode.and_then(|id| current.mode(id)) else {
            disables.push(CrtcWrite::disable(crtc.id));
            continue;
        };

        for output in &assignment.outputs {
            if let Some(touched) = touched_outputs.get_mut(output.index()) {
                *touched = true;
            }
        }

        let (width, height) = assignment.transform.apply_to_size(mode.width, mode.height);
        right = right.max(assignment.x as i64 + width as i64);
        bottom = bottom.max(assignment.y as i64 + height as i64);

        enables.push(CrtcWrite {
            crtc: crtc.id,
            config: Some(CrtcModeSet {
                mode: mode.id,
                x: assignment.x,
                y: assignment.y,
                transform: assignment.transform,
                outputs: assignment.outputs.clone(),
            }),
        });
    }

    for crtc in current.crtcs() {
        if crtc.is_active() && !touched_crtcs[crtc.id.index()] {
            disables.push(CrtcWrite::disable(crtc.id));
        }
    }

    let screen_size = ScreenSize::new(
        right.clamp(0, u32::MAX as i64) as u32,
        bottom.clamp(0, u32::MAX as i64) as u32,
    );

    // A CRTC being moved must not hang over the edge of the resized screen
    let mut restores = Vec::new();
    for write in &enables {
        let Some(crtc) = current.crtc(write.crtc) else {
            continue;
        };
        let Some(mode) = crtc.current_mode else {
            continue;
        };
        if crtc.rect.right() > screen_size.width as i64
            || crtc.rect.bottom() > screen_size.height as i64
        {
            disables.push(CrtcWrite::disable(crtc.id));
            restores.push(CrtcWrite {
                crtc: crtc.id,
                config: Some(CrtcModeSet {
                    mode,
                    x: crtc.rect.x,
                    y: crtc.rect.y,
                    transform: crtc.transform,
                    outputs: current
                        .outputs()
                        .iter()
                        .filter(|o| o.crtc == Some(crtc.id))
                        .map(|o| o.id)
                        .collect(),
                }),
            });
        }
    }

    // Only one output can be primary; naming a new one clears the others
    let primary_named = request.outputs.iter().any(|c| c.primary == Some(true));

    let output_flags = current
        .outputs()
        .iter()
        .map(|output| {
            let change = request.outputs.iter().find(|c| c.output == output.id);
            let kept_primary = output.is_primary && !primary_named;
            let is_primary = change.and_then(|c| c.primary).unwrap_or(kept_primary);
            let is_presentation = change
                .and_then(|c| c.presentation)
                .unwrap_or(output.is_presentation);

            OutputFlags {
                output: output.id,
                // Outputs left without a CRTC cannot stay primary
                is_primary: is_primary && touched_outputs[output.id.index()],
                is_presentation,
            }
        })
        .collect();

    ApplyPlan {
        disables,
        screen_size,
        enables,
        restores,
        output_flags,
    }
}

/// Write a plan to the backend
///
/// A refused CRTC write is logged and recorded in the report; the remaining
/// writes still go ahead. A moved CRTC whose enable is refused gets its old
/// configuration back.
pub fn commit(
    backend: &mut dyn DisplayBackend,
    current: &Topology,
    plan: &ApplyPlan,
) -> ApplyReport {
    let resources = current.raw();
    let mut report = ApplyReport::default();

    for write in plan.disables.iter() {
        write_crtc(backend, resources, write, &mut report);
    }

    let mut screen = resources.screen_size;
    match backend.set_screen_size(resources, plan.screen_size) {
        Ok(()) => screen = plan.screen_size,
        Err(e) => {
            warn!(
                "Screen resize to {}x{} failed: {}",
                plan.screen_size.width, plan.screen_size.height, e
            );
            report.screen_size_error = Some(e);
        }
    }

    let failed_before_enables = report.failed_crtcs.len();
    for write in plan.enables.iter() {
        write_crtc(backend, resources, write, &mut report);
    }

    for restore in plan.restores.iter() {
        // Disables that failed left the CRTC where it was
        let enable_failed = report.failed_crtcs[failed_before_enables..]
            .iter()
            .any(|(id, _)| *id == restore.crtc);
        if enable_failed {
            restore_crtc(backend, current, restore, &mut screen, &mut report);
        }
    }

    if let Err(e) = backend.write_output_flags(resources, &plan.output_flags) {
        warn!("Writing output flags failed: {}", e);
        report.output_flags_error = Some(e);
    }

    report
}

fn restore_crtc(
    backend: &mut dyn DisplayBackend,
    current: &Topology,
    restore: &CrtcWrite,
    screen: &mut ScreenSize,
    report: &mut ApplyReport,
) {
    let Some(rect) = current.crtc(restore.crtc).map(|c| c.rect) else {
        return;
    };

    let needed = ScreenSize::new(
        screen.width.max(rect.right().clamp(0, u32::MAX as i64) as u32),
        screen.height.max(rect.bottom().clamp(0, u32::MAX as i64) as u32),
    );
    if needed != *screen {
        if let Err(e) = backend.set_screen_size(current.raw(), needed) {
            warn!(
                "Cannot grow screen to {}x{} to restore {}: {}",
                needed.width, needed.height, restore.crtc, e
            );
            return;
        }
        *screen = needed;
    }

    match backend.write_crtc(current.raw(), restore) {
        Ok(()) => {
            info!("{} restored at {}", restore.crtc, rect);
            report.restored_crtcs.push(restore.crtc);
        }
        Err(e) => warn!("{} left disabled, restore failed: {}", restore.crtc, e),
    }
}

fn write_crtc(
    backend: &mut dyn DisplayBackend,
    resources: &Resources,
    write: &CrtcWrite,
    report: &mut ApplyReport,
) {
    // A CRTC that already failed this pass keeps its prior state
    if report.failed_crtcs.iter().any(|(id, _)| *id == write.crtc) {
        return;
    }

    match backend.write_crtc(resources, write) {
        Ok(()) => debug!(
            "{} {}",
            write.crtc,
            if write.is_disable() { "disabled" } else { "configured" }
        ),
        Err(e) => {
            warn!("{} write failed, keeping previous state: {}", write.crtc, e);
            report.failed_crtcs.push((write.crtc, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockDisplayBackend;
    use crate::topology::{ModeId, OutputId, ResourcesBuilder, TopologyOrigin, Transform};

    /// CRTC 0 at 0,0 1920x1080 driving A (primary); CRTC 1 at 1920,0
    /// 1280x1024 driving B; CRTC 2 unused.
    fn topology() -> Topology {
        let mut b = ResourcesBuilder::new(ScreenSize::new(8192, 8192));
        let hd = b.mode(1920, 1080, 60.0);
        let sxga = b.mode(1280, 1024, 60.0);
        let c0 = b.crtc_with_transforms(Transform::Normal | Transform::Rotate90);
        let c1 = b.crtc();
        let c2 = b.crtc();
        let a = b.output("A", &[hd, sxga], &[c0, c1, c2]);
        let o = b.output("B", &[hd, sxga], &[c0, c1, c2]);
        b.clones(a, o);
        b.enable(c0, hd, 0, 0, &[a]).primary(a);
        b.enable(c1, sxga, 1920, 0, &[o]).presentation(o);
        Topology::build(3, TopologyOrigin::Backend, b.build())
    }

    #[test]
    fn test_untouched_active_crtc_is_disabled() {
        let t = topology();
        let request = ApplyRequest::new().enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)]);
        let plan = plan(&t, &request);

        assert_eq!(plan.disables, vec![CrtcWrite::disable(CrtcId(1))]);
        assert_eq!(plan.enables.len(), 1);
        assert_eq!(plan.screen_size, ScreenSize::new(1920, 1080));
        // Unused CRTC 2 needs no write
        assert!(plan.disables.iter().all(|w| w.crtc != CrtcId(2)));
    }

    #[test]
    fn test_detached_output_loses_primary() {
        let t = topology();
        let request = ApplyRequest::new()
            .enable(CrtcId(1), ModeId(1), 0, 0, &[OutputId(1)])
            .primary(OutputId(0));
        let plan = plan(&t, &request);

        let a = plan.output_flags[0];
        let b = plan.output_flags[1];
        assert!(!a.is_primary);
        assert!(!b.is_primary);
        // Presentation survives untouched
        assert!(b.is_presentation);
    }

    #[test]
    fn test_property_changes_apply_to_attached_outputs() {
        let t = topology();
        let request = ApplyRequest::new()
            .enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)])
            .enable(CrtcId(1), ModeId(1), 1920, 0, &[OutputId(1)])
            .output_properties(OutputId(0), Some(false), Some(true))
            .primary(OutputId(1));
        let plan = plan(&t, &request);

        assert_eq!(
            plan.output_flags,
            vec![
                OutputFlags {
                    output: OutputId(0),
                    is_primary: false,
                    is_presentation: true
                },
                OutputFlags {
                    output: OutputId(1),
                    is_primary: true,
                    is_presentation: true
                },
            ]
        );
    }

    #[test]
    fn test_new_primary_replaces_old() {
        let t = topology();
        let both = ApplyRequest::new()
            .enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)])
            .enable(CrtcId(1), ModeId(1), 1920, 0, &[OutputId(1)]);

        let kept = plan(&t, &both);
        assert!(kept.output_flags[0].is_primary);

        let moved = plan(&t, &both.primary(OutputId(1)));
        assert!(!moved.output_flags[0].is_primary);
        assert!(moved.output_flags[1].is_primary);
    }

    #[test]
    fn test_moved_crtc_outside_new_screen_is_disabled_first() {
        let t = topology();
        // CRTC 1 moves from 1920,0 to 0,0; the screen shrinks to 1280x1024
        let request = ApplyRequest::new().enable(CrtcId(1), ModeId(1), 0, 0, &[OutputId(1)]);
        let plan = plan(&t, &request);

        assert_eq!(plan.screen_size, ScreenSize::new(1280, 1024));
        assert!(plan.disables.contains(&CrtcWrite::disable(CrtcId(0))));
        assert!(plan.disables.contains(&CrtcWrite::disable(CrtcId(1))));
        assert_eq!(plan.enables[0].crtc, CrtcId(1));
    }

    #[test]
    fn test_rotated_extents() {
        let t = topology();
        let request = ApplyRequest::new().enable_transformed(
            CrtcId(0),
            ModeId(0),
            0,
            0,
            Transform::Rotate90,
            &[OutputId(0)],
        );
        assert_eq!(plan(&t, &request).screen_size, ScreenSize::new(1080, 1920));
    }

    #[test]
    fn test_commit_order() {
        let t = topology();
        let request = ApplyRequest::new().enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)]);
        let plan = plan(&t, &request);

        let mut seq = mockall::Sequence::new();
        let mut backend = MockDisplayBackend::new();
        backend
            .expect_write_crtc()
            .withf(|_, w| w.crtc == CrtcId(1) && w.is_disable())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_set_screen_size()
            .withf(|_, size| *size == ScreenSize::new(1920, 1080))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_write_crtc()
            .withf(|_, w| w.crtc == CrtcId(0) && !w.is_disable())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_write_output_flags()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let report = commit(&mut backend, &t, &plan);
        assert!(report.is_complete());
    }

    #[test]
    fn test_commit_continues_after_write_failure() {
        let t = topology();
        let request = ApplyRequest::new()
            .enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)])
            .enable(CrtcId(1), ModeId(1), 1920, 0, &[OutputId(1)]);
        let plan = plan(&t, &request);

        let mut backend = MockDisplayBackend::new();
        backend.expect_set_screen_size().returning(|_, _| Ok(()));
        backend.expect_write_crtc().times(2).returning(|_, w| {
            if w.crtc == CrtcId(0) {
                Err(BackendError::Write("busy".to_string()))
            } else {
                Ok(())
            }
        });
        backend.expect_write_output_flags().returning(|_, _| Ok(()));

        let report = commit(&mut backend, &t, &plan);
        assert!(!report.is_complete());
        assert_eq!(report.failed_crtcs.len(), 1);
        assert_eq!(report.failed_crtcs[0].0, CrtcId(0));
    }

    #[test]
    fn test_failed_disable_skips_enable() {
        let t = topology();
        let request = ApplyRequest::new().enable(CrtcId(1), ModeId(1), 0, 0, &[OutputId(1)]);
        let plan = plan(&t, &request);

        let mut backend = MockDisplayBackend::new();
        backend.expect_set_screen_size().returning(|_, _| Ok(()));
        backend.expect_write_output_flags().returning(|_, _| Ok(()));
        backend
            .expect_write_crtc()
            .withf(|_, w| w.crtc == CrtcId(0))
            .returning(|_, _| Ok(()));
        // Only the disable reaches the backend; the enable is skipped
        backend
            .expect_write_crtc()
            .withf(|_, w| w.crtc == CrtcId(1))
            .times(1)
            .returning(|_, _| Err(BackendError::Write("busy".to_string())));

        let report = commit(&mut backend, &t, &plan);
        assert_eq!(report.failed_crtcs.len(), 1);
        assert!(report.restored_crtcs.is_empty());
    }

    #[test]
    fn test_moved_crtc_restored_when_enable_fails() {
        let t = topology();
        // CRTC 1 moves from 1920,0 to 0,0 and the backend refuses the move
        let request = ApplyRequest::new().enable(CrtcId(1), ModeId(1), 0, 0, &[OutputId(1)]);
        let plan = plan(&t, &request);
        assert_eq!(
            plan.restores,
            vec![CrtcWrite {
                crtc: CrtcId(1),
                config: Some(CrtcModeSet {
                    mode: ModeId(1),
                    x: 1920,
                    y: 0,
                    transform: Transform::Normal,
                    outputs: vec![OutputId(1)],
                }),
            }]
        );

        let mut seq = mockall::Sequence::new();
        let mut backend = MockDisplayBackend::new();
        backend
            .expect_write_crtc()
            .withf(|_, w| w.crtc == CrtcId(0) && w.is_disable())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_write_crtc()
            .withf(|_, w| w.crtc == CrtcId(1) && w.is_disable())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_set_screen_size()
            .withf(|_, size| *size == ScreenSize::new(1280, 1024))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_write_crtc()
            .withf(|_, w| {
                w.crtc == CrtcId(1) && w.config.as_ref().is_some_and(|c| c.x == 0)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(BackendError::Write("no bandwidth".to_string())));
        backend
            .expect_set_screen_size()
            .withf(|_, size| *size == ScreenSize::new(3200, 1024))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_write_crtc()
            .withf(|_, w| {
                w.crtc == CrtcId(1) && w.config.as_ref().is_some_and(|c| c.x == 1920)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        backend
            .expect_write_output_flags()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let report = commit(&mut backend, &t, &plan);
        assert_eq!(report.failed_crtcs.len(), 1);
        assert_eq!(report.failed_crtcs[0].0, CrtcId(1));
        assert_eq!(report.restored_crtcs, vec![CrtcId(1)]);
    }

    #[test]
    fn test_restore_not_needed_when_move_succeeds() {
        let t = topology();
        let request = ApplyRequest::new().enable(CrtcId(1), ModeId(1), 0, 0, &[OutputId(1)]);
        let plan = plan(&t, &request);

        let mut backend = MockDisplayBackend::new();
        backend
            .expect_set_screen_size()
            .times(1)
            .returning(|_, _| Ok(()));
        backend.expect_write_crtc().times(3).returning(|_, _| Ok(()));
        backend.expect_write_output_flags().returning(|_, _| Ok(()));

        let report = commit(&mut backend, &t, &plan);
        assert!(report.is_complete());
        assert!(report.restored_crtcs.is_empty());
    }
}
