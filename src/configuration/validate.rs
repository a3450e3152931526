//! Configuration Validation
//!
//! Checks a request against the capability graph and screen limits of the
//! generation it was built for. Nothing is written; the first failing rule
//! rejects the whole request.

use thiserror::Error;

use super::request::ApplyRequest;
use crate::topology::{CrtcId, ModeId, OutputId, ScreenSize, Topology, Transform};

/// Why a request was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// CRTC id out of range
    #[error("Invalid CRTC: {0}")]
    InvalidCrtc(CrtcId),

    /// Mode id out of range
    #[error("Invalid mode: {0}")]
    InvalidMode(ModeId),

    /// Output id out of range
    #[error("Invalid output: {0}")]
    InvalidOutput(OutputId),

    /// Same CRTC assigned twice
    #[error("{0} assigned more than once")]
    DuplicateCrtc(CrtcId),

    /// Same output driven by two CRTCs
    #[error("{0} assigned to more than one CRTC")]
    OutputAssignedTwice(OutputId),

    /// Same output given two property entries
    #[error("{0} has more than one property entry")]
    DuplicateOutputProperties(OutputId),

    /// Rectangle leaves the maximum screen area
    #[error("{crtc} at {x},{y} size {width}x{height} exceeds screen limit {}x{}", .max.width, .max.height)]
    OutOfBounds {
        /// Offending CRTC
        crtc: CrtcId,
        /// Requested left edge
        x: i32,
        /// Requested top edge
        y: i32,
        /// Width after transform
        width: u32,
        /// Height after transform
        height: u32,
        /// Maximum screen size
        max: ScreenSize,
    },

    /// Transform outside the CRTC's capability set
    #[error("{crtc} does not support transform {transform:?}")]
    UnsupportedTransform {
        /// Offending CRTC
        crtc: CrtcId,
        /// Requested transform
        transform: Transform,
    },

    /// Output cannot attach to the CRTC
    #[error("{output} cannot be driven by {crtc}")]
    CrtcNotPossible {
        /// Offending output
        output: OutputId,
        /// Requested CRTC
        crtc: CrtcId,
    },

    /// Output does not list the mode
    #[error("{output} does not support {mode}")]
    ModeNotSupported {
        /// Offending output
        output: OutputId,
        /// Requested mode
        mode: ModeId,
    },

    /// Output cannot share a CRTC with the group leader
    #[error("{output} cannot be cloned with {leader}")]
    InvalidClone {
        /// Offending output
        output: OutputId,
        /// First output listed for the CRTC
        leader: OutputId,
    },

    /// Mode given with nothing to show it on
    #[error("{0} has a mode but no outputs")]
    NoOutputs(CrtcId),
}

/// Validate `request` against `topology`
///
/// # Errors
///
/// Returns the first rule the request breaks.
pub fn validate(topology: &Topology, request: &ApplyRequest) -> Result<(), ValidationError> {
    let max = topology.max_screen_size();
    let mut seen_crtcs = vec![false; topology.crtcs().len()];
    let mut assigned_outputs = vec![false; topology.outputs().len()];

    for assignment in &request.crtcs {
        let crtc = topology
            .crtc(assignment.crtc)
            .ok_or(ValidationError::InvalidCrtc(assignment.crtc))?;

        if std::mem::replace(&mut seen_crtcs[crtc.id.index()], true) {
            return Err(ValidationError::DuplicateCrtc(crtc.id));
        }

        let mode = match assignment.mode {
            Some(id) => Some(topology.mode(id).ok_or(ValidationError::InvalidMode(id))?),
            None => None,
        };

        if let Some(mode) = mode {
            let (width, height) = assignment.transform.apply_to_size(mode.width, mode.height);
            let x = assignment.x as i64;
            let y = assignment.y as i64;

            if x < 0
                || y < 0
                || x + width as i64 > max.width as i64
                || y + height as i64 > max.height as i64
            {
                return Err(ValidationError::OutOfBounds {
                    crtc: crtc.id,
                    x: assignment.x,
                    y: assignment.y,
                    width,
                    height,
                    max,
                });
            }

            if !crtc.all_transforms.contains(assignment.transform) {
                return Err(ValidationError::UnsupportedTransform {
                    crtc: crtc.id,
                    transform: assignment.transform,
                });
            }

            if assignment.outputs.is_empty() {
                return Err(ValidationError::NoOutputs(crtc.id));
            }
        }

        let mut leader = None;
        for &output_id in &assignment.outputs {
            let output = topology
                .output(output_id)
                .ok_or(ValidationError::InvalidOutput(output_id))?;

            if !output.can_use_crtc(crtc.id) {
                return Err(ValidationError::CrtcNotPossible {
                    output: output.id,
                    crtc: crtc.id,
                });
            }

            if let Some(mode) = mode {
                if !output.supports_mode(mode.id) {
                    return Err(ValidationError::ModeNotSupported {
                        output: output.id,
                        mode: mode.id,
                    });
                }
            }

            // Each member is checked against the first output only
            match leader {
                None => leader = Some(output.id),
                Some(first) => {
                    if !output.can_clone(first) {
                        return Err(ValidationError::InvalidClone {
                            output: output.id,
                            leader: first,
                        });
                    }
                }
            }

            if std::mem::replace(&mut assigned_outputs[output.id.index()], true) {
                return Err(ValidationError::OutputAssignedTwice(output.id));
            }
        }
    }

    let mut seen_properties = vec![false; topology.outputs().len()];
    for change in &request.outputs {
        let index = change.output.index();
        if index >= seen_properties.len() {
            return Err(ValidationError::InvalidOutput(change.output));
        }
        if std::mem::replace(&mut seen_properties[index], true) {
            return Err(ValidationError::DuplicateOutputProperties(change.output));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ResourcesBuilder, TopologyOrigin};

    /// Modes: 0 = 1920x1080, 1 = 1280x1024, 2 = 800x600
    /// CRTCs: 0 (normal + rotate90), 1, 2
    /// Outputs: 0 "A" (modes 0,1; CRTCs 0,1), 1 "B" (modes 0,1,2; CRTCs 0,1,2),
    ///          2 "C" (mode 2; CRTC 2)
    /// A and B clone each other; C clones A one way.
    fn topology(max: ScreenSize) -> Topology {
        let mut b = ResourcesBuilder::new(max);
        let hd = b.mode(1920, 1080, 60.0);
        let sxga = b.mode(1280, 1024, 60.0);
        let svga = b.mode(800, 600, 60.0);
        let c0 = b.crtc_with_transforms(Transform::Normal | Transform::Rotate90);
        let c1 = b.crtc();
        let c2 = b.crtc();
        let a = b.output("A", &[hd, sxga], &[c0, c1]);
        let o = b.output("B", &[hd, sxga, svga], &[c0, c1, c2]);
        let c = b.output("C", &[svga], &[c2]);
        b.clones(a, o).one_way_clone(c, a);
        b.enable(c0, hd, 0, 0, &[a]);
        Topology::build(1, TopologyOrigin::Backend, b.build())
    }

    fn default_topology() -> Topology {
        topology(ScreenSize::new(4096, 4096))
    }

    #[test]
    fn test_valid_two_heads() {
        let request = ApplyRequest::new()
            .enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)])
            .enable(CrtcId(1), ModeId(1), 1920, 0, &[OutputId(1)])
            .primary(OutputId(1));
        assert_eq!(validate(&default_topology(), &request), Ok(()));
    }

    #[test]
    fn test_empty_request_is_valid() {
        assert_eq!(validate(&default_topology(), &ApplyRequest::new()), Ok(()));
    }

    #[test]
    fn test_invalid_ids() {
        let t = default_topology();
        let request = ApplyRequest::new().disable(CrtcId(3));
        assert_eq!(validate(&t, &request), Err(ValidationError::InvalidCrtc(CrtcId(3))));

        let request = ApplyRequest::new().enable(CrtcId(0), ModeId(9), 0, 0, &[OutputId(0)]);
        assert_eq!(validate(&t, &request), Err(ValidationError::InvalidMode(ModeId(9))));

        let request = ApplyRequest::new().enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(7)]);
        assert_eq!(validate(&t, &request), Err(ValidationError::InvalidOutput(OutputId(7))));

        let request = ApplyRequest::new().primary(OutputId(3));
        assert_eq!(validate(&t, &request), Err(ValidationError::InvalidOutput(OutputId(3))));
    }

    #[test]
    fn test_out_of_bounds_right_edge() {
        let t = topology(ScreenSize::new(1920, 1080));
        let request = ApplyRequest::new().enable(CrtcId(0), ModeId(0), 100, 0, &[OutputId(0)]);
        assert!(matches!(
            validate(&t, &request),
            Err(ValidationError::OutOfBounds { x: 100, width: 1920, .. })
        ));

        let request = ApplyRequest::new().enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)]);
        assert_eq!(validate(&t, &request), Ok(()));
    }

    #[test]
    fn test_negative_position() {
        let request = ApplyRequest::new().enable(CrtcId(0), ModeId(0), -1, 0, &[OutputId(0)]);
        assert!(matches!(
            validate(&default_topology(), &request),
            Err(ValidationError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_rotation_uses_transformed_size() {
        let t = topology(ScreenSize::new(1920, 1920));
        let request = ApplyRequest::new().enable_transformed(
            CrtcId(0),
            ModeId(0),
            900,
            0,
            Transform::Rotate90,
            &[OutputId(0)],
        );
        // 900 + 1080 > 1920
        assert!(matches!(
            validate(&t, &request),
            Err(ValidationError::OutOfBounds { width: 1080, height: 1920, .. })
        ));

        let request = ApplyRequest::new().enable_transformed(
            CrtcId(0),
            ModeId(0),
            840,
            0,
            Transform::Rotate90,
            &[OutputId(0)],
        );
        assert_eq!(validate(&t, &request), Ok(()));
    }

    #[test]
    fn test_unsupported_transform() {
        let request = ApplyRequest::new().enable_transformed(
            CrtcId(1),
            ModeId(0),
            0,
            0,
            Transform::Rotate90,
            &[OutputId(0)],
        );
        assert_eq!(
            validate(&default_topology(), &request),
            Err(ValidationError::UnsupportedTransform {
                crtc: CrtcId(1),
                transform: Transform::Rotate90
            })
        );
    }

    #[test]
    fn test_crtc_not_possible() {
        let request = ApplyRequest::new().enable(CrtcId(2), ModeId(0), 0, 0, &[OutputId(0)]);
        assert_eq!(
            validate(&default_topology(), &request),
            Err(ValidationError::CrtcNotPossible {
                output: OutputId(0),
                crtc: CrtcId(2)
            })
        );
    }

    #[test]
    fn test_mode_not_supported() {
        let request = ApplyRequest::new().enable(CrtcId(2), ModeId(0), 0, 0, &[OutputId(2)]);
        assert_eq!(
            validate(&default_topology(), &request),
            Err(ValidationError::ModeNotSupported {
                output: OutputId(2),
                mode: ModeId(0)
            })
        );
    }

    #[test]
    fn test_clone_checked_against_leader() {
        let t = default_topology();
        let request =
            ApplyRequest::new().enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0), OutputId(1)]);
        assert_eq!(validate(&t, &request), Ok(()));

        // B does not list C as a clone
        let request =
            ApplyRequest::new().enable(CrtcId(2), ModeId(2), 0, 0, &[OutputId(1), OutputId(2)]);
        assert_eq!(
            validate(&t, &request),
            Err(ValidationError::InvalidClone {
                output: OutputId(2),
                leader: OutputId(1)
            })
        );
    }

    #[test]
    fn test_clone_group_of_three_only_checks_leader() {
        // C clones A and B clones A, but B and C are not mutually clonable
        let mut b = ResourcesBuilder::new(ScreenSize::new(4096, 4096));
        let m = b.mode(800, 600, 60.0);
        let c0 = b.crtc();
        let a = b.output("A", &[m], &[c0]);
        let o = b.output("B", &[m], &[c0]);
        let c = b.output("C", &[m], &[c0]);
        b.one_way_clone(o, a).one_way_clone(c, a);
        let t = Topology::build(1, TopologyOrigin::Backend, b.build());

        let request = ApplyRequest::new().enable(c0, m, 0, 0, &[a, o, c]);
        assert_eq!(validate(&t, &request), Ok(()));
    }

    #[test]
    fn test_mode_without_outputs() {
        let request = ApplyRequest::new().enable(CrtcId(1), ModeId(0), 0, 0, &[]);
        assert_eq!(
            validate(&default_topology(), &request),
            Err(ValidationError::NoOutputs(CrtcId(1)))
        );
    }

    #[test]
    fn test_duplicates_rejected() {
        let t = default_topology();
        let request = ApplyRequest::new().disable(CrtcId(1)).disable(CrtcId(1));
        assert_eq!(validate(&t, &request), Err(ValidationError::DuplicateCrtc(CrtcId(1))));

        let request = ApplyRequest::new()
            .enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(1)])
            .enable(CrtcId(1), ModeId(0), 1920, 0, &[OutputId(1)]);
        assert_eq!(
            validate(&t, &request),
            Err(ValidationError::OutputAssignedTwice(OutputId(1)))
        );

        let request = ApplyRequest::new()
            .primary(OutputId(0))
            .presentation(OutputId(0), true);
        assert_eq!(
            validate(&t, &request),
            Err(ValidationError::DuplicateOutputProperties(OutputId(0)))
        );
    }
}
