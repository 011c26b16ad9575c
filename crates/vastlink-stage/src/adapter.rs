use std::collections::BTreeMap;
use std::io::{Read, Write};

use tracing::{debug, info, warn};
use vastlink_transport::PipeStream;

use crate::config::{Axis, AxisLimits, StageConfig};
use crate::controller::{Position, VastController};
use crate::error::{Result, StageError};

/// Host axis name to position (µm for x/y, degrees for theta).
pub type AxisPositions = BTreeMap<String, f64>;

/// Targets strictly closer than this to the cached position are not moved.
pub const POSITION_TOLERANCE: f64 = 0.02;

/// Per-axis stage view for a microscope host.
///
/// Host axis names are translated through the configured axes mapping and
/// checked against soft limits before anything goes to the controller.
pub struct VastStage<S: Read + Write = PipeStream> {
    controller: VastController<S>,
    axes_mapping: BTreeMap<String, Axis>,
    limits: BTreeMap<String, AxisLimits>,
}

impl<S: Read + Write> VastStage<S> {
    pub fn new(controller: VastController<S>, config: &StageConfig) -> Self {
        Self {
            controller,
            axes_mapping: config.axes_mapping.clone(),
            limits: config.limits.clone(),
        }
    }

    /// Host axis names, sorted.
    pub fn axes(&self) -> impl Iterator<Item = &str> {
        self.axes_mapping.keys().map(String::as_str)
    }

    pub fn controller(&self) -> &VastController<S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut VastController<S> {
        &mut self.controller
    }

    /// Re-read the controller cache and report every mapped axis.
    ///
    /// This is also how the adapter recovers after a failed move: the
    /// controller's cache is accepted as authoritative again.
    pub fn report_position(&mut self) -> AxisPositions {
        if !self.controller.is_open() {
            debug!("reporting cached position of a closed stage");
        }
        let position = self.controller.resync();
        self.axes_mapping
            .iter()
            .map(|(name, axis)| (name.clone(), axis_value(&position, *axis)))
            .collect()
    }

    /// Move one host axis to an absolute value.
    pub fn move_axis_absolute(&mut self, axis: &str, value: f64, wait_until_done: bool) -> bool {
        let moves = AxisPositions::from([(axis.to_string(), value)]);
        self.move_absolute(&moves, wait_until_done)
    }

    /// Move any subset of host axes to absolute values.
    ///
    /// Returns false if a target is rejected (nothing moves) or if the move
    /// itself failed (the cache is resynced first).
    pub fn move_absolute(&mut self, moves: &AxisPositions, wait_until_done: bool) -> bool {
        match self.try_move_absolute(moves, wait_until_done) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, ?moves, "stage move failed");
                false
            }
        }
    }

    /// [`Self::move_absolute`] with the failure cause.
    ///
    /// Rejected targets come back as [`StageError::UnknownAxis`],
    /// [`StageError::OutOfRange`] or [`StageError::NonFinite`]. Failures after
    /// motion started come back as [`StageError::MoveFailed`].
    pub fn try_move_absolute(
        &mut self,
        moves: &AxisPositions,
        wait_until_done: bool,
    ) -> Result<()> {
        let hardware_moves = self.verify_abs_position(moves)?;

        let current = self.controller.current_position();
        let mut target = current;
        let mut needs_motion = false;
        for (axis, value) in hardware_moves {
            if (value - axis_value(&current, axis)).abs() >= POSITION_TOLERANCE {
                set_axis_value(&mut target, axis, value);
                needs_motion = true;
            }
        }

        if !needs_motion {
            debug!(?moves, "stage already within tolerance");
            return Ok(());
        }

        if let Err(err) = self.drive_to(target, wait_until_done) {
            let reported = self.report_position();
            info!(position = ?reported, "position reported after failed move");
            return Err(StageError::MoveFailed {
                resynced: true,
                source: Box::new(err),
            });
        }
        Ok(())
    }

    /// Resolve host axes to hardware axes and check every target, so a
    /// request either moves as a whole or not at all.
    pub fn verify_abs_position(&self, moves: &AxisPositions) -> Result<Vec<(Axis, f64)>> {
        moves
            .iter()
            .map(|(name, &value)| {
                let axis = *self
                    .axes_mapping
                    .get(name)
                    .ok_or_else(|| StageError::UnknownAxis(name.clone()))?;
                if !value.is_finite() {
                    return Err(StageError::NonFinite(value));
                }
                if let Some(limits) = self.limits.get(name) {
                    if !limits.contains(value) {
                        return Err(StageError::OutOfRange {
                            axis: name.clone(),
                            value,
                            min: limits.min,
                            max: limits.max,
                        });
                    }
                }
                Ok((axis, value))
            })
            .collect()
    }

    /// The protocol has no stop command; motion always runs to completion.
    pub fn stop(&mut self) {
        debug!("stop requested; VAST moves cannot be interrupted");
    }

    pub fn close(&mut self) {
        self.stop();
        self.controller.close();
    }

    /// The host's wait flag sticks on the controller, so translation settles
    /// before the rotation is sent.
    fn drive_to(&mut self, target: Position, wait_until_done: bool) -> Result<()> {
        self.controller.set_wait_until_done(wait_until_done);
        self.controller
            .move_to_specified_position(target.x_um, target.y_um, target.theta_deg)
    }
}

fn axis_value(position: &Position, axis: Axis) -> f64 {
    match axis {
        Axis::X => position.x_um,
        Axis::Y => position.y_um,
        Axis::Theta => position.theta_deg,
    }
}

fn set_axis_value(position: &mut Position, axis: Axis, value: f64) {
    match axis {
        Axis::X => position.x_um = value,
        Axis::Y => position.y_um = value,
        Axis::Theta => position.theta_deg = value,
    }
}
