use std::io::{Read, Write};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, trace, warn};
use vastlink_frame::FrameConfig;
use vastlink_transport::{connect_with_retry, PipeStream};

use crate::command::{parse_busy_status, Command};
use crate::config::StageConfig;
use crate::error::{Result, StageError};
use crate::process::VastProcess;
use crate::transport::{DuplexStream, Transport};
use crate::units::{deg_to_steps, um_to_microsteps};
use crate::wait::WaitPolicy;

/// Where the controller believes the stage is.
///
/// `theta_deg` is relative to wherever the rotation motor was at connect
/// time; the capillary motor has no absolute zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x_um: f64,
    pub y_um: f64,
    pub theta_deg: f64,
}

impl Position {
    pub fn new(x_um: f64, y_um: f64, theta_deg: f64) -> Self {
        Self {
            x_um,
            y_um,
            theta_deg,
        }
    }
}

/// Runtime knobs for a [`VastController`].
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    pub wait: WaitPolicy,
    pub wait_until_done: bool,
    pub frame: FrameConfig,
}

/// Synchronous command channel to one VAST stage.
///
/// Every wire operation takes `&mut self`, so only one request can be in
/// flight. Moves update the cached [`Position`] before the command is sent;
/// if sending fails the cache is marked unsynced until [`Self::resync`].
pub struct VastController<S: Read + Write = PipeStream> {
    transport: Option<Transport<S>>,
    process: Option<VastProcess>,
    position: Position,
    synced: bool,
    wait_until_done: bool,
    wait_policy: WaitPolicy,
}

impl VastController<PipeStream> {
    /// Launch the configured executable (if any) and connect to its pipe.
    ///
    /// Blocks until the pipe accepts the connection or the retry budget in
    /// `config.connect` runs out. The stage is assumed homed: the position
    /// cache starts at (0, 0, 0).
    pub fn connect(config: &StageConfig) -> Result<Self> {
        let process = match &config.executable {
            Some(path) => Some(VastProcess::spawn(path, &config.args)?),
            None => None,
        };

        // On failure the spawned process is dropped, which kills it.
        let stream = connect_with_retry(&config.pipe, &config.retry_policy())?;
        let options = config.controller_options();
        let transport = Transport::from_pipe(stream, options.frame.clone())?;

        let mut controller = Self::with_transport(transport, options);
        controller.process = process;
        Ok(controller)
    }

    /// [`Self::connect`], then boot the stage firmware.
    pub fn launch(config: &StageConfig) -> Result<Self> {
        let mut controller = Self::connect(config)?;
        controller.start_vast()?;
        Ok(controller)
    }
}

impl<S: Read + Write> VastController<S> {
    /// Wrap an already-open stream. The position cache starts at (0, 0, 0).
    pub fn from_stream(stream: S, options: ControllerOptions) -> Result<Self>
    where
        S: DuplexStream,
    {
        let transport = Transport::split(stream, options.frame.clone())?;
        Ok(Self::with_transport(transport, options))
    }

    /// Wrap the two halves of one already-open connection.
    pub fn from_halves(read_half: S, write_half: S, options: ControllerOptions) -> Self {
        let transport = Transport::new(read_half, write_half, options.frame.clone());
        Self::with_transport(transport, options)
    }

    /// Wrap an existing transport.
    pub fn with_transport(transport: Transport<S>, options: ControllerOptions) -> Self {
        Self {
            transport: Some(transport),
            process: None,
            position: Position::default(),
            synced: true,
            wait_until_done: options.wait_until_done,
            wait_policy: options.wait,
        }
    }

    /// Send a raw command and return its response payload, if any.
    pub fn send(&mut self, command: &Command) -> Result<Option<String>> {
        let transport = self.transport.as_mut().ok_or(StageError::Closed)?;
        transport.send(command)
    }

    /// Boot the stage firmware.
    pub fn start_vast(&mut self) -> Result<()> {
        self.send(&Command::Boot)?;
        info!("stage firmware booted");
        Ok(())
    }

    /// Resume a paused VAST operation.
    pub fn continue_operation(&mut self) -> Result<()> {
        self.send(&Command::Continue).map(drop)
    }

    /// Directory the VAST autostore subsystem is currently writing to.
    pub fn last_autostore_location(&mut self) -> Result<Option<String>> {
        self.send(&Command::Autostore)
    }

    /// Cached position. Never touches the hardware.
    pub fn current_position(&self) -> Position {
        self.position
    }

    /// False after a move command failed to go out; the cache may not match
    /// the hardware until [`Self::resync`] is called.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Accept the cached position as authoritative again and return it.
    pub fn resync(&mut self) -> Position {
        if !self.synced {
            warn!(position = ?self.position, "position cache resynced after failed move");
        }
        self.synced = true;
        self.position
    }

    pub fn wait_until_done(&self) -> bool {
        self.wait_until_done
    }

    pub fn set_wait_until_done(&mut self, wait_until_done: bool) {
        self.wait_until_done = wait_until_done;
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait_policy
    }

    pub fn set_wait_policy(&mut self, policy: WaitPolicy) {
        self.wait_policy = policy;
    }

    /// Move XY by a relative distance in µm.
    ///
    /// The cache moves first. Each delta is truncated to whole microsteps on
    /// the wire, so the cache can drift from the hardware by under one
    /// microstep per move.
    pub fn move_rel_um(&mut self, dx_um: f64, dy_um: f64) -> Result<()> {
        finite(dx_um)?;
        finite(dy_um)?;
        self.position.x_um += dx_um;
        self.position.y_um += dy_um;

        self.send_motion(Command::MoveRelative {
            dx: um_to_microsteps(dx_um),
            dy: um_to_microsteps(dy_um),
        })
    }

    /// Move XY to an absolute position in µm.
    pub fn move_abs_um(&mut self, x_um: f64, y_um: f64) -> Result<()> {
        finite(x_um)?;
        finite(y_um)?;
        self.position.x_um = x_um;
        self.position.y_um = y_um;

        self.send_motion(Command::MoveAbsolute {
            x: um_to_microsteps(x_um),
            y: um_to_microsteps(y_um),
        })
    }

    /// Rotate the capillary by `theta_deg` relative to where it is now.
    pub fn rotate_deg(&mut self, theta_deg: f64) -> Result<()> {
        finite(theta_deg)?;
        self.position.theta_deg += theta_deg;

        self.send_motion(Command::Rotate {
            steps: deg_to_steps(theta_deg),
        })
    }

    /// Go to (x, y, theta) using relative moves from the cached position.
    ///
    /// Translation always goes first. The rotation is only sent when `theta`
    /// differs from the cached angle, as the delta between the two; any
    /// rotation made behind this controller's back is therefore never
    /// corrected.
    pub fn move_to_specified_position(
        &mut self,
        x_um: f64,
        y_um: f64,
        theta_deg: f64,
    ) -> Result<()> {
        finite(x_um)?;
        finite(y_um)?;
        finite(theta_deg)?;
        debug!(x_um, y_um, theta_deg, from = ?self.position, "moving to position");

        self.move_rel_um(x_um - self.position.x_um, y_um - self.position.y_um)?;

        if theta_deg != self.position.theta_deg {
            self.rotate_deg(theta_deg - self.position.theta_deg)?;
        }
        Ok(())
    }

    /// One `busy` query. Nonzero means the motors are moving.
    pub fn motors_busy(&mut self) -> Result<i64> {
        let response = self.send(&Command::Busy)?;
        parse_busy_status(response.as_deref())
    }

    /// Poll `busy` until it reads exactly zero.
    ///
    /// Returns as soon as an idle status is seen. Fails with
    /// [`StageError::WaitTimeout`] once the wait policy's budget is spent.
    pub fn wait(&mut self) -> Result<()> {
        let policy = self.wait_policy;
        let start = Instant::now();
        let mut polls: u64 = 0;

        loop {
            let status = self.motors_busy()?;
            polls += 1;
            trace!(polls, status, "waiting for motors");
            if status == 0 {
                debug!(polls, elapsed = ?start.elapsed(), "motors idle");
                return Ok(());
            }

            let waited = start.elapsed();
            if policy.exhausted(waited) {
                return Err(StageError::WaitTimeout { polls, waited });
            }
            std::thread::sleep(policy.poll_interval);
        }
    }

    /// Returns true until [`Self::close`] has run.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Close the pipe, then kill the stage-control process if this
    /// controller launched it. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            drop(transport);
            info!("stage connection closed");
        }
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
    }

    fn send_motion(&mut self, command: Command) -> Result<()> {
        if let Err(err) = self.send(&command) {
            self.synced = false;
            warn!(command = %command, error = %err, "move not sent; position cache is stale");
            return Err(err);
        }
        if self.wait_until_done {
            self.wait()?;
        }
        Ok(())
    }
}

impl<S: Read + Write> Drop for VastController<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn finite(value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StageError::NonFinite(value))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sim::{LoopbackPipe, SimulatedVast};
    use crate::units::UM_TO_US;

    fn controller_with(sim: SimulatedVast) -> (VastController<LoopbackPipe>, LoopbackPipe) {
        let pipe = LoopbackPipe::new(sim);
        let options = ControllerOptions {
            wait: WaitPolicy::bounded(Duration::from_millis(1), Duration::from_secs(5)),
            ..ControllerOptions::default()
        };
        let controller = VastController::from_stream(pipe.clone(), options).unwrap();
        (controller, pipe)
    }

    fn controller() -> (VastController<LoopbackPipe>, LoopbackPipe) {
        controller_with(SimulatedVast::default())
    }

    #[test]
    fn starts_homed_and_synced() {
        let (controller, pipe) = controller();
        assert_eq!(controller.current_position(), Position::default());
        assert!(controller.is_synced());
        assert!(!controller.wait_until_done());
        assert!(pipe.requests().is_empty());
    }

    #[test]
    fn halves_of_one_pipe_drive_the_stage() {
        let pipe = LoopbackPipe::new(SimulatedVast::default());
        let options = ControllerOptions::default();
        let mut controller = VastController::from_halves(pipe.clone(), pipe.clone(), options);

        controller.rotate_deg(9.0).unwrap();
        assert_eq!(pipe.requests(), vec!["rot,12"]);
        assert_eq!(pipe.with_sim(|sim| sim.wire_position()), (0, 0, 12));
    }

    #[test]
    fn relative_moves_accumulate_in_cache() {
        let (mut controller, pipe) = controller();
        let deltas = [(10.0, -5.0), (0.25, 100.0), (-33.3, 0.0), (1e-3, -1e-3)];
        for (dx, dy) in deltas {
            controller.move_rel_um(dx, dy).unwrap();
        }

        let (sum_x, sum_y) = deltas
            .iter()
            .fold((0.0, 0.0), |(x, y), (dx, dy)| (x + dx, y + dy));
        let position = controller.current_position();
        assert_eq!(position.x_um, sum_x);
        assert_eq!(position.y_um, sum_y);
        assert_eq!(pipe.requests()[0], "mrel,0,213,-106");
    }

    #[test]
    fn relative_cache_updates_even_when_send_fails() {
        let (mut controller, pipe) = controller();
        controller.move_rel_um(5.0, 5.0).unwrap();
        pipe.break_pipe();

        let err = controller.move_rel_um(2.5, -1.0).unwrap_err();
        assert!(matches!(err, StageError::Frame(_)));
        assert_eq!(controller.current_position(), Position::new(7.5, 4.0, 0.0));
        assert!(!controller.is_synced());

        assert_eq!(controller.resync(), Position::new(7.5, 4.0, 0.0));
        assert!(controller.is_synced());
    }

    #[test]
    fn absolute_move_is_idempotent() {
        let (mut controller, pipe) = controller();
        controller.move_abs_um(100.0, -20.0).unwrap();
        let first = controller.current_position();
        controller.move_abs_um(100.0, -20.0).unwrap();

        assert_eq!(controller.current_position(), first);
        assert_eq!(first, Position::new(100.0, -20.0, 0.0));
        let requests = pipe.requests();
        assert_eq!(requests, vec!["mabs,0,2133,-426", "mabs,0,2133,-426"]);
    }

    #[test]
    fn microsteps_truncate_not_round() {
        let (mut controller, pipe) = controller();
        // 0.99 µsteps and -0.99 µsteps both truncate to zero.
        let almost_one = 0.99 / UM_TO_US;
        controller.move_rel_um(almost_one, -almost_one).unwrap();
        assert_eq!(pipe.requests(), vec!["mrel,0,0,0"]);
    }

    #[test]
    fn rotation_is_relative_and_accumulates() {
        let (mut controller, pipe) = controller();
        controller.rotate_deg(45.0).unwrap();
        controller.rotate_deg(45.0).unwrap();
        assert_eq!(controller.current_position().theta_deg, 90.0);
        assert_eq!(pipe.requests(), vec!["rot,62", "rot,62"]);
    }

    #[test]
    fn same_theta_issues_no_rotation() {
        let (mut controller, pipe) = controller();
        controller.rotate_deg(90.0).unwrap();
        pipe.clear_requests();

        controller
            .move_to_specified_position(0.0, 0.0, 90.0)
            .unwrap();
        assert_eq!(pipe.requests(), vec!["mrel,0,0,0"]);
    }

    #[test]
    fn theta_delta_is_sent_after_translation() {
        let (mut controller, pipe) = controller();
        controller.rotate_deg(90.0).unwrap();
        pipe.clear_requests();

        controller
            .move_to_specified_position(10.0, 20.0, 135.0)
            .unwrap();
        assert_eq!(pipe.requests(), vec!["mrel,0,213,426", "rot,62"]);
        assert_eq!(
            controller.current_position(),
            Position::new(10.0, 20.0, 135.0)
        );
    }

    #[test]
    fn specified_position_moves_by_delta_from_cache() {
        let (mut controller, pipe) = controller();
        controller.move_abs_um(50.0, 50.0).unwrap();
        pipe.clear_requests();

        controller
            .move_to_specified_position(40.0, 60.0, 0.0)
            .unwrap();
        assert_eq!(pipe.requests(), vec!["mrel,0,-213,213"]);
    }

    #[test]
    fn wait_returns_on_first_idle_status() {
        let (mut controller, pipe) = controller_with(SimulatedVast::default().with_busy_polls(4));
        controller.move_rel_um(1.0, 1.0).unwrap();
        controller.wait().unwrap();

        let busy_polls = pipe.requests().iter().filter(|r| *r == "busy").count();
        assert_eq!(busy_polls, 5);
    }

    #[test]
    fn wait_accepts_record_status() {
        let sim = SimulatedVast::default()
            .with_busy_polls(2)
            .with_record_busy(true);
        let (mut controller, _pipe) = controller_with(sim);
        controller.move_abs_um(10.0, 10.0).unwrap();
        controller.wait().unwrap();
    }

    #[test]
    fn wait_times_out_when_never_idle() {
        let sim = SimulatedVast::default().with_busy_polls(u32::MAX);
        let (mut controller, _pipe) = controller_with(sim);
        let policy = WaitPolicy::bounded(Duration::from_millis(1), Duration::from_millis(20));
        controller.set_wait_policy(policy);
        controller.move_rel_um(1.0, 0.0).unwrap();

        let err = controller.wait().unwrap_err();
        assert!(matches!(err, StageError::WaitTimeout { polls, .. } if polls >= 1));
    }

    #[test]
    fn wait_until_done_blocks_after_each_move() {
        let (mut controller, pipe) = controller_with(SimulatedVast::default().with_busy_polls(2));
        controller.set_wait_until_done(true);

        controller.move_rel_um(1.0, 0.0).unwrap();
        controller.rotate_deg(9.0).unwrap();
        assert_eq!(
            pipe.requests(),
            vec![
                "mrel,0,21,0",
                "busy",
                "busy",
                "busy",
                "rot,12",
                "busy",
                "busy",
                "busy",
            ]
        );
    }

    #[test]
    fn non_integer_busy_is_decode_error() {
        let (mut controller, pipe) = controller();
        pipe.with_sim(|sim| sim.set_busy_override(Some("moving".to_string())));
        let err = controller.motors_busy().unwrap_err();
        assert!(matches!(err, StageError::Decode { .. }));
    }

    #[test]
    fn autostore_and_housekeeping_commands() {
        let sim = SimulatedVast::default().with_autostore("D:\\vast\\fish01");
        let (mut controller, pipe) = controller_with(sim);

        controller.start_vast().unwrap();
        controller.continue_operation().unwrap();
        let location = controller.last_autostore_location().unwrap();

        assert_eq!(location.as_deref(), Some("D:\\vast\\fish01"));
        assert_eq!(pipe.requests(), vec!["boot", "cont", "autostore"]);
    }

    #[test]
    fn non_finite_targets_rejected_before_cache_update() {
        let (mut controller, pipe) = controller();
        assert!(matches!(
            controller.move_rel_um(f64::NAN, 0.0),
            Err(StageError::NonFinite(_))
        ));
        assert!(matches!(
            controller.move_to_specified_position(0.0, 0.0, f64::INFINITY),
            Err(StageError::NonFinite(_))
        ));
        assert_eq!(controller.current_position(), Position::default());
        assert!(pipe.requests().is_empty());
    }

    #[test]
    fn close_is_idempotent_and_blocks_commands() {
        let (mut controller, _pipe) = controller();
        assert!(controller.is_open());
        controller.close();
        controller.close();
        assert!(!controller.is_open());
        assert!(matches!(
            controller.motors_busy(),
            Err(StageError::Closed)
        ));
        // The cache stays readable after close.
        assert_eq!(controller.current_position(), Position::default());
    }
}
