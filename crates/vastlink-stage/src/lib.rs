//! VAST BioImager stage control over the stage-control process pipe.
//!
//! This crate turns physical-unit stage operations into the VAST command
//! vocabulary and keeps a local cache of where the stage should be:
//!
//! - [`units`]: micrometer/degree to microstep conversion
//! - [`command`]: wire commands and response decoding
//! - [`controller`]: [`VastController`], the synchronous command channel
//! - [`adapter`]: [`VastStage`], the per-axis view a microscope host drives
//! - [`sim`]: an in-process stand-in for the stage-control process
//!
//! The position cache is optimistic: it is updated when a move is issued,
//! not when the hardware confirms it. See [`VastController::is_synced`].

pub mod adapter;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod process;
pub mod sim;
pub mod transport;
pub mod units;
pub mod wait;

pub use adapter::{AxisPositions, VastStage, POSITION_TOLERANCE};
pub use command::{parse_busy_status, Command};
pub use config::{Axis, AxisLimits, ConnectConfig, StageConfig, WaitConfig};
pub use controller::{ControllerOptions, Position, VastController};
pub use error::{Result, StageError};
pub use process::VastProcess;
pub use transport::{DuplexStream, Transport};
pub use units::{
    deg_to_steps, microsteps_to_um, steps_to_deg, um_to_microsteps, DEG_TO_US, UM_TO_US,
};
pub use wait::WaitPolicy;
