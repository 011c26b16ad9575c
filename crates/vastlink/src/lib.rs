//! Control a VAST BioImager stage from a microscope host.
//!
//! The stage-control process listens on a local pipe and speaks a small
//! text protocol inside length-prefixed frames. This crate re-exports the
//! three layers that talk to it:
//!
//! - [`transport`]: pipe connection with retry (named pipes, UDS)
//! - [`frame`]: `u32` length-prefixed ASCII framing
//! - [`stage`]: commands, unit conversion, the position cache and the
//!   per-axis host adapter
//!
//! ```no_run
//! use vastlink::stage::{StageConfig, VastController};
//!
//! let config = StageConfig::default();
//! let mut controller = VastController::launch(&config)?;
//! controller.move_to_specified_position(100.0, -50.0, 90.0)?;
//! controller.wait()?;
//! controller.close();
//! # Ok::<(), vastlink::stage::StageError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use vastlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vastlink_frame::*;
}

/// Re-export stage types.
pub mod stage {
    pub use vastlink_stage::*;
}
