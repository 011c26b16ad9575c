use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while driving the VAST stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The pipe could not be opened.
    #[error("connection error: {0}")]
    Transport(#[from] vastlink_transport::TransportError),

    /// Framing or I/O failure on an open pipe.
    #[error("frame error: {0}")]
    Frame(#[from] vastlink_frame::FrameError),

    /// The response payload does not match what the command expects.
    #[error("cannot decode response to '{command}': {payload:?}")]
    Decode { command: String, payload: String },

    /// A command that needs a payload got an empty response.
    #[error("empty response to '{0}'")]
    EmptyResponse(String),

    /// A host-level move failed; `resynced` tells whether the position
    /// cache was re-read afterwards.
    #[error("move failed (position cache {}): {source}", cache_state(.resynced))]
    MoveFailed {
        resynced: bool,
        #[source]
        source: Box<StageError>,
    },

    /// The motors never reported idle within the wait budget.
    #[error("motors still busy after {polls} polls ({waited:?})")]
    WaitTimeout { polls: u64, waited: Duration },

    /// The controller has been closed.
    #[error("stage connection is closed")]
    Closed,

    /// The stage-control executable could not be started.
    #[error("failed to launch {path}: {source}")]
    Process {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A target coordinate is NaN or infinite.
    #[error("non-finite target value {0}")]
    NonFinite(f64),

    /// The axis name is not part of the axes mapping.
    #[error("unknown axis '{0}'")]
    UnknownAxis(String),

    /// The target lies outside the configured soft limits.
    #[error("{axis} target {value} outside limits [{min}, {max}]")]
    OutOfRange {
        axis: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::StageConfig`].
    #[error("config json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn cache_state(resynced: &bool) -> &'static str {
    if *resynced {
        "resynced"
    } else {
        "stale"
    }
}

pub type Result<T> = std::result::Result<T, StageError>;
