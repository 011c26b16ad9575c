use std::fmt;
use std::io;

use vastlink_frame::FrameError;
use vastlink_stage::StageError;
use vastlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

/// A failed command: the process exit code plus the line printed to stderr.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn wrap(code: i32, context: &str, err: impl fmt::Display) -> Self {
        Self::new(code, format!("{context}: {err}"))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

/// Absent or refusing pipes are transport failures, expired timeouts are
/// timeouts, anything unexpected is internal.
fn io_code(kind: io::ErrorKind) -> i32 {
    use io::ErrorKind::*;
    match kind {
        NotFound | ConnectionRefused | BrokenPipe | ConnectionReset => TRANSPORT_ERROR,
        TimedOut | WouldBlock => TIMEOUT,
        PermissionDenied => PERMISSION_DENIED,
        _ => INTERNAL,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match &err {
        TransportError::ConnectTimeout { .. } => TIMEOUT,
        TransportError::PathTooLong { .. } => USAGE,
        TransportError::Unsupported(_) => TRANSPORT_ERROR,
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_code(source.kind()),
    };
    CliError::wrap(code, context, err)
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match &err {
        FrameError::Io(source) => io_code(source.kind()),
        FrameError::PayloadTooLarge { .. } | FrameError::NotAscii { .. } => DATA_INVALID,
        FrameError::ConnectionClosed => FAILURE,
    };
    CliError::wrap(code, context, err)
}

/// Lower-layer causes keep their own codes; a failed move is reported by
/// what made it fail.
pub fn stage_error(context: &str, err: StageError) -> CliError {
    let err = match err {
        StageError::Transport(err) => return transport_error(context, err),
        StageError::Frame(err) => return frame_error(context, err),
        StageError::MoveFailed { source, .. } => return stage_error(context, *source),
        other => other,
    };
    let code = match &err {
        StageError::Decode { .. } | StageError::EmptyResponse(_) => DATA_INVALID,
        StageError::WaitTimeout { .. } => TIMEOUT,
        StageError::NonFinite(_)
        | StageError::UnknownAxis(_)
        | StageError::OutOfRange { .. }
        | StageError::Config(_)
        | StageError::ConfigRead { .. }
        | StageError::Json(_) => USAGE,
        StageError::Process { .. } | StageError::Closed => FAILURE,
        StageError::Transport(_) | StageError::Frame(_) => INTERNAL,
        StageError::MoveFailed { .. } => INTERNAL,
    };
    CliError::wrap(code, context, err)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn connect_failure(kind: io::ErrorKind) -> StageError {
        StageError::Transport(TransportError::Connect {
            path: "/tmp/vast.sock".into(),
            source: kind.into(),
        })
    }

    #[test]
    fn pipe_and_wait_timeouts_share_a_code() {
        let waited = Duration::from_millis(250);
        let timeout = StageError::WaitTimeout { polls: 25, waited };
        let wait = stage_error("wait failed", timeout);
        let connect = transport_error(
            "connect failed",
            TransportError::ConnectTimeout {
                path: "/tmp/vast.sock".into(),
                waited,
            },
        );
        assert_eq!((wait.code, connect.code), (TIMEOUT, TIMEOUT));
    }

    #[test]
    fn failed_move_reports_its_cause() {
        let err = stage_error(
            "move failed",
            StageError::MoveFailed {
                resynced: true,
                source: Box::new(connect_failure(io::ErrorKind::BrokenPipe)),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        let expected = "move failed: cannot open pipe /tmp/vast.sock";
        assert!(err.message.starts_with(expected));
    }

    #[test]
    fn io_kinds_pick_codes() {
        let code = |kind| stage_error("connect failed", connect_failure(kind)).code;
        assert_eq!(code(io::ErrorKind::ConnectionRefused), TRANSPORT_ERROR);
        assert_eq!(code(io::ErrorKind::PermissionDenied), PERMISSION_DENIED);
        assert_eq!(code(io::ErrorKind::TimedOut), TIMEOUT);
        assert_eq!(code(io::ErrorKind::InvalidInput), INTERNAL);
    }

    #[test]
    fn garbled_reply_is_invalid_data() {
        let err = stage_error(
            "status failed",
            StageError::Decode {
                command: "busy".into(),
                payload: "moving".into(),
            },
        );
        assert_eq!(err.code, DATA_INVALID);

        let closed = StageError::Frame(FrameError::ConnectionClosed);
        let err = stage_error("send failed", closed);
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn bad_target_is_usage_error() {
        let err = stage_error("move failed", StageError::UnknownAxis("z".into()));
        assert_eq!(err.code, USAGE);
        assert_eq!(err.to_string(), err.message);
    }
}
