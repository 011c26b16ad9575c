use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StageError};

/// Sub-device selector the VAST pipe server expects in XY moves.
pub const XY_SUBDEVICE: i64 = 0;

/// One request understood by the VAST stage-control process.
///
/// Each command encodes to a single comma-separated ASCII record with no
/// terminator; the framing layer adds the length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the stage firmware.
    Boot,
    /// Rotate the capillary by a relative number of motor steps.
    Rotate { steps: i64 },
    /// Move XY by a relative number of microsteps.
    MoveRelative { dx: i64, dy: i64 },
    /// Move XY to absolute microstep coordinates.
    MoveAbsolute { x: i64, y: i64 },
    /// Ask whether the motors are still moving.
    Busy,
    /// Ask for the current autostore directory.
    Autostore,
    /// Resume a paused operation.
    Continue,
    /// Any other request, sent verbatim.
    Raw(String),
}

impl Command {
    /// The wire text for this command.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Short opcode name for logs.
    pub fn opcode(&self) -> &str {
        match self {
            Command::Boot => "boot",
            Command::Rotate { .. } => "rot",
            Command::MoveRelative { .. } => "mrel",
            Command::MoveAbsolute { .. } => "mabs",
            Command::Busy => "busy",
            Command::Autostore => "autostore",
            Command::Continue => "cont",
            Command::Raw(text) => text.split(',').next().unwrap_or_default(),
        }
    }

    /// Returns true for commands that start motor motion.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Command::Rotate { .. } | Command::MoveRelative { .. } | Command::MoveAbsolute { .. }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Boot => f.write_str("boot"),
            Command::Rotate { steps } => write!(f, "rot,{steps}"),
            Command::MoveRelative { dx, dy } => write!(f, "mrel,{XY_SUBDEVICE},{dx},{dy}"),
            Command::MoveAbsolute { x, y } => write!(f, "mabs,{XY_SUBDEVICE},{x},{y}"),
            Command::Busy => f.write_str("busy"),
            Command::Autostore => f.write_str("autostore"),
            Command::Continue => f.write_str("cont"),
            Command::Raw(text) => f.write_str(text),
        }
    }
}

impl FromStr for Command {
    type Err = StageError;

    /// Parse wire text back into a command. Unknown opcodes become [`Command::Raw`];
    /// known opcodes with malformed arguments are an error.
    fn from_str(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
        let malformed = || StageError::Decode {
            command: text.to_string(),
            payload: text.to_string(),
        };
        let int = |field: &str| field.parse::<i64>().map_err(|_| malformed());

        match fields.as_slice() {
            ["boot"] => Ok(Command::Boot),
            ["busy"] => Ok(Command::Busy),
            ["autostore"] => Ok(Command::Autostore),
            ["cont"] => Ok(Command::Continue),
            ["rot", steps] => Ok(Command::Rotate {
                steps: int(*steps)?,
            }),
            ["mrel", device, dx, dy] => {
                int(*device)?;
                Ok(Command::MoveRelative {
                    dx: int(*dx)?,
                    dy: int(*dy)?,
                })
            }
            ["mabs", device, x, y] => {
                int(*device)?;
                Ok(Command::MoveAbsolute {
                    x: int(*x)?,
                    y: int(*y)?,
                })
            }
            ["boot" | "busy" | "autostore" | "cont" | "rot" | "mrel" | "mabs", ..] => {
                Err(malformed())
            }
            _ => Ok(Command::Raw(text.to_string())),
        }
    }
}

/// Decode the response to a `busy` query.
///
/// Firmware builds differ: some answer a bare integer, others a
/// comma-separated record whose last field is the status. Both are accepted.
/// Nonzero means the motors are moving.
pub fn parse_busy_status(response: Option<&str>) -> Result<i64> {
    let Some(payload) = response else {
        return Err(StageError::EmptyResponse("busy".to_string()));
    };
    let status = payload.rsplit(',').next().unwrap_or(payload).trim();
    status.parse::<i64>().map_err(|_| StageError::Decode {
        command: "busy".to_string(),
        payload: payload.to_string(),
    })
}
