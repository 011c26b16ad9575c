use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vastlink_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use vastlink_transport::RetryPolicy;

use crate::controller::ControllerOptions;
use crate::error::{Result, StageError};
use crate::wait::WaitPolicy;

/// Pipe name the VAST stage-control process serves on.
#[cfg(windows)]
pub const DEFAULT_PIPE: &str = r"\\.\pipe\VastServerPipe";
/// Socket path the simulator serves on by default.
#[cfg(not(windows))]
pub const DEFAULT_PIPE: &str = "/tmp/vast-server.sock";

/// A hardware axis of the VAST stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Theta,
}

impl Axis {
    /// All hardware axes, in move order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Theta];

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Theta => "theta",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "theta" | "r" => Ok(Axis::Theta),
            other => Err(StageError::UnknownAxis(other.to_string())),
        }
    }
}

/// Soft travel limits for one axis, in µm (or degrees for theta).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AxisLimits {
    pub min: f64,
    pub max: f64,
}

impl AxisLimits {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

/// Connection retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectConfig {
    /// Delay between attempts.
    pub backoff_ms: u64,
    /// Overall budget; `null` retries forever.
    pub max_wait_ms: Option<u64>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            backoff_ms: RetryPolicy::DEFAULT_BACKOFF.as_millis() as u64,
            max_wait_ms: Some(RetryPolicy::DEFAULT_MAX_WAIT.as_millis() as u64),
        }
    }
}

/// Busy-poll settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    /// Delay between `busy` queries.
    pub poll_interval_ms: u64,
    /// Overall budget; `null` polls forever.
    pub timeout_ms: Option<u64>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: WaitPolicy::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            timeout_ms: Some(WaitPolicy::DEFAULT_TIMEOUT.as_millis() as u64),
        }
    }
}

/// Everything needed to launch, connect to and drive one VAST stage.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```json
/// {
///   "executable": "C:\\VAST\\TestAutoSampIntegration.exe",
///   "wait": { "timeout_ms": null },
///   "limits": { "x": { "min": -5000, "max": 5000 } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    /// Pipe name (Windows) or socket path (Unix).
    pub pipe: PathBuf,
    /// Stage-control executable to launch before connecting.
    pub executable: Option<PathBuf>,
    /// Arguments for `executable`.
    pub args: Vec<String>,
    pub connect: ConnectConfig,
    pub wait: WaitConfig,
    /// Block on every move until the motors report idle.
    pub wait_until_done: bool,
    /// Host axis name to hardware axis.
    pub axes_mapping: BTreeMap<String, Axis>,
    /// Soft limits keyed by host axis name.
    pub limits: BTreeMap<String, AxisLimits>,
    pub max_payload_size: usize,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            pipe: PathBuf::from(DEFAULT_PIPE),
            executable: None,
            args: Vec::new(),
            connect: ConnectConfig::default(),
            wait: WaitConfig::default(),
            wait_until_done: false,
            axes_mapping: Axis::ALL
                .iter()
                .map(|axis| (axis.as_str().to_string(), *axis))
                .collect(),
            limits: BTreeMap::new(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

impl StageConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StageError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.wait.poll_interval_ms == 0 {
            return Err(StageError::Config(
                "wait.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_payload_size == 0 {
            return Err(StageError::Config(
                "max_payload_size must be greater than zero".to_string(),
            ));
        }

        let mut seen = BTreeMap::new();
        for (name, axis) in &self.axes_mapping {
            if let Some(other) = seen.insert(*axis, name) {
                return Err(StageError::Config(format!(
                    "axes '{other}' and '{name}' both map to hardware axis {axis}"
                )));
            }
        }

        for (name, limits) in &self.limits {
            if !self.axes_mapping.contains_key(name) {
                return Err(StageError::Config(format!(
                    "limits given for unmapped axis '{name}'"
                )));
            }
            if limits.min.is_nan() || limits.max.is_nan() || limits.min > limits.max {
                return Err(StageError::Config(format!(
                    "axis '{name}' limits [{}, {}] are empty",
                    limits.min, limits.max
                )));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.connect.backoff_ms),
            max_wait: self.connect.max_wait_ms.map(Duration::from_millis),
        }
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(self.wait.poll_interval_ms),
            timeout: self.wait.timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            write_timeout: self.write_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            wait: self.wait_policy(),
            wait_until_done: self.wait_until_done,
            frame: self.frame_config(),
        }
    }
}
