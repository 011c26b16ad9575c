use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use vastlink_stage::{StageConfig, VastController};

use crate::exit::{stage_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod autostore;
pub mod r#move;
pub mod send;
pub mod sim;
pub mod status;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one raw command and print the response.
    Send(SendArgs),
    /// Move the stage to an (x, y, theta) position.
    Move(MoveArgs),
    /// Query whether the motors are busy.
    Status(StatusArgs),
    /// Print the current autostore directory.
    Autostore(AutostoreArgs),
    /// Serve a simulated stage on a Unix socket.
    Sim(SimArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format, config),
        Command::Move(args) => r#move::run(args, format, config),
        Command::Status(args) => status::run(args, format, config),
        Command::Autostore(args) => autostore::run(args, format, config),
        Command::Sim(args) => sim::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Connection options shared by every command that talks to a stage.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Pipe name (Windows) or socket path (Unix). Defaults to the config value.
    pub pipe: Option<PathBuf>,
    /// Give up connecting after this long (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub connect_timeout: Option<String>,
    /// Launch the configured stage-control executable first and kill it on exit.
    #[arg(long)]
    pub launch: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Command text, e.g. `busy` or `mrel,0,100,0`.
    #[arg(long, short = 'c')]
    pub command: String,
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Target X in µm.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub x: f64,
    /// Target Y in µm.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub y: f64,
    /// Target rotation in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub theta: f64,
    /// Boot the stage firmware before moving.
    #[arg(long)]
    pub boot: bool,
    /// Poll until the motors are idle before printing.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Keep polling until the motors report idle.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args, Debug)]
pub struct AutostoreArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Report busy for this many polls after every move.
    #[arg(long, default_value_t = 0)]
    pub busy_polls: u32,
    /// Directory reported for `autostore`.
    #[arg(long, value_name = "DIR", default_value = "")]
    pub autostore: String,
    /// Answer `busy` with `<x>,<y>,<status>` records.
    #[arg(long)]
    pub record_busy: bool,
    /// Exit after serving this many clients.
    #[arg(long)]
    pub clients: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Load the config file (or defaults) and apply connection flags on top.
pub fn resolve_config(path: Option<&Path>, args: &ConnectArgs) -> CliResult<StageConfig> {
    let mut config = match path {
        Some(path) => StageConfig::from_json_file(path)
            .map_err(|err| stage_error("config load failed", err))?,
        None => StageConfig::default(),
    };

    if let Some(pipe) = &args.pipe {
        config.pipe = pipe.clone();
    }
    if let Some(timeout) = &args.connect_timeout {
        let timeout = parse_duration(timeout)?;
        config.connect.max_wait_ms = Some(timeout.as_millis() as u64);
        config.connect.backoff_ms = config.connect.backoff_ms.min(timeout.as_millis() as u64);
    }
    if !args.launch {
        config.executable = None;
    } else if config.executable.is_none() {
        return Err(CliError::new(
            USAGE,
            "--launch needs an executable in the config file",
        ));
    }
    Ok(config)
}

pub fn open_controller(path: Option<&Path>, args: &ConnectArgs) -> CliResult<VastController> {
    let config = resolve_config(path, args)?;
    VastController::connect(&config).map_err(|err| stage_error("connect failed", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_args(pipe: Option<&str>) -> ConnectArgs {
        ConnectArgs {
            pipe: pipe.map(PathBuf::from),
            connect_timeout: None,
            launch: false,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let mut args = connect_args(Some("/tmp/other.sock"));
        args.connect_timeout = Some("250ms".to_string());
        let config = resolve_config(None, &args).unwrap();
        assert_eq!(config.pipe, PathBuf::from("/tmp/other.sock"));
        assert_eq!(config.connect.max_wait_ms, Some(250));
        assert_eq!(config.connect.backoff_ms, 250);
    }

    #[test]
    fn launch_without_executable_is_usage_error() {
        let mut args = connect_args(None);
        args.launch = true;
        let err = resolve_config(None, &args).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn missing_config_file_is_usage_error() {
        let path = Path::new("/nonexistent/vast.json");
        let err = resolve_config(Some(path), &connect_args(None)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
