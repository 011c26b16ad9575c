use std::path::Path;

use tracing::debug;
use vastlink_stage::Command;

use crate::cmd::{open_controller, SendArgs};
use crate::exit::{stage_error, CliResult, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    let command = parse_command(&args.command)?;
    let mut controller = open_controller(config, &args.connect)?;

    debug!(opcode = command.opcode(), "sending raw command");
    let response = controller
        .send(&command)
        .map_err(|err| stage_error("send failed", err))?;
    print_response(&command.encode(), response.as_deref(), format);

    controller.close();
    Ok(SUCCESS)
}

/// Known commands are checked for well-formed arguments; anything else is
/// passed through verbatim.
fn parse_command(text: &str) -> CliResult<Command> {
    text.parse::<Command>()
        .map_err(|err| stage_error("invalid command", err))
}
