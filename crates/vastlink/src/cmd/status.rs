use std::path::Path;

use crate::cmd::{open_controller, StatusArgs};
use crate::exit::{stage_error, CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};

pub fn run(args: StatusArgs, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    let mut controller = open_controller(config, &args.connect)?;

    if args.wait {
        controller
            .wait()
            .map_err(|err| stage_error("wait failed", err))?;
    }
    let status = controller
        .motors_busy()
        .map_err(|err| stage_error("status failed", err))?;

    print_status(status, format);
    controller.close();
    Ok(SUCCESS)
}
