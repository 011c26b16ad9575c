use std::path::Path;

use crate::cmd::{open_controller, AutostoreArgs};
use crate::exit::{stage_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub fn run(args: AutostoreArgs, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    let mut controller = open_controller(config, &args.connect)?;
    let location = controller
        .last_autostore_location()
        .map_err(|err| stage_error("autostore query failed", err))?;
    controller.close();

    let Some(location) = location else {
        return Err(CliError::new(
            DATA_INVALID,
            "autostore query failed: stage reported no directory",
        ));
    };
    print_response("autostore", Some(&location), format);
    Ok(SUCCESS)
}
