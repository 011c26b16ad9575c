use std::path::Path;

use tracing::info;

use crate::cmd::{open_controller, MoveArgs};
use crate::exit::{stage_error, CliResult, SUCCESS};
use crate::output::{print_position, OutputFormat};

pub fn run(args: MoveArgs, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    let mut controller = open_controller(config, &args.connect)?;

    if args.boot {
        controller
            .start_vast()
            .map_err(|err| stage_error("boot failed", err))?;
    }

    controller
        .move_to_specified_position(args.x, args.y, args.theta)
        .map_err(|err| stage_error("move failed", err))?;

    if args.wait && !controller.wait_until_done() {
        controller
            .wait()
            .map_err(|err| stage_error("wait failed", err))?;
        info!("stage idle");
    }

    let synced = controller.is_synced();
    print_position(controller.current_position(), synced, format);
    controller.close();
    Ok(SUCCESS)
}
