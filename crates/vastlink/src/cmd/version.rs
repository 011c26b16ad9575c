use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("vastlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: vastlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("VASTLINK_BUILD_TARGET"));
    println!("profile: {}", env!("VASTLINK_BUILD_PROFILE"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    let rustc = option_env!("RUSTC_VERSION").unwrap_or("unknown");
    println!("rustc: {rustc}");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    println!("git_hash: {git_hash}");
    println!("default_pipe: {}", vastlink_stage::config::DEFAULT_PIPE);

    Ok(SUCCESS)
}
