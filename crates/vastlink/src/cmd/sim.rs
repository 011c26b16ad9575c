use crate::cmd::SimArgs;
use crate::exit::CliResult;

#[cfg(unix)]
pub fn run(args: SimArgs) -> CliResult<i32> {
    unix::run(args)
}

#[cfg(not(unix))]
pub fn run(_args: SimArgs) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "the simulator needs Unix domain sockets",
    ))
}

#[cfg(unix)]
mod unix {
    use std::io::ErrorKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tracing::{info, warn};
    use vastlink_stage::sim::{serve, SimulatedVast};
    use vastlink_transport::{PipeListener, TransportError};

    use crate::cmd::SimArgs;
    use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};

    const ACCEPT_POLL: Duration = Duration::from_millis(50);

    pub fn run(args: SimArgs) -> CliResult<i32> {
        let listener = PipeListener::bind(&args.path)
            .map_err(|err| transport_error("bind failed", err))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| transport_error("bind failed", err))?;

        let running = Arc::new(AtomicBool::new(true));
        install_ctrlc_handler(running.clone())?;

        let mut sim = SimulatedVast::default()
            .with_busy_polls(args.busy_polls)
            .with_record_busy(args.record_busy)
            .with_autostore(args.autostore);
        info!(path = ?listener.path(), "simulated stage listening");

        let mut served = 0usize;
        while running.load(Ordering::SeqCst) {
            let stream = match listener.accept() {
                Ok(stream) => stream,
                Err(TransportError::Accept(err)) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(err) => return Err(transport_error("accept failed", err)),
            };

            match serve(stream, &mut sim) {
                Ok(handled) => info!(handled, "client session finished"),
                Err(err) => warn!(error = %err, "client session aborted"),
            }
            served = served.saturating_add(1);

            if args.clients.is_some_and(|limit| served >= limit) {
                break;
            }
        }

        let (x, y, rotation) = sim.wire_position();
        info!(x, y, rotation, served, "simulated stage stopped");
        Ok(SUCCESS)
    }

    fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
        let stop = move || running.store(false, Ordering::SeqCst);
        if let Err(err) = ctrlc::set_handler(stop) {
            let message = format!("signal handler: {err}");
            return Err(CliError::new(INTERNAL, message));
        }
        Ok(())
    }
}
