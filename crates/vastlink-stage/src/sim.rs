//! In-process stand-in for the VAST stage-control process.
//!
//! [`SimulatedVast`] answers the command vocabulary the way the pipe server
//! does. [`LoopbackPipe`] feeds it from memory for unit tests, and [`serve`]
//! runs it behind a real pipe for the `vastlink sim` command.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use tracing::{debug, info, warn};
use vastlink_frame::{decode_frame, encode_frame, FrameError, FrameReader, FrameWriter};
use vastlink_transport::PipeStream;

use crate::command::Command;
use crate::error::Result;
use crate::transport::DuplexStream;

/// Simulated stage state, in wire units.
#[derive(Debug, Clone)]
pub struct SimulatedVast {
    x_us: i64,
    y_us: i64,
    rotation_steps: i64,
    booted: bool,
    busy_polls: u32,
    remaining_busy: u32,
    record_busy: bool,
    busy_override: Option<String>,
    autostore: String,
}

impl Default for SimulatedVast {
    fn default() -> Self {
        Self {
            x_us: 0,
            y_us: 0,
            rotation_steps: 0,
            booted: false,
            busy_polls: 0,
            remaining_busy: 0,
            record_busy: false,
            busy_override: None,
            autostore: String::new(),
        }
    }
}

impl SimulatedVast {
    /// Report busy for `polls` queries after every motion command.
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Answer `busy` with `<x>,<y>,<status>` instead of a bare status.
    pub fn with_record_busy(mut self, record: bool) -> Self {
        self.record_busy = record;
        self
    }

    /// Directory reported for `autostore`.
    pub fn with_autostore(mut self, dir: impl Into<String>) -> Self {
        self.autostore = dir.into();
        self
    }

    /// Answer `busy` with this exact payload until cleared.
    pub fn set_busy_override(&mut self, payload: Option<String>) {
        self.busy_override = payload;
    }

    /// Microstep position `(x, y)` and rotation steps.
    pub fn wire_position(&self) -> (i64, i64, i64) {
        (self.x_us, self.y_us, self.rotation_steps)
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Handle one request and produce the response payload.
    pub fn respond(&mut self, request: &str) -> String {
        let command = match request.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                warn!(request, error = %err, "simulator rejected request");
                return String::new();
            }
        };

        match command {
            Command::Boot => {
                self.booted = true;
                String::new()
            }
            Command::Continue => String::new(),
            Command::Autostore => self.autostore.clone(),
            Command::Busy => self.busy_response(),
            Command::Rotate { steps } => {
                self.rotation_steps = self.rotation_steps.saturating_add(steps);
                self.start_motion()
            }
            Command::MoveRelative { dx, dy } => {
                self.x_us = self.x_us.saturating_add(dx);
                self.y_us = self.y_us.saturating_add(dy);
                self.start_motion()
            }
            Command::MoveAbsolute { x, y } => {
                self.x_us = x;
                self.y_us = y;
                self.start_motion()
            }
            Command::Raw(text) => {
                warn!(request = %text, "simulator got unknown command");
                String::new()
            }
        }
    }

    fn start_motion(&mut self) -> String {
        self.remaining_busy = self.busy_polls;
        String::new()
    }

    fn busy_response(&mut self) -> String {
        if let Some(payload) = &self.busy_override {
            return payload.clone();
        }
        let status = u8::from(self.remaining_busy > 0);
        self.remaining_busy = self.remaining_busy.saturating_sub(1);
        if self.record_busy {
            format!("{},{},{status}", self.x_us, self.y_us)
        } else {
            status.to_string()
        }
    }
}

struct LoopbackState {
    sim: SimulatedVast,
    inbound: BytesMut,
    outbound: VecDeque<u8>,
    requests: Vec<String>,
    broken: bool,
}

/// In-memory duplex pipe wired to a [`SimulatedVast`].
///
/// Clones share the same pipe, so one clone can serve as the read half and
/// another as the write half of a transport.
#[derive(Clone)]
pub struct LoopbackPipe {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackPipe {
    pub fn new(sim: SimulatedVast) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopbackState {
                sim,
                inbound: BytesMut::new(),
                outbound: VecDeque::new(),
                requests: Vec::new(),
                broken: false,
            })),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Make every later write fail with `BrokenPipe`.
    pub fn break_pipe(&self) {
        self.lock().broken = true;
    }

    /// Inspect or change the simulator behind the pipe.
    pub fn with_sim<R>(&self, f: impl FnOnce(&mut SimulatedVast) -> R) -> R {
        f(&mut self.lock().sim)
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DuplexStream for LoopbackPipe {
    fn try_clone_handle(&self) -> Result<Self> {
        Ok(self.clone())
    }
}

impl Write for LoopbackPipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.lock();
        if state.broken {
            return Err(std::io::Error::from(ErrorKind::BrokenPipe));
        }
        state.inbound.extend_from_slice(buf);

        loop {
            let frame = match decode_frame(&mut state.inbound, usize::MAX) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(std::io::Error::other(err.to_string())),
            };
            let request = String::from_utf8_lossy(&frame.payload).into_owned();
            let response = state.sim.respond(&request);
            state.requests.push(request);

            let mut wire = BytesMut::new();
            encode_frame(response.as_bytes(), &mut wire)
                .map_err(|err| std::io::Error::other(err.to_string()))?;
            state.outbound.extend(wire.iter().copied());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Read for LoopbackPipe {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.lock();
        let n = buf.len().min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Answer requests from one connected client until it disconnects.
///
/// Returns the number of requests handled.
pub fn serve(stream: PipeStream, sim: &mut SimulatedVast) -> Result<u64> {
    let mut reader = FrameReader::new(stream.try_clone()?);
    let mut writer = FrameWriter::new(stream);
    let mut handled: u64 = 0;

    loop {
        let request = match reader.read_text() {
            Ok(request) => request,
            Err(FrameError::ConnectionClosed) => {
                info!(handled, "simulator client disconnected");
                return Ok(handled);
            }
            Err(err) => return Err(err.into()),
        };
        let response = sim.respond(&request);
        debug!(request = %request, response = %response, "simulator exchange");
        writer.send_text(&response)?;
        handled += 1;
    }
}
