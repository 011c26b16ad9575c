//! Duplex pipe transport to the VAST stage-control process.
//!
//! Provides one owned byte stream over whichever local channel the platform
//! offers:
//! - Named pipes (Windows), opened as a client handle
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of vastlink. Framing and the stage protocol build
//! on top of the [`PipeStream`] type provided here.

pub mod connect;
pub mod error;
pub mod retry;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use connect::{connect, connect_with_retry, is_not_ready};
pub use error::{Result, TransportError};
pub use retry::RetryPolicy;
pub use stream::PipeStream;

#[cfg(unix)]
pub use uds::PipeListener;
