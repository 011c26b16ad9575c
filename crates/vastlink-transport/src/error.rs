use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Listening on a pipe path failed.
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Opening the pipe failed with an error that retrying will not fix.
    #[error("cannot open pipe {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The pipe never became ready within the retry budget.
    #[error("pipe {path} not ready after {waited:?}")]
    ConnectTimeout { path: PathBuf, waited: Duration },

    #[error("accept on stage pipe: {0}")]
    Accept(std::io::Error),

    #[error("pipe I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Unix socket paths are limited by `sockaddr_un`.
    #[error("pipe path {path} is {len} bytes, limit is {max}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    #[error("not supported here: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;
