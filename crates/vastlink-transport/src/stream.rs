use std::io::{Read, Write};
use std::time::Duration;

use crate::error::{Result, TransportError};

/// A connected pipe to the stage-control process.
///
/// On Windows this wraps a client handle to a named pipe server.
/// On Unix this wraps a Unix domain socket stream.
pub struct PipeStream {
    inner: PipeStreamInner,
}

enum PipeStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(windows)]
    NamedPipe(std::fs::File),
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(file) => file.read(buf),
        }
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.flush(),
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(file) => file.flush(),
        }
    }
}

impl PipeStream {
    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: PipeStreamInner::Unix(stream),
        }
    }

    /// Wrap an open client handle to a Windows named pipe.
    #[cfg(windows)]
    pub fn from_named_pipe(file: std::fs::File) -> Self {
        Self {
            inner: PipeStreamInner::NamedPipe(file),
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Named pipe client handles are synchronous and cannot carry a timeout;
    /// asking for one there returns [`TransportError::Unsupported`].
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(_) => match timeout {
                None => Ok(()),
                Some(_) => Err(TransportError::Unsupported(
                    "read timeout on a named pipe client handle",
                )),
            },
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(_) => match timeout {
                None => Ok(()),
                Some(_) => Err(TransportError::Unsupported(
                    "write timeout on a named pipe client handle",
                )),
            },
        }
    }

    /// Try to clone this stream (duplicates the OS handle).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(file) => Ok(Self::from_named_pipe(file.try_clone()?)),
        }
    }

    /// Shut down both directions of the stream.
    ///
    /// Named pipe handles have no half-close; the handle is released on drop.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                // Peer already gone; nothing left to shut down.
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(TransportError::Io(err)),
            },
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(_) => Ok(()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            PipeStreamInner::Unix(_) => "unix-domain-socket",
            #[cfg(windows)]
            PipeStreamInner::NamedPipe(_) => "named-pipe",
        }
    }
}

impl std::fmt::Debug for PipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn read_write_over_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut left = PipeStream::from_unix(left);
        let mut right = PipeStream::from_unix(right);

        left.write_all(b"boot").unwrap();
        left.flush().unwrap();

        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"boot");
    }

    #[test]
    fn clone_shares_connection() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let left = PipeStream::from_unix(left);
        let mut writer = left.try_clone().unwrap();
        let mut right = PipeStream::from_unix(right);

        writer.write_all(b"cont").unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cont");
    }

    #[test]
    fn shutdown_makes_peer_see_eof() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let left = PipeStream::from_unix(left);
        let mut right = PipeStream::from_unix(right);

        left.shutdown().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn debug_names_transport() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = PipeStream::from_unix(left);
        assert!(format!("{stream:?}").contains("unix-domain-socket"));
    }
}
