use std::fs::{Metadata, Permissions};
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::PipeStream;

/// `sockaddr_un.sun_path` capacity, terminating NUL included.
#[cfg(target_os = "linux")]
const SUN_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_LEN: usize = 104;

/// Server side of the pipe on Unix, backed by a filesystem-path socket.
///
/// The VAST stage-control process itself only runs on Windows; this listener
/// hosts the simulator and test doubles that speak the same protocol.
/// The socket file is removed on drop if it is still the one we created.
pub struct PipeListener {
    listener: UnixListener,
    path: PathBuf,
    identity: SocketIdentity,
}

/// Device and inode of the socket file this listener created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketIdentity {
    dev: u64,
    ino: u64,
}

impl SocketIdentity {
    fn of(metadata: &Metadata) -> Option<Self> {
        if !metadata.file_type().is_socket() {
            return None;
        }
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }
}

impl PipeListener {
    /// Owner read/write only.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Listen at `path`. A socket file left there by an earlier run is
    /// replaced; any other kind of file is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= SUN_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: SUN_PATH_LEN,
            });
        }

        match Self::listen(&path) {
            Ok((listener, identity)) => {
                info!(?path, "stage pipe listening");
                Ok(Self {
                    listener,
                    path,
                    identity,
                })
            }
            Err(source) => Err(TransportError::Bind { path, source }),
        }
    }

    fn listen(path: &Path) -> io::Result<(UnixListener, SocketIdentity)> {
        if let Ok(existing) = std::fs::symlink_metadata(path) {
            if SocketIdentity::of(&existing).is_none() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "path exists and is not a socket",
                ));
            }
            debug!(?path, "replacing leftover socket");
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, Permissions::from_mode(Self::DEFAULT_SOCKET_MODE))?;
        let identity = SocketIdentity::of(&std::fs::symlink_metadata(path)?)
            .ok_or_else(|| io::Error::other("socket path replaced during bind"))?;
        Ok((listener, identity))
    }

    /// Accept the next client. The returned stream is always blocking.
    pub fn accept(&self) -> Result<PipeStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        // Some platforms hand out accepted sockets in the listener's mode.
        stream
            .set_nonblocking(false)
            .map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "stage client connected");
        Ok(PipeStream::from_unix(stream))
    }

    /// With `true`, `accept` returns `WouldBlock` instead of waiting.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        Ok(self.listener.set_nonblocking(nonblocking)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        let current = std::fs::symlink_metadata(&self.path)
            .ok()
            .and_then(|m| SocketIdentity::of(&m));
        if current == Some(self.identity) {
            debug!(path = ?self.path, "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else if current.is_some() {
            debug!(path = ?self.path, "socket path now belongs to another listener");
        }
    }
}
