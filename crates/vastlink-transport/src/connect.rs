use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::retry::RetryPolicy;
use crate::stream::PipeStream;

/// Win32 `ERROR_PIPE_BUSY`: the pipe exists but every instance is taken.
#[cfg(windows)]
const ERROR_PIPE_BUSY: i32 = 231;

/// Open the pipe once (blocking).
///
/// On Windows `path` is a pipe name such as `\\.\pipe\VastServerPipe`.
/// On Unix it is the filesystem path of a listening socket.
pub fn connect(path: impl AsRef<Path>) -> Result<PipeStream> {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        let stream =
            std::os::unix::net::UnixStream::connect(path).map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to unix domain socket");
        Ok(PipeStream::from_unix(stream))
    }

    #[cfg(windows)]
    {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to named pipe");
        Ok(PipeStream::from_named_pipe(file))
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(TransportError::Unsupported(
            "no pipe transport on this platform",
        ))
    }
}

/// Open the pipe, retrying while the server side is not up yet.
///
/// Only "not ready" failures are retried (see [`is_not_ready`]); anything
/// else is returned immediately. Once `policy` runs out the call fails with
/// [`TransportError::ConnectTimeout`].
pub fn connect_with_retry(path: impl AsRef<Path>, policy: &RetryPolicy) -> Result<PipeStream> {
    let path = path.as_ref();
    let start = Instant::now();
    let mut attempt: u64 = 0;

    info!(?path, "beginning stage pipe connection");
    loop {
        attempt += 1;
        match connect(path) {
            Ok(stream) => {
                info!(?path, attempt, "connection established");
                return Ok(stream);
            }
            Err(TransportError::Connect { source, .. }) if is_not_ready(&source) => {
                let waited = start.elapsed();
                if policy.exhausted(waited) {
                    return Err(TransportError::ConnectTimeout {
                        path: path.to_path_buf(),
                        waited,
                    });
                }
                info!(?path, attempt, error = %source, "waiting for connection");

                let sleep = match policy.max_wait {
                    Some(max) => policy.backoff.min(max.saturating_sub(waited)),
                    None => policy.backoff,
                };
                std::thread::sleep(sleep);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Returns true if a connect error means the server has not started listening yet.
pub fn is_not_ready(err: &std::io::Error) -> bool {
    #[cfg(windows)]
    if err.raw_os_error() == Some(ERROR_PIPE_BUSY) {
        return true;
    }

    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
    )
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::time::Duration;

    use super::*;
    use crate::uds::PipeListener;

    fn unique_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "vastlink-connect-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn not_ready_classification() {
        assert!(is_not_ready(&std::io::Error::from(
            std::io::ErrorKind::NotFound
        )));
        assert!(is_not_ready(&std::io::Error::from(
            std::io::ErrorKind::ConnectionRefused
        )));
        assert!(!is_not_ready(&std::io::Error::from(
            std::io::ErrorKind::PermissionDenied
        )));
    }

    #[test]
    fn bounded_retry_times_out() {
        let dir = unique_dir("timeout");
        let sock_path = dir.join("missing.sock");

        let policy = RetryPolicy::bounded(Duration::from_millis(10), Duration::from_millis(50));
        let err = connect_with_retry(&sock_path, &policy).unwrap_err();
        assert!(matches!(err, TransportError::ConnectTimeout { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn retry_connects_once_listener_appears() {
        let dir = unique_dir("late");
        let sock_path = dir.join("late.sock");

        let path_clone = sock_path.clone();
        let server = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            let listener = PipeListener::bind(&path_clone).unwrap();
            let mut stream = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"busy");
        });

        let policy = RetryPolicy::bounded(Duration::from_millis(10), Duration::from_secs(5));
        let mut stream = connect_with_retry(&sock_path, &policy).unwrap();
        stream.write_all(b"busy").unwrap();

        server.join().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn hard_errors_are_not_retried() {
        let dir = unique_dir("hard");
        let file = dir.join("regular-file");
        std::fs::write(&file, b"not a directory").unwrap();
        let sock_path = file.join("nested.sock");

        let policy = RetryPolicy::forever();
        let err = connect_with_retry(&sock_path, &policy).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
