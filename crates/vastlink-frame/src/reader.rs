use std::io::Read;

use vastlink_transport::PipeStream;

use crate::codec::{Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Blocking frame reader.
///
/// Each call reads exactly one length header and then exactly that many
/// payload bytes. Nothing is buffered between frames, so a reader can be
/// dropped after any complete frame without losing data.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Block until one whole frame has arrived.
    ///
    /// End of stream before or inside a frame is
    /// [`FrameError::ConnectionClosed`]. A declared length above the
    /// configured maximum is rejected before any payload is read.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; HEADER_SIZE];
        self.inner
            .read_exact(&mut header)
            .map_err(FrameError::from_io)?;

        let len = u32::from_le_bytes(header) as usize;
        if len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }

        let mut payload = vec![0u8; len];
        self.inner
            .read_exact(&mut payload)
            .map_err(FrameError::from_io)?;
        tracing::trace!(len, "frame received");
        Ok(Frame::new(payload))
    }

    /// [`Self::read_frame`], decoded as ASCII.
    pub fn read_text(&mut self) -> Result<String> {
        self.read_frame()?.to_text()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<PipeStream> {
    /// Like [`FrameReader::with_config`], also applying `config.read_timeout`
    /// to the pipe.
    pub fn with_config_pipe(inner: PipeStream, config: FrameConfig) -> Result<Self> {
        if config.read_timeout.is_some() {
            inner.set_read_timeout(config.read_timeout)?;
        }
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    /// Hands out at most `step` bytes per read, with an `Interrupted`
    /// error before every chunk.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
        interrupt_next: bool,
    }

    impl Trickle {
        fn new(data: Vec<u8>, step: usize) -> Self {
            Self {
                data: Cursor::new(data),
                step,
                interrupt_next: true,
            }
        }
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if std::mem::take(&mut self.interrupt_next) {
                return Err(ErrorKind::Interrupted.into());
            }
            self.interrupt_next = true;
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn idle_status_from_wire_bytes() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x01, 0x00, 0x00, 0x00, 0x30]));
        assert_eq!(reader.read_text().unwrap(), "0");
    }

    #[test]
    fn consecutive_busy_replies() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"1", b"1", b"0"])));
        let statuses: Vec<String> = (0..3).map(|_| reader.read_text().unwrap()).collect();
        assert_eq!(statuses, ["1", "1", "0"]);
    }

    #[test]
    fn empty_payload_is_a_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"", b"D:\\run"])));
        assert!(reader.read_frame().unwrap().is_empty());
        assert_eq!(reader.read_text().unwrap(), "D:\\run");
    }

    #[test]
    fn survives_short_and_interrupted_reads() {
        let mut reader = FrameReader::new(Trickle::new(wire(&[b"1200,-400,0"]), 3));
        assert_eq!(reader.read_text().unwrap(), "1200,-400,0");
    }

    #[test]
    fn eof_anywhere_is_connection_closed() {
        let full = wire(&[b"autostore"]);
        for cut in [0, 2, HEADER_SIZE, full.len() - 1] {
            let mut reader = FrameReader::new(Cursor::new(full[..cut].to_vec()));
            assert!(
                matches!(reader.read_frame(), Err(FrameError::ConnectionClosed)),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn declared_length_over_limit_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader =
            FrameReader::with_config(Cursor::new(1024u32.to_le_bytes().to_vec()), cfg);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::PayloadTooLarge { size: 1024, .. })
        ));
    }

    #[test]
    fn high_bytes_fail_text_decode() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[&[b'1', 0xB0]])));
        let Err(FrameError::NotAscii { byte, offset }) = reader.read_text() else {
            panic!("expected NotAscii");
        };
        assert_eq!((byte, offset), (0xB0, 1));
    }

    #[test]
    #[cfg(unix)]
    fn pipe_read_timeout_applies() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let pipe = PipeStream::from_unix(left);
        let mut reader = FrameReader::with_config_pipe(pipe, cfg).unwrap();
        let Err(FrameError::Io(err)) = reader.read_frame() else {
            panic!("expected a read timeout");
        };
        let kind = err.kind();
        let timed_out = matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut);
        assert!(timed_out, "unexpected {kind:?}");
    }
}
