use std::io::Write;

use bytes::BytesMut;
use vastlink_transport::PipeStream;

use crate::codec::{check_ascii, encode_frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Blocking frame writer.
///
/// Header and payload are encoded into one scratch buffer and handed to
/// the stream with a single `write_all`, then flushed. The scratch buffer
/// is reused across frames.
pub struct FrameWriter<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            scratch: BytesMut::with_capacity(HEADER_SIZE + 64),
            config,
        }
    }

    /// Write one frame carrying `payload` and flush.
    ///
    /// A stream that stops accepting bytes is
    /// [`FrameError::ConnectionClosed`].
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.scratch.clear();
        encode_frame(payload, &mut self.scratch)?;
        self.inner
            .write_all(&self.scratch)
            .map_err(FrameError::from_io)?;
        self.inner.flush().map_err(FrameError::from_io)
    }

    /// Send an ASCII command. Non-ASCII text is refused before any byte is written.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        check_ascii(text.as_bytes())?;
        tracing::trace!(payload = text, "frame sent");
        self.send(text.as_bytes())
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<PipeStream> {
    /// Like [`FrameWriter::with_config`], also applying `config.write_timeout`
    /// to the pipe.
    pub fn with_config_pipe(inner: PipeStream, config: FrameConfig) -> Result<Self> {
        if config.write_timeout.is_some() {
            inner.set_write_timeout(config.write_timeout)?;
        }
        Ok(Self::with_config(inner, config))
    }
}
