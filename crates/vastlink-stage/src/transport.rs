use std::io::{Read, Write};

use tracing::debug;
use vastlink_frame::{FrameConfig, FrameReader, FrameWriter};
use vastlink_transport::PipeStream;

use crate::command::Command;
use crate::error::Result;

/// A stream that can hand out a second handle to the same connection.
pub trait DuplexStream: Read + Write + Sized {
    fn try_clone_handle(&self) -> Result<Self>;
}

impl DuplexStream for PipeStream {
    fn try_clone_handle(&self) -> Result<Self> {
        Ok(self.try_clone()?)
    }
}

/// Request/response exchange over one duplex stream.
///
/// `S` is split into a read half and a write half up front; for a
/// [`PipeStream`] both halves are handles to the same pipe.
pub struct Transport<S> {
    reader: FrameReader<S>,
    writer: FrameWriter<S>,
}

impl<S: Read + Write> Transport<S> {
    /// Build a transport from the two halves of one connection.
    pub fn new(read_half: S, write_half: S, config: FrameConfig) -> Self {
        Self {
            reader: FrameReader::with_config(read_half, config.clone()),
            writer: FrameWriter::with_config(write_half, config),
        }
    }

    /// Build a transport from one connection, cloning a handle for reads.
    pub fn split(stream: S, config: FrameConfig) -> Result<Self>
    where
        S: DuplexStream,
    {
        let read_half = stream.try_clone_handle()?;
        Ok(Self::new(read_half, stream, config))
    }

    /// Send one message and block until its response frame arrives.
    ///
    /// Returns `None` when the peer answers with an empty payload.
    pub fn send_text(&mut self, message: &str) -> Result<Option<String>> {
        self.writer.send_text(message)?;
        let response = self.reader.read_text()?;
        debug!(request = message, response = %response, "stage exchange");
        Ok((!response.is_empty()).then_some(response))
    }

    /// Send one command and block until its response frame arrives.
    pub fn send(&mut self, command: &Command) -> Result<Option<String>> {
        self.send_text(&command.encode())
    }
}

impl Transport<PipeStream> {
    /// Split a connected pipe into a transport, applying timeouts from `config`.
    pub fn from_pipe(stream: PipeStream, config: FrameConfig) -> Result<Self> {
        let read_half = stream.try_clone_handle()?;
        Ok(Self {
            reader: FrameReader::with_config_pipe(read_half, config.clone())?,
            writer: FrameWriter::with_config_pipe(stream, config)?,
        })
    }

    /// Shut the pipe down so the peer sees end-of-stream.
    pub fn shutdown(&self) -> Result<()> {
        self.writer.get_ref().shutdown()?;
        Ok(())
    }
}
