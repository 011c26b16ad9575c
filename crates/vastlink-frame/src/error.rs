#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A length prefix or outgoing payload above the configured cap.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("non-ASCII byte 0x{byte:02x} at offset {offset}")]
    NotAscii { byte: u8, offset: usize },

    #[error("pipe I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The peer went away, either between frames or part way through one.
    #[error("stage pipe closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Map an I/O error from a blocking read or write. A stream that ends
    /// mid-frame, or stops accepting bytes, counts as closed.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::WriteZero => {
                FrameError::ConnectionClosed
            }
            _ => FrameError::Io(err),
        }
    }
}

impl From<vastlink_transport::TransportError> for FrameError {
    fn from(err: vastlink_transport::TransportError) -> Self {
        use vastlink_transport::TransportError;
        match err {
            TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                FrameError::Io(source)
            }
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
