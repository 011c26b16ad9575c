use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Bytes in the length prefix.
pub const HEADER_SIZE: usize = 4;

/// 16 MiB. Real stage traffic is a few dozen bytes; the cap only guards
/// against a corrupt length prefix.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 << 20;

/// One message exchanged with the stage-control process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Bytes this frame occupies on the pipe, prefix included.
    pub fn wire_size(&self) -> usize {
        self.payload.len() + HEADER_SIZE
    }

    /// The stage answers some commands with a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as text. Fails on the first byte above 0x7f.
    pub fn to_text(&self) -> Result<String> {
        check_ascii(&self.payload)?;
        Ok(self.payload.iter().map(|&b| b as char).collect())
    }
}

/// Fails with the first non-ASCII byte and its offset.
pub fn check_ascii(bytes: &[u8]) -> Result<()> {
    if let Some((offset, &byte)) = bytes.iter().enumerate().find(|(_, b)| !b.is_ascii()) {
        return Err(FrameError::NotAscii { byte, offset });
    }
    Ok(())
}

/// Append `payload` to `dst` with its length prefix.
///
/// ```text
/// offset 0        4
///        +--------+---------------------+
///        | len    | payload (len bytes) |
///        | u32 LE | ASCII, unterminated |
///        +--------+---------------------+
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let Ok(len) = u32::try_from(payload.len()) else {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    };
    dst.reserve(payload.len() + HEADER_SIZE);
    dst.put_u32_le(len);
    dst.extend_from_slice(payload);
    Ok(())
}

/// Split one frame off the front of `src`.
///
/// Leaves `src` untouched and yields `Ok(None)` while the frame is still
/// partial. An oversized length prefix is reported as soon as the prefix
/// itself is complete.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(head) = src.get(..HEADER_SIZE) else {
        return Ok(None);
    };
    let mut prefix = [0u8; HEADER_SIZE];
    prefix.copy_from_slice(head);
    let len = u32::from_le_bytes(prefix) as usize;
    if len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: max_payload,
        });
    }
    if src.len() - HEADER_SIZE < len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(Frame::new(src.split_to(len).freeze())))
}

/// Limits and timeouts shared by [`crate::FrameReader`] and [`crate::FrameWriter`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub max_payload_size: usize,
    /// Applied to the pipe by `with_config_pipe`; `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(buf: &mut BytesMut) -> Option<Frame> {
        decode_frame(buf, DEFAULT_MAX_PAYLOAD).unwrap()
    }

    #[test]
    fn busy_request_wire_bytes() {
        let mut buf = BytesMut::new();
        encode_frame(b"busy", &mut buf).unwrap();
        assert_eq!(&buf[..], b"\x04\x00\x00\x00busy");
    }

    #[test]
    fn idle_response_wire_bytes() {
        let mut buf = BytesMut::from(&b"\x01\x00\x00\x000"[..]);
        assert_eq!(take(&mut buf).unwrap().to_text().unwrap(), "0");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_prefix_left_in_place() {
        let mut buf = BytesMut::from(&b"\x04\x00\x00"[..]);
        assert!(take(&mut buf).is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn partial_payload_left_in_place() {
        let mut buf = BytesMut::new();
        encode_frame(b"mabs,0,10,20", &mut buf).unwrap();
        let whole = buf.len();
        let tail = buf.split_off(HEADER_SIZE + 2);

        assert!(take(&mut buf).is_none());
        buf.unsplit(tail);
        assert_eq!(buf.len(), whole);
        assert_eq!(take(&mut buf).unwrap().payload, "mabs,0,10,20");
    }

    #[test]
    fn oversized_prefix_rejected_before_payload_arrives() {
        let mut buf = BytesMut::from(&300u32.to_le_bytes()[..]);
        let err = decode_frame(&mut buf, 255).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 300, .. }));
    }

    #[test]
    fn length_prefix_is_little_endian() {
        let payload = vec![b'x'; 0x0102];
        let mut buf = BytesMut::new();
        encode_frame(&payload, &mut buf).unwrap();
        assert_eq!(&buf[..HEADER_SIZE], &[0x02, 0x01, 0x00, 0x00]);
        assert_eq!(take(&mut buf).unwrap().payload.len(), 0x0102);
    }

    #[test]
    fn move_then_busy_in_one_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(b"rot,62", &mut buf).unwrap();
        encode_frame(b"busy", &mut buf).unwrap();

        assert_eq!(take(&mut buf).unwrap().payload, "rot,62");
        assert_eq!(take(&mut buf).unwrap().payload, "busy");
        assert!(take(&mut buf).is_none());
    }

    #[test]
    fn zero_length_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        assert_eq!(&buf[..], &[0u8; 4]);

        let frame = take(&mut buf).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.wire_size(), HEADER_SIZE);
        assert_eq!(frame.to_text().unwrap(), "");
    }

    #[test]
    fn utf8_payload_is_not_ascii() {
        let frame = Frame::new("ok\u{e9}".as_bytes().to_vec());
        let Err(FrameError::NotAscii { byte, offset }) = frame.to_text() else {
            panic!("expected NotAscii");
        };
        assert_eq!((byte, offset), (0xC3, 2));
    }
}
