//! Length-prefixed message framing for the VAST stage pipe.
//!
//! Every message, in both directions, is framed as:
//! - A 4-byte little-endian payload length
//! - The payload itself (ASCII text, no terminator)
//!
//! There is no magic, checksum or channel id; integrity relies on the peer.

mod codec;
mod error;
mod reader;
mod writer;

pub use codec::{
    check_ascii, decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
