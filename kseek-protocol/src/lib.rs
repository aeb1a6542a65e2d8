//! Binary envelope and message codec for `kseek` search services.
//!
//! The boundary protocol is a 12-byte little-endian frame header (magic,
//! payload length, message type, message version) followed by a message
//! payload. Payload serializers append forward-compatible extension fields at
//! the end; readers tolerate and ignore trailing bytes they do not know.

mod errors;
pub mod frame;
pub mod messages;
pub mod wire;

pub use errors::ProtocolError;
pub use frame::{read_frame, write_frame, FrameHeader, MsgType, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
