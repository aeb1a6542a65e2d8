use displaydoc::Display;
use thiserror::Error;

#[derive(Debug, Error, Display)]
#[non_exhaustive]
/// Errors raised while framing or decoding protocol messages
pub enum ProtocolError {
    /// bad frame magic {found:#010x}
    BadMagic {
        /// the magic actually read
        found: u32,
    },
    /// unsupported message version {found} (this build speaks version {expected})
    BadVersion {
        /// version found in the frame header
        found: u8,
        /// version this build understands
        expected: u8,
    },
    /// frame payload of {length} bytes exceeds the {limit} byte cap
    PayloadTooLarge {
        /// declared payload length
        length: u32,
        /// hard payload cap
        limit: u32,
    },
    /// unknown message type {found:#04x}
    UnknownMsgType {
        /// the unrecognized tag
        found: u8,
    },
    /// message payload ended prematurely
    TruncatedPayload,
    /// I/O error
    Io(#[from] std::io::Error),
}
