//! The 12-byte frame envelope.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::ProtocolError;

/// Frame magic: `"IKSV"` read as a little-endian u32.
pub const FRAME_MAGIC: u32 = 0x5653_4B49;

/// Hard cap on a frame payload.
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Bytes in the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Protocol revision carried in every frame.
pub const MSG_VERSION: u8 = 3;

/// One-byte message tags; requests sit below `0x80`, responses above.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    SearchRequest = 0x01,
    InfoRequest = 0x02,
    HealthRequest = 0x03,
    SearchResponse = 0x81,
    InfoResponse = 0x82,
    HealthResponse = 0x83,
    ErrorResponse = 0xFF,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<MsgType> {
        match v {
            0x01 => Some(MsgType::SearchRequest),
            0x02 => Some(MsgType::InfoRequest),
            0x03 => Some(MsgType::HealthRequest),
            0x81 => Some(MsgType::SearchResponse),
            0x82 => Some(MsgType::InfoResponse),
            0x83 => Some(MsgType::HealthResponse),
            0xFF => Some(MsgType::ErrorResponse),
            _ => None,
        }
    }
}

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_length: u32,
    pub msg_type: MsgType,
    pub msg_version: u8,
}

/// Writes one frame: header plus payload.
pub fn write_frame<W: Write>(
    out: &mut W,
    msg_type: MsgType,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    if payload.len() as u64 > u64::from(MAX_PAYLOAD_SIZE) {
        return Err(ProtocolError::PayloadTooLarge {
            length: payload.len() as u32,
            limit: MAX_PAYLOAD_SIZE,
        });
    }
    out.write_u32::<LittleEndian>(FRAME_MAGIC)?;
    out.write_u32::<LittleEndian>(payload.len() as u32)?;
    out.write_u8(msg_type as u8)?;
    out.write_u8(MSG_VERSION)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_all(payload)?;
    Ok(())
}

/// Reads one frame, validating magic, version and the payload cap.
pub fn read_frame<R: Read>(input: &mut R) -> Result<(FrameHeader, Vec<u8>), ProtocolError> {
    let magic = input.read_u32::<LittleEndian>()?;
    if magic != FRAME_MAGIC {
        return Err(ProtocolError::BadMagic { found: magic });
    }
    let payload_length = input.read_u32::<LittleEndian>()?;
    let type_byte = input.read_u8()?;
    let msg_version = input.read_u8()?;
    let _reserved = input.read_u16::<LittleEndian>()?;

    if msg_version != MSG_VERSION {
        return Err(ProtocolError::BadVersion { found: msg_version, expected: MSG_VERSION });
    }
    if payload_length > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            length: payload_length,
            limit: MAX_PAYLOAD_SIZE,
        });
    }
    let msg_type =
        MsgType::from_u8(type_byte).ok_or(ProtocolError::UnknownMsgType { found: type_byte })?;

    let mut payload = vec![0u8; payload_length as usize];
    input.read_exact(&mut payload)?;
    Ok((FrameHeader { payload_length, msg_type, msg_version }, payload))
}
