//! Fixed header layouts shared by the readers and the builder.
//!
//! All multi-byte integers in every index file are little-endian.

use byteorder::{ByteOrder, LittleEndian};

use crate::errors::IndexError;

pub const KIX_MAGIC: &[u8; 4] = b"KMIX";
pub const KPX_MAGIC: &[u8; 4] = b"KMPX";
pub const KSX_MAGIC: &[u8; 4] = b"KMSX";
pub const KHX_MAGIC: &[u8; 4] = b"KMHX";

pub const KIX_FORMAT_VERSION: u16 = 1;
pub const KPX_FORMAT_VERSION: u16 = 1;
pub const KSX_FORMAT_VERSION: u16 = 1;
pub const KHX_FORMAT_VERSION: u16 = 1;

/// kix: magic(4) version(2) reserved(2) k(1) kmer_type(1) reserved(2)
///      num_sequences(4) total_postings(8) db_name(32, NUL padded)
pub const KIX_HEADER_LEN: usize = 56;
/// kpx: magic(4) version(2) reserved(2) k(1) reserved(7) total_postings(8)
pub const KPX_HEADER_LEN: usize = 24;
/// ksx: magic(4) version(2) reserved(2) num_sequences(4) reserved(20)
pub const KSX_HEADER_LEN: usize = 32;
/// khx: magic(4) version(2) k(1)
pub const KHX_HEADER_LEN: usize = 7;

/// Width of the NUL-padded database name field in the kix header.
pub const DB_NAME_LEN: usize = 32;

#[inline]
pub fn u16_at(data: &[u8], off: usize) -> u16 {
    LittleEndian::read_u16(&data[off..off + 2])
}

#[inline]
pub fn u32_at(data: &[u8], off: usize) -> u32 {
    LittleEndian::read_u32(&data[off..off + 4])
}

#[inline]
pub fn u64_at(data: &[u8], off: usize) -> u64 {
    LittleEndian::read_u64(&data[off..off + 8])
}

/// Checks magic and format version of a mapped header, the shared prologue of
/// every reader's `open`.
pub fn check_magic_version(
    data: &[u8],
    path: &std::path::Path,
    magic: &[u8; 4],
    expected_kind: &'static str,
    expected_version: u16,
    header_len: usize,
) -> Result<(), IndexError> {
    if data.len() < header_len {
        return Err(IndexError::Truncated { path: path.display().to_string() });
    }
    if &data[0..4] != magic {
        return Err(IndexError::BadMagic {
            path: path.display().to_string(),
            expected: expected_kind,
        });
    }
    let found = u16_at(data, 4);
    if found != expected_version {
        return Err(IndexError::BadVersion {
            path: path.display().to_string(),
            found,
            expected: expected_version,
        });
    }
    Ok(())
}

/// Encodes the NUL-padded db-name field, truncating over-long names.
pub fn encode_db_name(name: &str) -> [u8; DB_NAME_LEN] {
    let mut field = [0u8; DB_NAME_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(DB_NAME_LEN);
    field[..n].copy_from_slice(&bytes[..n]);
    field
}

/// Decodes the NUL-padded db-name field.
pub fn decode_db_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
