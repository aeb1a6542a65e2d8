//! Reader for `.kpx` files: the position blob parallel to `.kix`.

use std::path::Path;

use kseek_core::types::table_size;

use crate::errors::IndexError;
use crate::format::{
    check_magic_version, u64_at, KPX_FORMAT_VERSION, KPX_HEADER_LEN, KPX_MAGIC,
};
use crate::mmap::MmapFile;

/// Memory-mapped `.kpx` position index.
///
/// Must be decoded in lockstep with the corresponding `.kix` stream: when the
/// id delta is zero the position varint is a delta from the previous
/// position, otherwise it is the absolute first position of a new oid run.
pub struct KpxReader {
    file: MmapFile,
    k: usize,
    total_postings: u64,
    table_size: u64,
    offsets_pos: usize,
    postings_pos: usize,
}

impl KpxReader {
    pub fn open(path: &Path) -> Result<KpxReader, IndexError> {
        let file = MmapFile::open(path)?;
        let data = file.data();
        check_magic_version(data, path, KPX_MAGIC, "kpx", KPX_FORMAT_VERSION, KPX_HEADER_LEN)?;

        let k = data[8] as usize;
        let total_postings = u64_at(data, 16);
        if !(kseek_core::types::MIN_K..=kseek_core::types::MAX_K).contains(&k) {
            return Err(IndexError::Invariant {
                detail: format!("kpx '{}' declares k={}", path.display(), k),
            });
        }

        let ts = table_size(k);
        let offsets_pos = KPX_HEADER_LEN;
        let postings_pos = offsets_pos + 8 * ts as usize;
        if data.len() < postings_pos {
            return Err(IndexError::Truncated { path: path.display().to_string() });
        }

        Ok(KpxReader { file, k, total_postings, table_size: ts, offsets_pos, postings_pos })
    }

    pub fn k(&self) -> usize { self.k }
    pub fn total_postings(&self) -> u64 { self.total_postings }
    pub fn table_size(&self) -> u64 { self.table_size }
    pub fn path(&self) -> &Path { self.file.path() }

    /// Byte offset of a k-mer's position postings within the blob.
    #[inline]
    pub fn pos_offset(&self, kmer: u64) -> u64 {
        u64_at(self.file.data(), self.offsets_pos + 8 * kmer as usize)
    }

    /// The whole delta-varint position blob.
    #[inline]
    pub fn posting_data(&self) -> &[u8] {
        &self.file.data()[self.postings_pos..]
    }
}
