//! Reader for `.kix` files: k-mer value → delta-varint oid postings.

use std::path::Path;

use kseek_core::types::table_size;

use crate::errors::IndexError;
use crate::format::{
    check_magic_version, decode_db_name, u32_at, u64_at, KIX_FORMAT_VERSION, KIX_HEADER_LEN,
    KIX_MAGIC,
};
use crate::mmap::MmapFile;

/// Memory-mapped `.kix` volume index.
///
/// The body holds `offset[4^k]` (u64), `count[4^k]` (u32) and the id blob.
/// For a k-mer with count `c`, decoding `c` varints starting at its offset
/// yields oid deltas: the first value is absolute, zero means "same oid,
/// another position", anything else is the difference to the previous oid.
pub struct KixReader {
    file: MmapFile,
    k: usize,
    kmer_type: u8,
    num_sequences: u32,
    total_postings: u64,
    db_name: String,
    table_size: u64,
    offsets_pos: usize,
    counts_pos: usize,
    postings_pos: usize,
}

impl KixReader {
    pub fn open(path: &Path) -> Result<KixReader, IndexError> {
        let file = MmapFile::open(path)?;
        let data = file.data();
        check_magic_version(data, path, KIX_MAGIC, "kix", KIX_FORMAT_VERSION, KIX_HEADER_LEN)?;

        let k = data[8] as usize;
        let kmer_type = data[9];
        let num_sequences = u32_at(data, 12);
        let total_postings = u64_at(data, 16);
        let db_name = decode_db_name(&data[24..24 + 32]);

        if !(kseek_core::types::MIN_K..=kseek_core::types::MAX_K).contains(&k) {
            return Err(IndexError::Invariant {
                detail: format!("kix '{}' declares k={}", path.display(), k),
            });
        }

        let ts = table_size(k);
        let offsets_pos = KIX_HEADER_LEN;
        let counts_pos = offsets_pos + 8 * ts as usize;
        let postings_pos = counts_pos + 4 * ts as usize;
        if data.len() < postings_pos {
            return Err(IndexError::Truncated { path: path.display().to_string() });
        }

        Ok(KixReader {
            file,
            k,
            kmer_type,
            num_sequences,
            total_postings,
            db_name,
            table_size: ts,
            offsets_pos,
            counts_pos,
            postings_pos,
        })
    }

    pub fn k(&self) -> usize { self.k }
    pub fn kmer_type(&self) -> u8 { self.kmer_type }
    pub fn num_sequences(&self) -> u32 { self.num_sequences }
    pub fn total_postings(&self) -> u64 { self.total_postings }
    pub fn db_name(&self) -> &str { &self.db_name }
    pub fn table_size(&self) -> u64 { self.table_size }
    pub fn path(&self) -> &Path { self.file.path() }

    /// Byte offset of a k-mer's id postings within the blob.
    #[inline]
    pub fn posting_offset(&self, kmer: u64) -> u64 {
        u64_at(self.file.data(), self.offsets_pos + 8 * kmer as usize)
    }

    /// Number of postings stored for a k-mer.
    #[inline]
    pub fn posting_count(&self, kmer: u64) -> u32 {
        u32_at(self.file.data(), self.counts_pos + 4 * kmer as usize)
    }

    /// The whole delta-varint id blob.
    #[inline]
    pub fn posting_data(&self) -> &[u8] {
        &self.file.data()[self.postings_pos..]
    }
}
