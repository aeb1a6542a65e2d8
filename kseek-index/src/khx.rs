//! `.khx` files: the shared bitset of k-mers excluded at build time.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use kseek_core::types::table_size;

use crate::errors::IndexError;
use crate::format::{
    check_magic_version, KHX_FORMAT_VERSION, KHX_HEADER_LEN, KHX_MAGIC,
};
use crate::mmap::MmapFile;

/// Memory-mapped `.khx` reader. Bit `m` set means k-mer `m` was dropped from
/// every volume because its cross-volume count exceeded the build threshold.
pub struct KhxReader {
    file: MmapFile,
    k: usize,
    table_size: u64,
}

impl KhxReader {
    pub fn open(path: &Path) -> Result<KhxReader, IndexError> {
        let file = MmapFile::open(path)?;
        let data = file.data();
        check_magic_version(data, path, KHX_MAGIC, "khx", KHX_FORMAT_VERSION, KHX_HEADER_LEN)?;

        let k = data[6] as usize;
        let ts = table_size(k);
        let needed = KHX_HEADER_LEN + ((ts + 7) / 8) as usize;
        if data.len() < needed {
            return Err(IndexError::Truncated { path: path.display().to_string() });
        }

        Ok(KhxReader { file, k, table_size: ts })
    }

    pub fn k(&self) -> usize { self.k }
    pub fn table_size(&self) -> u64 { self.table_size }

    /// Was this k-mer excluded during the index build?
    #[inline]
    pub fn is_excluded(&self, kmer: u64) -> bool {
        let byte = self.file.data()[KHX_HEADER_LEN + (kmer / 8) as usize];
        (byte >> (kmer % 8)) & 1 != 0
    }

    /// Total number of excluded k-mers.
    pub fn count_excluded(&self) -> u64 {
        self.file.data()[KHX_HEADER_LEN..]
            .iter()
            .map(|b| b.count_ones() as u64)
            .sum()
    }
}

/// Builds the exclusion bitset in memory and writes it as a `.khx` file.
pub struct KhxWriter {
    k: usize,
    bits: Vec<u8>,
}

impl KhxWriter {
    pub fn new(k: usize) -> KhxWriter {
        let ts = table_size(k);
        KhxWriter { k, bits: vec![0u8; ((ts + 7) / 8) as usize] }
    }

    #[inline]
    pub fn set(&mut self, kmer: u64) {
        self.bits[(kmer / 8) as usize] |= 1 << (kmer % 8);
    }

    #[inline]
    pub fn is_set(&self, kmer: u64) -> bool {
        (self.bits[(kmer / 8) as usize] >> (kmer % 8)) & 1 != 0
    }

    pub fn write(&self, path: &Path) -> Result<(), IndexError> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(KHX_MAGIC)?;
        out.write_u16::<LittleEndian>(KHX_FORMAT_VERSION)?;
        out.write_u8(self.k as u8)?;
        out.write_all(&self.bits)?;
        out.flush()?;
        Ok(())
    }
}
