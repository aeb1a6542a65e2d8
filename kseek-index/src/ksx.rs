//! `.ksx` sequence-metadata files: lengths and accessions per oid.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::errors::IndexError;
use crate::format::{
    check_magic_version, u32_at, KSX_FORMAT_VERSION, KSX_HEADER_LEN, KSX_MAGIC,
};
use crate::mmap::MmapFile;

/// Memory-mapped `.ksx` reader.
///
/// Layout after the header: `seq_length[N]` (u32), `acc_offset[N+1]` (u32),
/// then the concatenated accession bytes without terminators. Accession
/// lookup is random-access (driven by search results), so the mapping is
/// advised accordingly.
pub struct KsxReader {
    file: MmapFile,
    num_sequences: u32,
    lengths_pos: usize,
    acc_offsets_pos: usize,
    acc_strings_pos: usize,
}

impl KsxReader {
    pub fn open(path: &Path) -> Result<KsxReader, IndexError> {
        let file = MmapFile::open(path)?;
        let data = file.data();
        check_magic_version(data, path, KSX_MAGIC, "ksx", KSX_FORMAT_VERSION, KSX_HEADER_LEN)?;

        let num_sequences = u32_at(data, 8);
        let n = num_sequences as usize;
        let lengths_pos = KSX_HEADER_LEN;
        let acc_offsets_pos = lengths_pos + 4 * n;
        let acc_strings_pos = acc_offsets_pos + 4 * (n + 1);
        if data.len() < acc_strings_pos {
            return Err(IndexError::Truncated { path: path.display().to_string() });
        }

        let blob_len = data.len() - acc_strings_pos;
        let declared = u32_at(data, acc_offsets_pos + 4 * n) as usize;
        if declared != blob_len {
            return Err(IndexError::Invariant {
                detail: format!(
                    "ksx '{}': accession blob is {} bytes but the offset table ends at {}",
                    path.display(),
                    blob_len,
                    declared
                ),
            });
        }

        file.advise_random();

        Ok(KsxReader { file, num_sequences, lengths_pos, acc_offsets_pos, acc_strings_pos })
    }

    pub fn num_sequences(&self) -> u32 {
        self.num_sequences
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Length in bases of sequence `oid`.
    #[inline]
    pub fn seq_length(&self, oid: u32) -> u32 {
        u32_at(self.file.data(), self.lengths_pos + 4 * oid as usize)
    }

    /// Accession of sequence `oid`. Malformed entries come back empty.
    pub fn accession(&self, oid: u32) -> &str {
        let data = self.file.data();
        let start = u32_at(data, self.acc_offsets_pos + 4 * oid as usize) as usize;
        let end = u32_at(data, self.acc_offsets_pos + 4 * (oid as usize + 1)) as usize;
        if start > end || self.acc_strings_pos + end > data.len() {
            return "";
        }
        std::str::from_utf8(&data[self.acc_strings_pos + start..self.acc_strings_pos + end])
            .unwrap_or("")
    }
}

/// Accumulates per-sequence metadata and writes a `.ksx` file.
///
/// Sequences must be added in oid order.
#[derive(Default)]
pub struct KsxWriter {
    seq_lengths: Vec<u32>,
    accessions: Vec<String>,
}

impl KsxWriter {
    pub fn new() -> KsxWriter {
        KsxWriter::default()
    }

    pub fn add_sequence(&mut self, seq_length: u32, accession: &str) {
        self.seq_lengths.push(seq_length);
        self.accessions.push(accession.to_string());
    }

    pub fn num_sequences(&self) -> u32 {
        self.seq_lengths.len() as u32
    }

    pub fn write(&self, path: &Path) -> Result<(), IndexError> {
        let mut out = BufWriter::new(File::create(path)?);

        out.write_all(KSX_MAGIC)?;
        out.write_u16::<LittleEndian>(KSX_FORMAT_VERSION)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.num_sequences())?;
        out.write_all(&[0u8; 20])?;

        for &len in &self.seq_lengths {
            out.write_u32::<LittleEndian>(len)?;
        }

        let mut offset = 0u32;
        for acc in &self.accessions {
            out.write_u32::<LittleEndian>(offset)?;
            offset += acc.len() as u32;
        }
        out.write_u32::<LittleEndian>(offset)?;

        for acc in &self.accessions {
            out.write_all(acc.as_bytes())?;
        }

        out.flush()?;
        Ok(())
    }
}
