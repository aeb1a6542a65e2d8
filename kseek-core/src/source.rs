//! The reference-base boundary of the toolkit.
//!
//! The index builder and the alignment stage never parse database files
//! themselves; they consume a [`SequenceSource`] that yields 2-bit packed
//! bases with explicit ambiguity runs. [`MemorySource`] is the bundled
//! implementation, fed from parsed records; `kseek-io` builds one from FASTA.

use crate::errors::SourceError;
use crate::kmer::{ambiguity_mask, encode_base, BASE_ENCODE_INVALID};
use crate::types::SeqId;

/// A maximal run of ambiguous positions sharing one IUPAC base-set mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmbiguityRun {
    pub start: u32,
    pub len: u32,
    /// 4-bit base set over `{A=1, C=2, G=4, T=8}`
    pub mask: u8,
}

impl AmbiguityRun {
    /// One past the last covered position.
    #[inline]
    pub fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// One reference sequence in packed form.
#[derive(Clone, Debug, Default)]
pub struct PackedSequence {
    /// 2-bit codes, four bases per byte, first base in the high bits.
    /// Ambiguous positions hold an arbitrary placeholder code.
    pub packed: Vec<u8>,
    /// Sorted, non-overlapping ambiguity runs.
    pub ambiguity: Vec<AmbiguityRun>,
    /// Number of bases.
    pub length: u32,
}

impl PackedSequence {
    /// Packs a plain-text sequence. IUPAC ambiguity codes become runs; any
    /// other non-`ACGT` character is treated as `N`.
    pub fn from_text(seq: &str) -> PackedSequence {
        let bytes = seq.as_bytes();
        let mut packed = vec![0u8; (bytes.len() + 3) / 4];
        let mut ambiguity: Vec<AmbiguityRun> = Vec::new();

        for (i, &c) in bytes.iter().enumerate() {
            let code = encode_base(c);
            if code != BASE_ENCODE_INVALID {
                packed[i / 4] |= code << (6 - 2 * (i % 4));
                continue;
            }
            let mask = match ambiguity_mask(c) {
                0 => 0b1111, // unknown letters degrade to N
                m => m,
            };
            match ambiguity.last_mut() {
                Some(run) if run.end() == i as u32 && run.mask == mask => run.len += 1,
                _ => ambiguity.push(AmbiguityRun { start: i as u32, len: 1, mask }),
            }
        }

        PackedSequence { packed, ambiguity, length: bytes.len() as u32 }
    }
}

/// Read access to one volume's reference sequences.
///
/// Implementations must be shareable across the searcher's worker threads.
pub trait SequenceSource: Send + Sync {
    /// Number of sequences in this volume.
    fn num_sequences(&self) -> u32;

    /// Length in bases of sequence `oid`.
    fn sequence_length(&self, oid: SeqId) -> u32;

    /// Primary accession of sequence `oid`.
    fn accession(&self, oid: SeqId) -> &str;

    /// Packed bases plus ambiguity runs for sequence `oid`.
    fn packed_sequence(&self, oid: SeqId) -> Result<PackedSequence, SourceError>;

    /// The sequence as uppercase text (`ACGT` plus IUPAC letters).
    fn sequence_text(&self, oid: SeqId) -> Result<String, SourceError>;
}

struct MemoryEntry {
    accession: String,
    text: String,
    packed: PackedSequence,
}

/// An in-memory [`SequenceSource`], the backing store for FASTA volumes and
/// for the test fixtures.
#[derive(Default)]
pub struct MemorySource {
    entries: Vec<MemoryEntry>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource { entries: Vec::new() }
    }

    /// Builds a source from `(accession, sequence)` pairs.
    ///
    /// # Example
    /// ```rust
    /// use kseek_core::source::{MemorySource, SequenceSource};
    ///
    /// let src = MemorySource::from_named(&[("seq-1", "ACGTACGT"), ("seq-2", "TTTT")]);
    /// assert_eq!(src.num_sequences(), 2);
    /// assert_eq!(src.accession(1), "seq-2");
    /// assert_eq!(src.sequence_length(0), 8);
    /// ```
    pub fn from_named(records: &[(&str, &str)]) -> MemorySource {
        let mut src = MemorySource::new();
        for (acc, seq) in records {
            src.push(acc, seq);
        }
        src
    }

    /// Appends one sequence; ordinals are assigned in insertion order.
    pub fn push(&mut self, accession: &str, sequence: &str) {
        let text = sequence.to_ascii_uppercase();
        let packed = PackedSequence::from_text(&text);
        self.entries.push(MemoryEntry { accession: accession.to_string(), text, packed });
    }

    fn entry(&self, oid: SeqId) -> Result<&MemoryEntry, SourceError> {
        self.entries.get(oid as usize).ok_or(SourceError::OidOutOfRange {
            oid,
            num_sequences: self.entries.len() as u32,
        })
    }
}

impl SequenceSource for MemorySource {
    fn num_sequences(&self) -> u32 {
        self.entries.len() as u32
    }

    fn sequence_length(&self, oid: SeqId) -> u32 {
        self.entries[oid as usize].packed.length
    }

    fn accession(&self, oid: SeqId) -> &str {
        &self.entries[oid as usize].accession
    }

    fn packed_sequence(&self, oid: SeqId) -> Result<PackedSequence, SourceError> {
        Ok(self.entry(oid)?.packed.clone())
    }

    fn sequence_text(&self, oid: SeqId) -> Result<String, SourceError> {
        Ok(self.entry(oid)?.text.clone())
    }
}
