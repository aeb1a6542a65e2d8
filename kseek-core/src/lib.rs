//! Core primitives for k-mer based nucleotide sequence search.
//!
//! This crate holds the pieces every other `kseek` crate builds on:
//!  - [`kmer`](crate::kmer): 2-bit base encoding, rolling k-mer scanners over plain text
//!    and over 2-bit packed bases, IUPAC ambiguity expansion and reverse complements.
//!    The k-mer integer width follows `k`: a `u16` holds any k-mer up to `k = 8`,
//!    a `u32` covers `9 <= k <= 13`.
//!  - [`varint`](crate::varint): LEB128 unsigned integers, the wire format of the
//!    delta-compressed posting blobs.
//!  - [`types`](crate::types): hits, chain results and output records shared by the
//!    index and search crates.
//!  - [`source`](crate::source): the [`SequenceSource`](crate::source::SequenceSource)
//!    boundary trait through which the index builder and the alignment stage read
//!    reference bases, plus an in-memory implementation.

mod errors;
pub mod kmer;
pub mod source;
pub mod types;
pub mod varint;

pub use errors::SourceError;
