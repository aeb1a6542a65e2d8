//! On-disk index format and builder for `kseek`.
//!
//! A logical database is a set of *volumes*; each volume carries, per k-mer
//! length, three immutable files that the searcher memory-maps read-only:
//!  - `.kix`: for every possible k-mer value, a byte offset and a posting
//!    count into a delta-varint blob of sequence ordinals,
//!  - `.kpx`: the parallel blob of positions, decoded in lockstep with the
//!    `.kix` stream,
//!  - `.ksx`: per-sequence lengths and accession strings.
//!
//! A `.kvx` manifest lists the volumes of a database, and an optional shared
//! `.khx` bitset marks k-mers excluded for being too frequent across the
//! whole database.
//!
//! [`builder`](crate::builder) constructs the three per-volume files from a
//! [`SequenceSource`](kseek_core::source::SequenceSource) with bounded RAM:
//! a counting pass fixes the exact blob layout, then partitioned scans with
//! sorted spill runs fill it in.

pub mod builder;
pub mod discovery;
mod errors;
pub mod format;
pub mod highfreq;
pub mod khx;
pub mod kix;
pub mod kpx;
pub mod ksx;
pub mod kvx;
mod mmap;
pub mod postings;

pub use errors::IndexError;
pub use khx::{KhxReader, KhxWriter};
pub use kix::KixReader;
pub use kpx::KpxReader;
pub use ksx::{KsxReader, KsxWriter};
pub use mmap::MmapFile;
