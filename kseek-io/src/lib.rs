//! I/O utilities shared by the `kseek` binaries and the search crate.
//!
//! Provides:
//!  - a FASTA reader for query and reference files, gzip-aware, with `-`
//!    standing for stdin,
//!  - a [`MemorySource`](kseek_core::source::MemorySource) factory turning a
//!    FASTA file into a reference-base source for the builder and stage 3,
//!  - the accession-list (seqidlist) reader feeding the oid filter,
//!  - the tab-delimited result writer.

pub mod fasta;
pub mod results;
pub mod seqidlist;

pub use fasta::{open_fasta_source, read_fasta, read_fasta_stream, FastaRecord};
pub use results::{out_writer, write_results_tab};
pub use seqidlist::read_seqidlist;
