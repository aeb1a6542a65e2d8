use displaydoc::Display;
use thiserror::Error;

#[derive(Debug, Error, Display)]
#[non_exhaustive]
/// Errors raised while reading reference bases through a `SequenceSource`
pub enum SourceError {
    /// sequence ordinal {oid} is out of range (source holds {num_sequences} sequences)
    OidOutOfRange {
        /// the offending ordinal
        oid: u32,
        /// number of sequences the source actually holds
        num_sequences: u32,
    },
    /// I/O error while fetching reference bases
    Io(#[from] std::io::Error),
}
