use displaydoc::Display;
use thiserror::Error;

#[derive(Debug, Error, Display)]
#[non_exhaustive]
/// Errors raised while reading or writing index files
pub enum IndexError {
    /// cannot open index file '{path}'
    Open {
        /// path of the file that failed to open
        path: String,
        /// underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// file '{path}' is too small to be a valid index file
    Truncated {
        /// path of the truncated file
        path: String,
    },
    /// bad magic in '{path}': not a {expected} file
    BadMagic {
        /// path of the rejected file
        path: String,
        /// the file kind that was expected
        expected: &'static str,
    },
    /// unsupported format version {found} in '{path}' (this build reads version {expected})
    BadVersion {
        /// path of the rejected file
        path: String,
        /// version found in the header
        found: u16,
        /// version this build understands
        expected: u16,
    },
    /// on-disk invariant violated: {detail}
    Invariant {
        /// what went wrong
        detail: String,
    },
    /// k-mer length {k} is outside the supported range [{min}, {max}]
    KOutOfRange {
        /// requested k
        k: usize,
        /// smallest supported k
        min: usize,
        /// largest supported k
        max: usize,
    },
    /// reference source error during index build
    Source(#[from] kseek_core::SourceError),
    /// I/O error
    Io(#[from] std::io::Error),
}
