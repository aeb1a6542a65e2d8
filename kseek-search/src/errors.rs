use displaydoc::Display;
use thiserror::Error;

#[derive(Debug, Error, Display)]
#[non_exhaustive]
/// Errors raised while configuring or running a search
pub enum SearchError {
    /// invalid configuration: {reason}
    InvalidConfig {
        /// what was rejected
        reason: String,
    },
    /// index error
    Index(#[from] kseek_index::IndexError),
    /// reference source error
    Source(#[from] kseek_core::SourceError),
    /// I/O error
    Io(#[from] std::io::Error),
}
