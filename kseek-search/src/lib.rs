//! The `kseek` search pipeline.
//!
//! A query runs through up to three stages against every volume of an open
//! index:
//!  1. [`stage1`](crate::stage1) scores reference sequences by shared k-mer
//!     content using only the `.kix` id postings and keeps the top candidates,
//!  2. [`chain`](crate::chain) gathers `(q_pos, s_pos)` hits for each
//!     candidate from the paired `.kix`/`.kpx` streams and chains them into
//!     the best colinear run,
//!  3. [`align`](crate::align) optionally refines surviving chains with a
//!     semi-global alignment against the original reference bases.
//!
//! [`preprocess`](crate::preprocess) runs once per query, across all volumes,
//! to extract both strands' k-mers, drop globally high-frequency values and
//! resolve the per-strand score thresholds. [`harness`](crate::harness)
//! schedules `(query, volume)` work across a thread pool and merges the
//! per-worker results without locks.

pub mod align;
pub mod chain;
pub mod config;
pub mod diagonal;
mod errors;
pub mod harness;
pub mod oid_filter;
pub mod preprocess;
pub mod stage1;
pub mod volume;

pub use config::{SearchConfig, SearchMode, SortScore, Stage1ScoreType, StrandChoice};
pub use errors::SearchError;
pub use harness::{finalize_results, run_search, SearchOutcome};
pub use volume::VolumeHandle;
