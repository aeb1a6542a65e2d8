//! Per-volume accession allow/deny filtering.

use std::collections::HashMap;

use log::warn;

use kseek_core::types::SeqId;
use kseek_index::KsxReader;

/// Filter polarity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OidFilterMode {
    /// Everything passes.
    #[default]
    None,
    /// Only listed accessions pass.
    Include,
    /// Listed accessions are rejected.
    Exclude,
}

/// An O(1) oid filter backed by a per-volume bit array.
///
/// Accessions are resolved against the volume's `.ksx`; unresolved entries
/// log a warning and are skipped.
#[derive(Default)]
pub struct OidFilter {
    mode: OidFilterMode,
    bits: Vec<bool>,
}

impl OidFilter {
    /// A pass-through filter.
    pub fn none() -> OidFilter {
        OidFilter::default()
    }

    /// Builds the filter for one volume.
    pub fn build(accessions: &[String], ksx: &KsxReader, mode: OidFilterMode) -> OidFilter {
        if mode == OidFilterMode::None || accessions.is_empty() {
            return OidFilter::none();
        }

        let num_seqs = ksx.num_sequences();
        let mut acc_to_oid: HashMap<&str, SeqId> = HashMap::with_capacity(num_seqs as usize);
        for oid in 0..num_seqs {
            acc_to_oid.insert(ksx.accession(oid), oid);
        }

        let mut bits = vec![false; num_seqs as usize];
        for acc in accessions {
            match acc_to_oid.get(acc.as_str()) {
                Some(&oid) => bits[oid as usize] = true,
                None => warn!("accession '{}' not found in index volume", acc),
            }
        }
        OidFilter { mode, bits }
    }

    pub fn mode(&self) -> OidFilterMode {
        self.mode
    }

    /// Does this oid survive the filter?
    #[inline]
    pub fn pass(&self, oid: SeqId) -> bool {
        match self.mode {
            OidFilterMode::None => true,
            OidFilterMode::Include => self.bits.get(oid as usize).copied().unwrap_or(false),
            OidFilterMode::Exclude => !self.bits.get(oid as usize).copied().unwrap_or(false),
        }
    }
}
