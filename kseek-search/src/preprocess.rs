//! Per-query preprocessing: k-mer extraction, global high-frequency removal
//! and threshold resolution.
//!
//! The high-frequency decision is made here, once per query and across every
//! open volume, so that stage 1 sees the same filtered k-mer list no matter
//! which volume it runs against. Filtering per volume instead would let
//! volumes with skewed count distributions disagree about which k-mers exist.

use std::collections::HashSet;

use log::warn;

use kseek_core::kmer::{expand_ambig_kmer, KmerInt, KmerScanner, ScanEvent};
use kseek_index::{KhxReader, KixReader};

use crate::config::SearchConfig;

/// A query's search-ready k-mer data, built once and then shared read-only by
/// every `(query, volume)` task.
#[derive(Clone, Debug)]
pub struct QueryKmerData<K: KmerInt> {
    /// Forward-strand `(q_pos, kmer)` pairs, high-frequency values removed.
    pub fwd_kmers: Vec<(u32, K)>,
    /// Reverse-complement pairs with positions in reverse-complement-query
    /// coordinates, so a minus-strand match is colinear on both axes. The
    /// alignment stage works on the reverse-complemented query too, keeping
    /// the two coordinate systems consistent.
    pub rc_kmers: Vec<(u32, K)>,
    /// Resolved stage-1 floor per strand; `None` marks the strand
    /// unsearchable (a fractional threshold resolved to zero or below).
    pub fwd_threshold: Option<u32>,
    pub rc_threshold: Option<u32>,
    /// Stage-2 chain-score floor per strand.
    pub fwd_min_chain_score: u32,
    pub rc_min_chain_score: u32,
    /// Some windows were dropped for holding two or more ambiguity codes.
    pub has_multi_degen: bool,
}

impl<K: KmerInt> Default for QueryKmerData<K> {
    fn default() -> QueryKmerData<K> {
        QueryKmerData {
            fwd_kmers: Vec::new(),
            rc_kmers: Vec::new(),
            fwd_threshold: None,
            rc_threshold: None,
            fwd_min_chain_score: 0,
            rc_min_chain_score: 0,
            has_multi_degen: false,
        }
    }
}

fn extract_kmers<K: KmerInt>(seq: &str, k: usize) -> (Vec<(u32, K)>, bool) {
    let mut kmers = Vec::new();
    let scanner: KmerScanner<K> = KmerScanner::new(k);
    let multi = scanner.scan_ambig(seq.as_bytes(), |ev| match ev {
        ScanEvent::Kmer { pos, kmer } => kmers.push((pos, kmer)),
        ScanEvent::Degenerate { pos, base_kmer, mask, bit_offset } => {
            expand_ambig_kmer(base_kmer, mask, bit_offset, |m: K| kmers.push((pos, m)));
        }
    });
    (kmers, multi)
}

/// Auto-computes the high-frequency cutoff from index statistics when the
/// config leaves it at zero: ten times the mean posting count, clamped to
/// `[1000, 100000]`.
pub fn compute_effective_max_freq(
    config_max_freq: u32,
    total_postings: u64,
    table_size: u64,
) -> u32 {
    if config_max_freq > 0 {
        return config_max_freq;
    }
    let mean = total_postings as f64 / table_size.max(1) as f64;
    ((mean * 10.0) as u32).clamp(1000, 100_000)
}

fn global_max_freq(config_max_freq: u32, all_kix: &[&KixReader]) -> u32 {
    if config_max_freq > 0 {
        return config_max_freq;
    }
    let total_postings: u64 = all_kix.iter().map(|kix| kix.total_postings()).sum();
    let table_size = all_kix.first().map(|kix| kix.table_size()).unwrap_or(0);
    compute_effective_max_freq(0, total_postings, table_size)
}

/// Number of distinct query positions in a position-sorted k-mer list.
fn count_positions<K: KmerInt>(kmers: &[(u32, K)]) -> u32 {
    let mut n = 0u32;
    let mut last = None;
    for &(pos, _) in kmers {
        if last != Some(pos) {
            n += 1;
            last = Some(pos);
        }
    }
    n
}

/// Number of positions whose every expanded k-mer is high-frequency.
fn count_highfreq_positions<K: KmerInt>(kmers: &[(u32, K)], highfreq: &HashSet<u64>) -> u32 {
    let mut n = 0u32;
    let mut i = 0usize;
    while i < kmers.len() {
        let pos = kmers[i].0;
        let mut all_high = true;
        while i < kmers.len() && kmers[i].0 == pos {
            if !highfreq.contains(&kmers[i].1.to_u64()) {
                all_high = false;
            }
            i += 1;
        }
        if all_high {
            n += 1;
        }
    }
    n
}

fn resolve_fractional_threshold(
    n_qkmer: u32,
    n_highfreq: u32,
    frac: f64,
    strand: &str,
) -> Option<u32> {
    let threshold = (f64::from(n_qkmer) * frac).ceil() as i64 - i64::from(n_highfreq);
    if threshold <= 0 {
        warn!(
            "fractional stage-1 threshold resolved to {} (strand={}, positions={}, high-frequency={}); strand is unsearchable",
            threshold, strand, n_qkmer, n_highfreq
        );
        return None;
    }
    Some(threshold as u32)
}

/// Builds a query's [`QueryKmerData`] against every open volume.
///
/// `all_kix` must hold one reader per volume so counts aggregate globally;
/// `khx` is the optional build-time exclusion bitset.
pub fn preprocess_query<K: KmerInt>(
    query_seq: &str,
    k: usize,
    all_kix: &[&KixReader],
    khx: Option<&KhxReader>,
    config: &SearchConfig,
) -> QueryKmerData<K> {
    let mut result = QueryKmerData::default();

    let (fwd_kmers, has_multi_degen) = extract_kmers::<K>(query_seq, k);
    result.has_multi_degen = has_multi_degen;
    if fwd_kmers.is_empty() {
        return result;
    }

    // mirror each window into reverse-complement-query coordinates and flip
    // the list back to ascending positions
    let mirror = (query_seq.len() - k) as u32;
    let mut rc_kmers: Vec<(u32, K)> =
        fwd_kmers.iter().map(|&(pos, kmer)| (mirror - pos, kmer.revcomp(k))).collect();
    rc_kmers.reverse();

    // ---------- global high-frequency set over both strands
    let max_freq = global_max_freq(config.stage1.max_freq, all_kix);
    let mut highfreq: HashSet<u64> = HashSet::new();
    let mut query_values: HashSet<u64> = HashSet::new();
    for &(_, kmer) in fwd_kmers.iter().chain(rc_kmers.iter()) {
        query_values.insert(kmer.to_u64());
    }
    for &value in &query_values {
        if khx.map(|x| x.is_excluded(value)).unwrap_or(false) {
            highfreq.insert(value);
            continue;
        }
        let total: u64 = all_kix.iter().map(|kix| u64::from(kix.posting_count(value))).sum();
        if total > u64::from(max_freq) {
            highfreq.insert(value);
        }
    }

    // ---------- strand thresholds, computed before filtering
    let frac = config.stage1.min_score_frac;
    if frac > 0.0 {
        let n_fwd = count_positions(&fwd_kmers);
        let n_rc = count_positions(&rc_kmers);
        let h_fwd = count_highfreq_positions(&fwd_kmers, &highfreq);
        let h_rc = count_highfreq_positions(&rc_kmers, &highfreq);
        result.fwd_threshold = resolve_fractional_threshold(n_fwd, h_fwd, frac, "fwd");
        result.rc_threshold = resolve_fractional_threshold(n_rc, h_rc, frac, "rc");
    } else {
        result.fwd_threshold = Some(config.stage1.min_score);
        result.rc_threshold = Some(config.stage1.min_score);
    }

    // ---------- stage-2 floor: explicit, or adaptive to the stage-1 bar
    let chain_floor = |threshold: Option<u32>| -> u32 {
        if config.stage2.min_score > 0 {
            config.stage2.min_score
        } else if frac > 0.0 {
            threshold.unwrap_or(0)
        } else {
            config.stage1.min_score
        }
    };
    result.fwd_min_chain_score = chain_floor(result.fwd_threshold);
    result.rc_min_chain_score = chain_floor(result.rc_threshold);

    // ---------- drop high-frequency k-mers from both strands
    result.fwd_kmers =
        fwd_kmers.into_iter().filter(|(_, m)| !highfreq.contains(&m.to_u64())).collect();
    result.rc_kmers =
        rc_kmers.into_iter().filter(|(_, m)| !highfreq.contains(&m.to_u64())).collect();

    result
}
