//! Stage 2: colinear chaining of k-mer hits.

use kseek_core::types::{ChainResult, Hit, SeqId};

use crate::config::Stage2Config;
use crate::diagonal::diagonal_filter;

/// Chains one candidate's hits and reports the best chain.
///
/// The DP walks hits sorted by `(q_pos, s_pos)`; a predecessor must be
/// strictly smaller on both axes (so every chain link comes from a distinct
/// query k-mer) and deviate by at most `max_gap` from the successor's
/// diagonal. `max_lookback` bounds how far back predecessors are considered;
/// 0 means unlimited. Returns a result with `score == 0` when nothing reaches
/// `min_score`.
pub fn chain_hits(
    raw_hits: &[Hit],
    oid: SeqId,
    k: usize,
    is_reverse: bool,
    config: &Stage2Config,
) -> ChainResult {
    let mut result = ChainResult { oid, is_reverse, ..Default::default() };
    if raw_hits.is_empty() {
        return result;
    }

    // dedup (q_pos, s_pos): ambiguity expansion can probe the same spot twice
    let mut hits = raw_hits.to_vec();
    hits.sort();
    hits.dedup();

    let hits = diagonal_filter(&hits, config.min_diag_hits);
    if hits.is_empty() {
        return result;
    }

    let n = hits.len();
    let mut dp = vec![1u32; n];
    let mut prev = vec![usize::MAX; n];

    for i in 1..n {
        let j_start = if config.max_lookback > 0 && i > config.max_lookback as usize {
            i - config.max_lookback as usize
        } else {
            0
        };
        for j in j_start..i {
            if hits[j].q_pos >= hits[i].q_pos || hits[j].s_pos >= hits[i].s_pos {
                continue;
            }
            let gap_q = i64::from(hits[i].q_pos) - i64::from(hits[j].q_pos);
            let gap_s = i64::from(hits[i].s_pos) - i64::from(hits[j].s_pos);
            if (gap_s - gap_q).abs() > i64::from(config.max_gap) {
                continue;
            }
            if dp[j] + 1 > dp[i] {
                dp[i] = dp[j] + 1;
                prev[i] = j;
            }
        }
    }

    let mut best = 0usize;
    for i in 1..n {
        if dp[i] > dp[best] {
            best = i;
        }
    }
    if dp[best] < config.min_score {
        return result;
    }

    let mut start = best;
    while prev[start] != usize::MAX {
        start = prev[start];
    }

    result.score = dp[best];
    result.q_start = hits[start].q_pos;
    result.q_end = hits[best].q_pos + k as u32;
    result.s_start = hits[start].s_pos;
    result.s_end = hits[best].s_pos + k as u32;
    result
}
