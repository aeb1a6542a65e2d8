//! The diagonal pre-filter of stage 2.

use std::collections::HashMap;

use kseek_core::types::Hit;

/// Keeps only hits lying on a diagonal (`s_pos - q_pos`) that carries at
/// least `min_diag_hits` hits in total. A threshold of 0 or 1 filters
/// nothing.
pub fn diagonal_filter(hits: &[Hit], min_diag_hits: u32) -> Vec<Hit> {
    if min_diag_hits <= 1 {
        return hits.to_vec();
    }

    let mut diag_counts: HashMap<i64, u32> = HashMap::with_capacity(hits.len());
    for hit in hits {
        *diag_counts.entry(i64::from(hit.s_pos) - i64::from(hit.q_pos)).or_insert(0) += 1;
    }

    hits.iter()
        .filter(|hit| diag_counts[&(i64::from(hit.s_pos) - i64::from(hit.q_pos))] >= min_diag_hits)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(q: u32, s: u32) -> Hit {
        Hit { q_pos: q, s_pos: s }
    }

    #[test]
    fn threshold_one_is_identity() {
        let hits = vec![hit(0, 5), hit(3, 1)];
        assert_eq!(diagonal_filter(&hits, 1), hits);
        assert_eq!(diagonal_filter(&hits, 0), hits);
    }

    #[test]
    fn sparse_diagonals_are_dropped() {
        // three hits on diagonal +2, one stray on diagonal -1
        let hits = vec![hit(0, 2), hit(1, 0), hit(5, 7), hit(9, 11)];
        let kept = diagonal_filter(&hits, 2);
        assert_eq!(kept, vec![hit(0, 2), hit(5, 7), hit(9, 11)]);
        assert!(diagonal_filter(&hits, 4).is_empty());
    }
}
