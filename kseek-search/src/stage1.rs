//! Stage 1: per-volume candidate scoring over the `.kix` id postings.

use kseek_core::kmer::KmerInt;
use kseek_core::types::{SeqId, Stage1Candidate};
use kseek_index::postings::SeqIdDecoder;
use kseek_index::KixReader;

use crate::config::Stage1ScoreType;
use crate::oid_filter::OidFilter;

/// Reusable per-worker scoring buffer.
///
/// `score` and `last_pos` are sized to the largest volume once and reset in
/// O(touched) via the dirty list: an oid goes onto the list exactly when its
/// score leaves zero, and [`clear_dirty`](Stage1Buffer::clear_dirty) only
/// walks those entries.
pub struct Stage1Buffer {
    score: Vec<u32>,
    last_pos: Vec<u32>,
    dirty: Vec<SeqId>,
}

impl Stage1Buffer {
    pub fn new(capacity: u32) -> Stage1Buffer {
        Stage1Buffer {
            score: vec![0; capacity as usize],
            last_pos: vec![u32::MAX; capacity as usize],
            dirty: Vec::new(),
        }
    }

    pub fn ensure_capacity(&mut self, capacity: u32) {
        if self.score.len() < capacity as usize {
            self.score.resize(capacity as usize, 0);
            self.last_pos.resize(capacity as usize, u32::MAX);
        }
    }

    fn clear_dirty(&mut self) {
        for &oid in &self.dirty {
            self.score[oid as usize] = 0;
            self.last_pos[oid as usize] = u32::MAX;
        }
        self.dirty.clear();
    }
}

/// Scores one strand's pre-filtered k-mer list against one volume and returns
/// the candidates at or above `min_score`, best first, truncated to `topn`
/// when that is non-zero.
///
/// High-frequency k-mers were already removed from `query_kmers` by the
/// preprocessor; only empty posting lists are skipped here.
pub fn stage1_filter<K: KmerInt>(
    query_kmers: &[(u32, K)],
    kix: &KixReader,
    filter: &OidFilter,
    score_type: Stage1ScoreType,
    min_score: u32,
    topn: u32,
    buf: &mut Stage1Buffer,
) -> Vec<Stage1Candidate> {
    let num_seqs = kix.num_sequences();
    if num_seqs == 0 || query_kmers.is_empty() {
        return Vec::new();
    }
    buf.ensure_capacity(num_seqs);

    let use_coverscore = score_type == Stage1ScoreType::Coverscore;
    let posting_data = kix.posting_data();

    for &(q_pos, kmer) in query_kmers {
        let value = kmer.to_u64();
        let cnt = kix.posting_count(value);
        if cnt == 0 {
            continue;
        }
        let mut decoder = SeqIdDecoder::new(&posting_data[kix.posting_offset(value) as usize..]);
        for _ in 0..cnt {
            let oid = decoder.next();
            if use_coverscore && !decoder.was_new_seq() {
                continue;
            }
            if !filter.pass(oid) {
                continue;
            }
            if use_coverscore {
                // one contribution per distinct query position, even when
                // ambiguity expansion probes several k-mers at the same spot
                if buf.last_pos[oid as usize] == q_pos {
                    continue;
                }
                buf.last_pos[oid as usize] = q_pos;
            }
            if buf.score[oid as usize] == 0 {
                buf.dirty.push(oid);
            }
            buf.score[oid as usize] += 1;
        }
    }

    let mut candidates: Vec<Stage1Candidate> = buf
        .dirty
        .iter()
        .filter_map(|&oid| {
            let score = buf.score[oid as usize];
            (score >= min_score).then_some(Stage1Candidate { oid, score })
        })
        .collect();

    buf.clear_dirty();

    if topn > 0 && candidates.len() > topn as usize {
        let n = topn as usize;
        candidates.select_nth_unstable_by(n - 1, |a, b| b.score.cmp(&a.score));
        candidates.truncate(n);
    }
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.oid.cmp(&b.oid)));
    candidates
}
