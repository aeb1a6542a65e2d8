//! One open volume and the per-volume search pipeline.

use std::collections::HashMap;

use kseek_core::kmer::KmerInt;
use kseek_core::types::{ChainResult, Hit, SeqId, Stage1Candidate};
use kseek_index::discovery::DiscoveredVolume;
use kseek_index::postings::{PosDecoder, SeqIdDecoder};
use kseek_index::{IndexError, KixReader, KpxReader, KsxReader};

use crate::chain::chain_hits;
use crate::config::{SearchConfig, SearchMode, SortScore, Stage2Config};
use crate::oid_filter::OidFilter;
use crate::preprocess::QueryKmerData;
use crate::stage1::{stage1_filter, Stage1Buffer};

/// One volume's mapped index files plus its oid filter.
///
/// The mappings are shared read-only by every worker for the lifetime of the
/// search session.
pub struct VolumeHandle {
    pub kix: KixReader,
    /// Absent in stage-1-only sessions.
    pub kpx: Option<KpxReader>,
    pub ksx: KsxReader,
    pub filter: OidFilter,
    pub volume_index: u16,
}

impl VolumeHandle {
    /// Opens a discovered volume; `with_kpx` is false for stage-1-only runs.
    pub fn open(dv: &DiscoveredVolume, with_kpx: bool) -> Result<VolumeHandle, IndexError> {
        let kix = KixReader::open(&dv.kix_path)?;
        let kpx = if with_kpx { Some(KpxReader::open(&dv.kpx_path)?) } else { None };
        let ksx = KsxReader::open(&dv.ksx_path)?;
        Ok(VolumeHandle { kix, kpx, ksx, filter: OidFilter::none(), volume_index: dv.volume_index })
    }
}

fn stage1_only_results(
    candidates: &[Stage1Candidate],
    is_reverse: bool,
    min_score: u32,
) -> Vec<ChainResult> {
    candidates
        .iter()
        .filter(|c| c.score >= min_score)
        .map(|c| ChainResult {
            oid: c.oid,
            stage1_score: c.score,
            is_reverse,
            ..Default::default()
        })
        .collect()
}

fn search_one_strand<K: KmerInt>(
    query_kmers: &[(u32, K)],
    k: usize,
    is_reverse: bool,
    vol: &VolumeHandle,
    config: &SearchConfig,
    threshold: Option<u32>,
    min_chain_score: u32,
    buf: &mut Stage1Buffer,
) -> Vec<ChainResult> {
    // a strand whose fractional threshold resolved at or below zero is
    // unsearchable, not "everything passes"
    let Some(threshold) = threshold else { return Vec::new() };

    let candidates = stage1_filter(
        query_kmers,
        &vol.kix,
        &vol.filter,
        config.stage1.score_type,
        threshold,
        config.stage1.topn,
        buf,
    );
    if candidates.is_empty() {
        return Vec::new();
    }

    if config.mode == SearchMode::Stage1Only {
        return stage1_only_results(&candidates, is_reverse, min_chain_score);
    }

    let Some(kpx) = vol.kpx.as_ref() else { return Vec::new() };

    // gather hits for the candidate set in one lockstep pass over kix + kpx
    let mut hits_per_seq: HashMap<SeqId, Vec<Hit>> = HashMap::with_capacity(candidates.len());
    for c in &candidates {
        hits_per_seq.insert(c.oid, Vec::new());
    }

    let id_data = vol.kix.posting_data();
    let pos_data = kpx.posting_data();
    for &(q_pos, kmer) in query_kmers {
        let value = kmer.to_u64();
        let cnt = vol.kix.posting_count(value);
        if cnt == 0 {
            continue;
        }
        let mut ids = SeqIdDecoder::new(&id_data[vol.kix.posting_offset(value) as usize..]);
        let mut poss = PosDecoder::new(&pos_data[kpx.pos_offset(value) as usize..]);
        for _ in 0..cnt {
            let oid = ids.next();
            let s_pos = poss.next(ids.was_new_seq());
            if let Some(hits) = hits_per_seq.get_mut(&oid) {
                hits.push(Hit { q_pos, s_pos });
            }
        }
    }

    let stage2 = Stage2Config { min_score: min_chain_score, ..config.stage2.clone() };
    let mut results = Vec::new();
    for c in &candidates {
        let Some(hits) = hits_per_seq.get(&c.oid) else { continue };
        if hits.is_empty() {
            continue;
        }
        let mut cr = chain_hits(hits, c.oid, k, is_reverse, &stage2);
        if cr.score >= min_chain_score && cr.score > 0 {
            cr.stage1_score = c.score;
            results.push(cr);
        }
    }
    results
}

fn sort_and_truncate(results: &mut Vec<ChainResult>, config: &SearchConfig) {
    if config.num_results == 0 {
        return;
    }
    match config.sort_score {
        SortScore::Stage1 => results
            .sort_by(|a, b| b.stage1_score.cmp(&a.stage1_score).then(a.oid.cmp(&b.oid))),
        SortScore::Chain => {
            results.sort_by(|a, b| b.score.cmp(&a.score).then(a.oid.cmp(&b.oid)))
        }
        // alignment scores do not exist yet, and chain score is no stand-in
        // for them: every candidate must reach the alignment stage, so the
        // per-query cut waits for the final pass over aligned hits
        SortScore::Alignment => return,
    }
    results.truncate(config.num_results as usize);
}

/// Runs the per-volume pipeline for one preprocessed query.
pub fn search_volume<K: KmerInt>(
    qdata: &QueryKmerData<K>,
    k: usize,
    vol: &VolumeHandle,
    config: &SearchConfig,
    buf: &mut Stage1Buffer,
) -> Vec<ChainResult> {
    let mut results = Vec::new();

    if config.strand.searches_plus() {
        results.extend(search_one_strand(
            &qdata.fwd_kmers,
            k,
            false,
            vol,
            config,
            qdata.fwd_threshold,
            qdata.fwd_min_chain_score,
            buf,
        ));
    }
    if config.strand.searches_minus() {
        results.extend(search_one_strand(
            &qdata.rc_kmers,
            k,
            true,
            vol,
            config,
            qdata.rc_threshold,
            qdata.rc_min_chain_score,
            buf,
        ));
    }

    sort_and_truncate(&mut results, config);
    results
}
