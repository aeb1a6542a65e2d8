//! Parallel search orchestration.
//!
//! Queries are preprocessed once (sequentially, against all volumes), then
//! `(query, volume)` work is scheduled onto a work-stealing pool. Two
//! granularities exist: with many queries (or a single volume) the outer
//! parallel loop runs over queries and volumes iterate inside the task, which
//! amortizes per-task setup; otherwise a flat `(query, volume)` job list
//! balances better. Workers accumulate hits in per-fold buffers that are
//! merged once at the end, without locks.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use rayon::prelude::*;

use kseek_core::kmer::{contains_degenerate_base, KmerInt};
use kseek_core::types::{kmer_type_for_k, ChainResult, OutputHit};
use kseek_index::KhxReader;
use kseek_io::FastaRecord;

use crate::config::{SearchConfig, SortScore};
use crate::errors::SearchError;
use crate::preprocess::{preprocess_query, QueryKmerData};
use crate::stage1::Stage1Buffer;
use crate::volume::{search_volume, VolumeHandle};

/// Merged output of stages 1 and 2.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub hits: Vec<OutputHit>,
    /// Queries rejected up front for containing ambiguity codes.
    pub skipped_queries: Vec<String>,
}

fn to_output_hit(
    cr: &ChainResult,
    query: &FastaRecord,
    vol: &VolumeHandle,
) -> OutputHit {
    OutputHit {
        query_id: query.id.clone(),
        accession: vol.ksx.accession(cr.oid).to_string(),
        strand: if cr.is_reverse { '-' } else { '+' },
        q_start: cr.q_start,
        q_end: cr.q_end,
        s_start: cr.s_start,
        s_end: cr.s_end,
        score: cr.score,
        stage1_score: cr.stage1_score,
        volume: vol.volume_index,
        q_length: query.sequence.len() as u32,
        s_length: vol.ksx.seq_length(cr.oid),
        ..Default::default()
    }
}

/// Runs stages 1 and 2 for every query against every volume.
///
/// `threads == 0` uses the global pool. The abort flag is polled between
/// volumes inside a query task and between flat jobs; a cancelled run
/// returns whatever was merged so far.
pub fn run_search(
    queries: &[FastaRecord],
    volumes: &[VolumeHandle],
    khx: Option<&KhxReader>,
    k: usize,
    config: &SearchConfig,
    threads: usize,
    abort: &AtomicBool,
) -> Result<SearchOutcome, SearchError> {
    config.validate(k)?;
    if kmer_type_for_k(k) == 0 {
        run_search_typed::<u16>(queries, volumes, khx, k, config, threads, abort)
    } else {
        run_search_typed::<u32>(queries, volumes, khx, k, config, threads, abort)
    }
}

fn run_search_typed<K: KmerInt>(
    queries: &[FastaRecord],
    volumes: &[VolumeHandle],
    khx: Option<&KhxReader>,
    k: usize,
    config: &SearchConfig,
    threads: usize,
    abort: &AtomicBool,
) -> Result<SearchOutcome, SearchError> {
    let mut outcome = SearchOutcome::default();

    // ---------- admission: optionally reject degenerate queries
    let mut skipped = vec![false; queries.len()];
    if !config.accept_qdegen {
        for (qi, q) in queries.iter().enumerate() {
            if contains_degenerate_base(&q.sequence) {
                warn!("query '{}' contains degenerate bases, skipping", q.id);
                skipped[qi] = true;
                outcome.skipped_queries.push(q.id.clone());
            }
        }
    }

    // ---------- preprocess every query once, across all volumes
    let all_kix: Vec<&kseek_index::KixReader> = volumes.iter().map(|v| &v.kix).collect();
    let qdata: Vec<Option<QueryKmerData<K>>> = queries
        .iter()
        .enumerate()
        .map(|(qi, q)| {
            if skipped[qi] {
                return None;
            }
            let data = preprocess_query::<K>(&q.sequence, k, &all_kix, khx, config);
            if data.has_multi_degen {
                warn!(
                    "query '{}': windows with two or more degenerate bases were ignored",
                    q.id
                );
            }
            Some(data)
        })
        .collect();

    let max_nseq = volumes.iter().map(|v| v.kix.num_sequences()).max().unwrap_or(0);
    let active_queries = qdata.iter().filter(|d| d.is_some()).count();

    let pool = if threads == 0 {
        None
    } else {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| SearchError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?,
        )
    };
    let effective_threads =
        pool.as_ref().map(|p| p.current_num_threads()).unwrap_or_else(rayon::current_num_threads);

    let query_level = active_queries > 2 * effective_threads || volumes.len() == 1;
    info!(
        "searching {} query(ies) over {} volume(s), {} thread(s), {} parallelism",
        active_queries,
        volumes.len(),
        effective_threads,
        if query_level { "query-level" } else { "job-level" }
    );

    let run = || -> Vec<OutputHit> {
        if query_level {
            queries
                .par_iter()
                .enumerate()
                .fold(
                    || (Stage1Buffer::new(max_nseq), Vec::new()),
                    |(mut buf, mut acc), (qi, query)| {
                        let Some(data) = &qdata[qi] else { return (buf, acc) };
                        for vol in volumes {
                            if abort.load(Ordering::Relaxed) {
                                break;
                            }
                            for cr in search_volume(data, k, vol, config, &mut buf) {
                                acc.push(to_output_hit(&cr, query, vol));
                            }
                        }
                        (buf, acc)
                    },
                )
                .map(|(_, acc)| acc)
                .reduce(Vec::new, |mut a, mut b| {
                    a.append(&mut b);
                    a
                })
        } else {
            let jobs: Vec<(usize, usize)> = (0..queries.len())
                .filter(|&qi| qdata[qi].is_some())
                .flat_map(|qi| (0..volumes.len()).map(move |vi| (qi, vi)))
                .collect();
            jobs.par_iter()
                .fold(
                    || (Stage1Buffer::new(max_nseq), Vec::new()),
                    |(mut buf, mut acc), &(qi, vi)| {
                        if abort.load(Ordering::Relaxed) {
                            return (buf, acc);
                        }
                        let Some(data) = &qdata[qi] else { return (buf, acc) };
                        let vol = &volumes[vi];
                        for cr in search_volume(data, k, vol, config, &mut buf) {
                            acc.push(to_output_hit(&cr, &queries[qi], vol));
                        }
                        (buf, acc)
                    },
                )
                .map(|(_, acc)| acc)
                .reduce(Vec::new, |mut a, mut b| {
                    a.append(&mut b);
                    a
                })
        }
    };

    outcome.hits = match &pool {
        Some(pool) => pool.install(run),
        None => run(),
    };
    Ok(outcome)
}

/// Final cross-volume ordering and per-query truncation.
///
/// With `num_results == 0` the hit order is left as merged. Otherwise hits
/// sort by `(query_id, score descending)` on the configured score field and
/// each query keeps its best `num_results`.
pub fn finalize_results(hits: &mut Vec<OutputHit>, config: &SearchConfig) {
    if config.num_results == 0 {
        return;
    }

    match config.sort_score {
        SortScore::Stage1 => hits.sort_by(|a, b| {
            a.query_id.cmp(&b.query_id).then(b.stage1_score.cmp(&a.stage1_score))
        }),
        SortScore::Chain => {
            hits.sort_by(|a, b| a.query_id.cmp(&b.query_id).then(b.score.cmp(&a.score)))
        }
        SortScore::Alignment => hits.sort_by(|a, b| {
            a.query_id.cmp(&b.query_id).then(b.aln_score.cmp(&a.aln_score))
        }),
    }

    let mut kept = Vec::with_capacity(hits.len());
    let mut cur_query = String::new();
    let mut cur_count = 0u32;
    let mut first = true;
    for hit in hits.drain(..) {
        if first || hit.query_id != cur_query {
            cur_query = hit.query_id.clone();
            cur_count = 0;
            first = false;
        }
        if cur_count < config.num_results {
            cur_count += 1;
            kept.push(hit);
        }
    }
    *hits = kept;
}
