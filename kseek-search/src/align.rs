//! Stage 3: semi-global refinement of chained hits.
//!
//! Surviving chains are re-scored with a Gotoh affine-gap DP against a
//! context-extended window of the original reference bases, fetched through
//! the volume's [`SequenceSource`]. End gaps on both sequences are free, so a
//! short query may land anywhere inside the window. With traceback enabled
//! the aligner also reports a CIGAR, identity counts and refined coordinates.

use std::collections::HashMap;

use log::{debug, warn};
use once_cell::sync::Lazy;
use rayon::prelude::*;

use kseek_core::source::SequenceSource;
use kseek_core::types::OutputHit;
use kseek_io::FastaRecord;

use crate::config::Stage3Config;

/// A score well below anything reachable, safe to add penalties to.
const NEG_INF: i32 = i32::MIN / 4;

/// Fixed nucleotide scoring: +5 match, -4 mismatch, anything outside `ACGT`
/// mismatches everything including itself.
pub struct NucleotideMatrix {
    match_score: i32,
    mismatch_score: i32,
}

impl NucleotideMatrix {
    #[inline]
    pub fn score(&self, a: u8, b: u8) -> i32 {
        if a < 4 && a == b {
            self.match_score
        } else {
            self.mismatch_score
        }
    }
}

static NUC_MATRIX: Lazy<NucleotideMatrix> =
    Lazy::new(|| NucleotideMatrix { match_score: 5, mismatch_score: -4 });

/// Encodes a sequence for the aligner: `ACGT` to 0..=3, everything else to a
/// code that never matches.
pub fn encode_for_alignment(seq: &str) -> Vec<u8> {
    seq.bytes()
        .map(|c| {
            let code = kseek_core::kmer::encode_base(c);
            if code == kseek_core::kmer::BASE_ENCODE_INVALID { 0xFE } else { code }
        })
        .collect()
}

/// Reverse-complements a DNA string; IUPAC letters other than `ACGT` are kept
/// as-is after reversal.
pub fn reverse_complement(seq: &str) -> String {
    seq.bytes()
        .rev()
        .map(|c| match c {
            b'A' => 'T',
            b'T' => 'A',
            b'C' => 'G',
            b'G' => 'C',
            b'a' => 't',
            b't' => 'a',
            b'c' => 'g',
            b'g' => 'c',
            other => other as char,
        })
        .collect()
}

/// Everything one alignment reports.
#[derive(Clone, Debug, Default)]
pub struct AlignmentOutcome {
    pub score: i32,
    /// Alignment bounds, end-exclusive; query coordinates refer to the
    /// strand-adjusted query, subject coordinates to the window.
    pub q_start: u32,
    pub q_end: u32,
    pub s_start: u32,
    pub s_end: u32,
    pub cigar: String,
    pub nident: u32,
    pub nmismatch: u32,
    pub aln_len: u32,
}

/// Semi-global Gotoh aligner with reusable row buffers.
///
/// `h`/`e`/`f` are the current DP row and their `_prev` twins the one before;
/// the arrow matrix plus horizontal/vertical gap-run lengths drive the
/// traceback, which emits whole gap runs at a time.
pub struct SemiGlobalAligner {
    gap_open: i32,
    gap_ext: i32,
    h: Vec<i32>,
    e: Vec<i32>,
    f: Vec<i32>,
    h_prev: Vec<i32>,
    e_prev: Vec<i32>,
    f_prev: Vec<i32>,
    arrows: Vec<u8>,
    e_runs: Vec<u32>,
    f_runs: Vec<u32>,
    cols: usize,
}

const ARROW_E: u8 = 1; // horizontal: gap in query
const ARROW_DIAG: u8 = 2;
const ARROW_F: u8 = 4; // vertical: gap in subject

impl SemiGlobalAligner {
    /// `gap_open` is the cost of a length-1 gap, `gap_ext` the cost of each
    /// further gap base; both are positive penalties.
    pub fn new(gap_open: i32, gap_ext: i32) -> SemiGlobalAligner {
        SemiGlobalAligner {
            gap_open,
            gap_ext,
            h: Vec::new(),
            e: Vec::new(),
            f: Vec::new(),
            h_prev: Vec::new(),
            e_prev: Vec::new(),
            f_prev: Vec::new(),
            arrows: Vec::new(),
            e_runs: Vec::new(),
            f_runs: Vec::new(),
            cols: 0,
        }
    }

    fn reserve(&mut self, qlen: usize, slen: usize, with_traceback: bool) {
        let cols = slen + 1;
        self.cols = cols;
        for row in [&mut self.h, &mut self.e, &mut self.f, &mut self.h_prev, &mut self.e_prev, &mut self.f_prev] {
            row.clear();
            row.resize(cols, 0);
        }
        if with_traceback {
            let cells = (qlen + 1) * cols;
            self.arrows.clear();
            self.arrows.resize(cells, 0);
            self.e_runs.clear();
            self.e_runs.resize(cells, 1);
            self.f_runs.clear();
            self.f_runs.resize(cells, 1);
        }
    }

    /// Aligns `query` against `subject` (both alignment-encoded) and fills
    /// CIGAR and identity fields when `traceback` is set.
    pub fn align(&mut self, query: &[u8], subject: &[u8], traceback: bool) -> AlignmentOutcome {
        let n = query.len();
        let m = subject.len();
        let mut out = AlignmentOutcome::default();
        if n == 0 || m == 0 {
            return out;
        }
        self.reserve(n, m, traceback);

        // free leading gaps on both sequences
        for j in 0..=m {
            self.h[j] = 0;
            self.e[j] = NEG_INF;
            self.f[j] = NEG_INF;
        }

        let mut best = (0i32, 0usize, 0usize); // (score, i, j), end on last row/col only
        best.0 = NEG_INF;

        for i in 1..=n {
            std::mem::swap(&mut self.h, &mut self.h_prev);
            std::mem::swap(&mut self.e, &mut self.e_prev);
            std::mem::swap(&mut self.f, &mut self.f_prev);
            self.h[0] = 0;
            self.e[0] = NEG_INF;
            self.f[0] = NEG_INF;

            for j in 1..=m {
                // horizontal gap (consumes subject, gap in query)
                let e_ext = self.e[j - 1].saturating_sub(self.gap_ext);
                let e_open =
                    self.h[j - 1].max(self.f[j - 1]).saturating_sub(self.gap_open);
                self.e[j] = e_ext.max(e_open);

                // vertical gap (consumes query, gap in subject)
                let f_ext = self.f_prev[j].saturating_sub(self.gap_ext);
                let f_open =
                    self.h_prev[j].max(self.e_prev[j]).saturating_sub(self.gap_open);
                self.f[j] = f_ext.max(f_open);

                let diag = self.h_prev[j - 1] + NUC_MATRIX.score(query[i - 1], subject[j - 1]);
                self.h[j] = diag.max(self.e[j]).max(self.f[j]);

                if traceback {
                    let cell = i * self.cols + j;
                    let mut flags = 0u8;
                    if self.h[j] == self.e[j] {
                        flags |= ARROW_E;
                    }
                    if self.h[j] == diag {
                        flags |= ARROW_DIAG;
                    }
                    if self.h[j] == self.f[j] {
                        flags |= ARROW_F;
                    }
                    self.arrows[cell] = flags;
                    if self.e[j] == e_ext {
                        self.e_runs[cell] = self.e_runs[cell - 1] + 1;
                    }
                    if self.f[j] == f_ext {
                        self.f_runs[cell] = self.f_runs[cell - self.cols] + 1;
                    }
                }

                // free trailing gaps: the alignment may end on the last row
                // or the last column
                if (i == n || j == m) && self.h[j] > best.0 {
                    best = (self.h[j], i, j);
                }
            }
        }

        out.score = best.0;
        out.q_end = best.1 as u32;
        out.s_end = best.2 as u32;

        if !traceback {
            // starts stay approximate (the caller keeps its chain estimates)
            return out;
        }

        // ---------- traceback
        let (mut i, mut j) = (best.1, best.2);
        let mut ops: Vec<(u8, u32)> = Vec::new();
        let push_op = |ops: &mut Vec<(u8, u32)>, op: u8, len: u32| {
            match ops.last_mut() {
                Some((last, count)) if *last == op => *count += len,
                _ => ops.push((op, len)),
            }
        };

        while i > 0 && j > 0 {
            let cell = i * self.cols + j;
            let flags = self.arrows[cell];
            if flags & ARROW_DIAG != 0 {
                let op = if query[i - 1] < 4 && query[i - 1] == subject[j - 1] {
                    out.nident += 1;
                    b'='
                } else {
                    out.nmismatch += 1;
                    b'X'
                };
                push_op(&mut ops, op, 1);
                out.aln_len += 1;
                i -= 1;
                j -= 1;
            } else if flags & ARROW_E != 0 {
                let run = self.e_runs[cell].min(j as u32);
                push_op(&mut ops, b'D', run);
                out.aln_len += run;
                j -= run as usize;
            } else if flags & ARROW_F != 0 {
                let run = self.f_runs[cell].min(i as u32);
                push_op(&mut ops, b'I', run);
                out.aln_len += run;
                i -= run as usize;
            } else {
                unreachable!("H is the max of its three sources, one arrow must be set");
            }
        }

        out.q_start = i as u32;
        out.s_start = j as u32;

        ops.reverse();
        let mut cigar = String::new();
        for (op, len) in ops {
            cigar.push_str(&len.to_string());
            cigar.push(op as char);
        }
        out.cigar = cigar;
        out
    }
}

/// Work order of one hit inside [`run_stage3`].
struct AlignJob {
    hit_idx: usize,
    query_idx: usize,
    is_reverse: bool,
    subject: Vec<u8>,
    ext_start: u32,
}

/// Runs the alignment stage over merged stage-2 hits.
///
/// `sources` holds one reference-base source per volume, in volume order.
/// Hits whose accession or query cannot be resolved, or whose reference
/// fetch fails, are dropped with a warning; everything else is re-scored and,
/// with traceback, filtered by `min_pident` / `min_nident`.
pub fn run_stage3(
    hits: Vec<OutputHit>,
    queries: &[FastaRecord],
    sources: &[&dyn SequenceSource],
    config: &Stage3Config,
) -> Vec<OutputHit> {
    if hits.is_empty() {
        return hits;
    }

    // accession -> (source index, oid)
    let mut acc_map: HashMap<String, (usize, u32)> = HashMap::new();
    for (si, source) in sources.iter().enumerate() {
        for oid in 0..source.num_sequences() {
            let acc = source.accession(oid);
            if !acc.is_empty() {
                acc_map.entry(acc.to_string()).or_insert((si, oid));
            }
        }
    }
    let query_map: HashMap<&str, usize> =
        queries.iter().enumerate().map(|(i, q)| (q.id.as_str(), i)).collect();

    // ---------- fetch pass: pull context-extended subject windows
    let jobs: Vec<AlignJob> = hits
        .par_iter()
        .enumerate()
        .filter_map(|(hit_idx, hit)| {
            let Some(&(si, oid)) = acc_map.get(&hit.accession) else {
                warn!("accession '{}' not found in any reference source, dropping hit", hit.accession);
                return None;
            };
            let Some(&query_idx) = query_map.get(hit.query_id.as_str()) else {
                warn!("query '{}' missing from the query set, dropping hit", hit.query_id);
                return None;
            };
            let seq_len = sources[si].sequence_length(oid);
            let ctx = config.context.resolve(queries[query_idx].sequence.len() as u32);
            let ext_start = hit.s_start.saturating_sub(ctx);
            let ext_end = (hit.s_end.saturating_add(ctx)).min(seq_len.saturating_sub(1));
            if ext_start > ext_end {
                return None;
            }
            let text = match sources[si].sequence_text(oid) {
                Ok(text) => text,
                Err(e) => {
                    warn!("reference fetch failed for '{}': {}, dropping hit", hit.accession, e);
                    return None;
                }
            };
            let window = &text[ext_start as usize..(ext_end as usize + 1).min(text.len())];
            if window.is_empty() {
                return None;
            }
            Some(AlignJob {
                hit_idx,
                query_idx,
                is_reverse: hit.strand == '-',
                subject: encode_for_alignment(window),
                ext_start,
            })
        })
        .collect();

    // ---------- one profile per (query, strand)
    let mut profiles: HashMap<(usize, bool), Vec<u8>> = HashMap::new();
    for job in &jobs {
        profiles.entry((job.query_idx, job.is_reverse)).or_insert_with(|| {
            let seq = &queries[job.query_idx].sequence;
            if job.is_reverse {
                encode_for_alignment(&reverse_complement(seq))
            } else {
                encode_for_alignment(seq)
            }
        });
    }
    debug!("stage 3: aligning {} hit(s), {} profile(s)", jobs.len(), profiles.len());

    // ---------- compute pass
    let outcomes: Vec<(usize, AlignmentOutcome)> = jobs
        .par_iter()
        .map_init(
            || SemiGlobalAligner::new(config.gap_open, config.gap_ext),
            |aligner, job| {
                let profile = &profiles[&(job.query_idx, job.is_reverse)];
                let outcome = aligner.align(profile, &job.subject, config.traceback);
                (job.hit_idx, outcome)
            },
        )
        .collect();

    let mut aligned: HashMap<usize, (u32, AlignmentOutcome)> = HashMap::new();
    for ((hit_idx, outcome), job) in outcomes.into_iter().zip(jobs.iter()) {
        aligned.insert(hit_idx, (job.ext_start, outcome));
    }

    let mut kept = Vec::with_capacity(hits.len());
    for (idx, mut hit) in hits.into_iter().enumerate() {
        let Some((ext_start, outcome)) = aligned.remove(&idx) else { continue };
        hit.aln_score = outcome.score;
        hit.q_end = outcome.q_end;
        hit.s_end = ext_start + outcome.s_end;
        if config.traceback {
            hit.q_start = outcome.q_start;
            hit.s_start = ext_start + outcome.s_start;
            hit.cigar = outcome.cigar;
            hit.nident = outcome.nident;
            hit.nmismatch = outcome.nmismatch;
            hit.pident = if outcome.aln_len > 0 {
                100.0 * f64::from(outcome.nident) / f64::from(outcome.aln_len)
            } else {
                0.0
            };
            if config.min_pident > 0.0 && hit.pident < config.min_pident {
                continue;
            }
            if config.min_nident > 0 && hit.nident < config.min_nident {
                continue;
            }
        }
        kept.push(hit);
    }
    kept
}
