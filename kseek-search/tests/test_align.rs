use kseek_core::source::MemorySource;
use kseek_core::types::OutputHit;
use kseek_io::FastaRecord;
use kseek_search::align::{
    encode_for_alignment, reverse_complement, run_stage3, SemiGlobalAligner,
};
use kseek_search::config::{ContextParam, Stage3Config};

fn aligner() -> SemiGlobalAligner {
    SemiGlobalAligner::new(10, 1)
}

#[test]
fn reverse_complement_basics() {
    assert_eq!(reverse_complement("ACGT"), "ACGT");
    assert_eq!(reverse_complement("AACG"), "CGTT");
    assert_eq!(reverse_complement("AAAA"), "TTTT");
    assert_eq!(reverse_complement("ACGTN"), "NACGT");
}

#[test]
fn exact_match_scores_full_identity() {
    let q = encode_for_alignment("ACGTACGTACGTACGTACGTACGTACGTACGT");
    let out = aligner().align(&q, &q, true);
    assert_eq!(out.score, 5 * 32);
    assert_eq!(out.cigar, "32=");
    assert_eq!(out.nident, 32);
    assert_eq!(out.nmismatch, 0);
    assert_eq!(out.aln_len, 32);
    assert_eq!((out.q_start, out.q_end), (0, 32));
    assert_eq!((out.s_start, out.s_end), (0, 32));
}

#[test]
fn single_mismatch_is_an_x_run() {
    let q = encode_for_alignment("ACGTACGT");
    let s = encode_for_alignment("ACGAACGT");
    let out = aligner().align(&q, &s, true);
    assert_eq!(out.cigar, "3=1X4=");
    assert_eq!(out.nident, 7);
    assert_eq!(out.nmismatch, 1);
    assert_eq!(out.score, 7 * 5 - 4);
}

#[test]
fn free_end_gaps_let_a_short_query_float() {
    let q = encode_for_alignment("ACGT");
    let s = encode_for_alignment("TTTTACGTTTTT");
    let out = aligner().align(&q, &s, true);
    assert_eq!(out.score, 20);
    assert_eq!(out.cigar, "4=");
    assert_eq!((out.q_start, out.q_end), (0, 4));
    assert_eq!((out.s_start, out.s_end), (4, 8));
}

#[test]
fn subject_insertion_costs_one_gap_open() {
    let q = encode_for_alignment("ACGTACGT");
    let s = encode_for_alignment("ACGTTACGT");
    let out = aligner().align(&q, &s, true);
    assert_eq!(out.score, 8 * 5 - 10);
    // the gap may sit at either end of the run of Ts; identity is what matters
    assert!(out.cigar.contains("1D"), "cigar was {}", out.cigar);
    assert_eq!(out.nident, 8);
    assert_eq!(out.nmismatch, 0);
    assert_eq!(out.aln_len, 9);
}

#[test]
fn query_insertion_costs_one_gap_open() {
    let q = encode_for_alignment("ACGTAACGT");
    let s = encode_for_alignment("ACGTACGT");
    let out = aligner().align(&q, &s, true);
    assert_eq!(out.score, 8 * 5 - 10);
    // one query base sits over a gap
    assert!(out.cigar.contains('I'), "cigar was {}", out.cigar);
    assert_eq!(out.nident, 8);
}

#[test]
fn score_only_mode_reports_ends() {
    let q = encode_for_alignment("ACGT");
    let s = encode_for_alignment("TTTTACGTTTTT");
    let out = aligner().align(&q, &s, false);
    assert_eq!(out.score, 20);
    assert_eq!(out.q_end, 4);
    assert_eq!(out.s_end, 8);
    assert!(out.cigar.is_empty());
}

fn stage3_fixture() -> (Vec<FastaRecord>, MemorySource) {
    let reference = "TTTTTTTTTTACGTACGTACGTACGTACGTACGTACGTACGTTTTTTTTT";
    let queries = vec![FastaRecord {
        id: "q1".to_string(),
        sequence: "ACGTACGTACGTACGTACGTACGTACGTACGT".to_string(),
    }];
    let source = MemorySource::from_named(&[("REF_1", reference)]);
    (queries, source)
}

fn stage2_hit() -> OutputHit {
    OutputHit {
        query_id: "q1".to_string(),
        accession: "REF_1".to_string(),
        strand: '+',
        q_start: 0,
        q_end: 32,
        s_start: 10,
        s_end: 42,
        score: 26,
        stage1_score: 26,
        volume: 0,
        q_length: 32,
        s_length: 50,
        ..Default::default()
    }
}

#[test]
fn stage3_traceback_refines_and_measures_identity() {
    let (queries, source) = stage3_fixture();
    let config = Stage3Config { traceback: true, ..Default::default() };
    let hits = run_stage3(vec![stage2_hit()], &queries, &[&source], &config);
    assert_eq!(hits.len(), 1);
    let h = &hits[0];
    assert_eq!(h.aln_score, 160);
    assert_eq!(h.cigar, "32=");
    assert_eq!(h.nident, 32);
    assert_eq!(h.nmismatch, 0);
    assert!((h.pident - 100.0).abs() < 1e-9);
    assert_eq!((h.q_start, h.q_end), (0, 32));
    assert_eq!((h.s_start, h.s_end), (10, 42));
}

#[test]
fn stage3_context_extension_still_finds_the_match() {
    let (queries, source) = stage3_fixture();
    let config = Stage3Config {
        traceback: true,
        context: ContextParam::Absolute(10),
        ..Default::default()
    };
    let hits = run_stage3(vec![stage2_hit()], &queries, &[&source], &config);
    assert_eq!(hits.len(), 1);
    assert_eq!((hits[0].s_start, hits[0].s_end), (10, 42));
    assert_eq!(hits[0].cigar, "32=");
}

#[test]
fn stage3_identity_filters_drop_weak_hits() {
    let (queries, source) = stage3_fixture();
    let config = Stage3Config { traceback: true, min_nident: 33, ..Default::default() };
    let hits = run_stage3(vec![stage2_hit()], &queries, &[&source], &config);
    assert!(hits.is_empty());

    let config = Stage3Config { traceback: true, min_pident: 99.0, ..Default::default() };
    let hits = run_stage3(vec![stage2_hit()], &queries, &[&source], &config);
    assert_eq!(hits.len(), 1);
}

#[test]
fn stage3_drops_unresolvable_hits_quietly() {
    let (queries, source) = stage3_fixture();
    let mut orphan = stage2_hit();
    orphan.accession = "NOT_THERE".to_string();
    let config = Stage3Config { traceback: true, ..Default::default() };
    let hits = run_stage3(vec![stage2_hit(), orphan], &queries, &[&source], &config);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].accession, "REF_1");
}

#[test]
fn stage3_minus_strand_aligns_the_reverse_complement() {
    // reference holds the reverse complement of the query
    let query_seq = "ACCGGTTACCGGTTAACCGGTTAACCGGTTAA";
    let rc = reverse_complement(query_seq);
    let reference = format!("GGGGGGGGGG{}GGGGGGGGGG", rc);
    let queries =
        vec![FastaRecord { id: "q1".to_string(), sequence: query_seq.to_string() }];
    let source = MemorySource::from_named(&[("REF_RC", &reference)]);

    let mut hit = stage2_hit();
    hit.accession = "REF_RC".to_string();
    hit.strand = '-';
    hit.s_start = 10;
    hit.s_end = 42;
    hit.s_length = reference.len() as u32;

    let config = Stage3Config { traceback: true, ..Default::default() };
    let hits = run_stage3(vec![hit], &queries, &[&source], &config);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].cigar, "32=");
    assert!((hits[0].pident - 100.0).abs() < 1e-9);
}
