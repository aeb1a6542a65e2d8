use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use kseek_core::source::MemorySource;
use kseek_core::types::OutputHit;
use kseek_index::builder::{build_volume, IndexBuilderConfig};
use kseek_index::discovery::{discover_volumes, index_file_stem, khx_path_for};
use kseek_index::highfreq::filter_volumes;
use kseek_index::kvx::write_kvx;
use kseek_index::KhxReader;
use kseek_io::FastaRecord;
use kseek_search::align::run_stage3;
use kseek_search::{
    finalize_results, run_search, SearchConfig, SearchMode, SortScore, StrandChoice, VolumeHandle,
};

const S1: &str = "ACGTACGTACGTACGTACGTACGTACGTACGT"; // 32 bases, period 4

fn config() -> SearchConfig {
    let mut c = SearchConfig::default();
    c.stage1.min_score_frac = 0.0;
    c.stage1.min_score = 1;
    c.stage1.max_freq = 100_000; // tiny test volumes never hit the cutoff
    c.stage1.max_freq_frac = 0.0;
    c
}

fn query(id: &str, seq: &str) -> FastaRecord {
    FastaRecord { id: id.to_string(), sequence: seq.to_string() }
}

/// Builds one volume per sequence set, writes the manifest and opens handles.
fn build_db(
    dir: &Path,
    db: &str,
    k: usize,
    volumes: &[&[(&str, &str)]],
) -> Vec<VolumeHandle> {
    let mut basenames = vec![];
    for (vi, seqs) in volumes.iter().enumerate() {
        let basename = format!("{}.{:02}", db, vi);
        let source = MemorySource::from_named(seqs);
        let prefix = index_file_stem(dir, &basename, k);
        let cfg = IndexBuilderConfig { k, ..Default::default() };
        build_volume(&source, &cfg, &prefix, db).unwrap();
        basenames.push(basename);
    }
    let mut kvx = index_file_stem(dir, db, k).into_os_string();
    kvx.push(".kvx");
    write_kvx(Path::new(&kvx), db, &basenames).unwrap();

    let prefix = dir.join(db);
    let discovered = discover_volumes(prefix.to_str().unwrap(), k);
    assert_eq!(discovered.len(), volumes.len());
    discovered.iter().map(|dv| VolumeHandle::open(dv, true).unwrap()).collect()
}

fn search(
    queries: &[FastaRecord],
    vols: &[VolumeHandle],
    k: usize,
    config: &SearchConfig,
    threads: usize,
) -> Vec<OutputHit> {
    let abort = AtomicBool::new(false);
    run_search(queries, vols, None, k, config, threads, &abort).unwrap().hits
}

#[test]
fn identical_query_chains_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let vols = build_db(dir.path(), "e1", 7, &[&[("REF_1", S1)]]);

    let mut cfg = config();
    cfg.strand = StrandChoice::Plus;
    let hits = search(&[query("q1", S1)], &vols, 7, &cfg, 0);

    assert_eq!(hits.len(), 1);
    let h = &hits[0];
    assert_eq!(h.accession, "REF_1");
    assert_eq!(h.strand, '+');
    assert_eq!(h.q_start, 0);
    assert_eq!(h.q_end, 32);
    assert_eq!(h.s_start, 0);
    assert_eq!(h.s_end, 32);
    assert_eq!(h.score, 32 - 7 + 1);
    assert_eq!(h.stage1_score, 26);
    assert_eq!(h.q_length, 32);
    assert_eq!(h.s_length, 32);
}

#[test]
fn reverse_complement_query_hits_the_minus_strand() {
    let dir = tempfile::tempdir().unwrap();
    let vols = build_db(dir.path(), "e2", 7, &[&[("REF_1", S1)]]);

    // S1 is (ACGT)^8, so its reverse complement is S1 itself; restricting to
    // the minus strand forces the hit through the rc k-mer list
    let rc_query = kseek_search::align::reverse_complement(S1);
    assert_eq!(rc_query, S1);

    let mut cfg = config();
    cfg.strand = StrandChoice::Minus;
    let hits = search(&[query("q1", &rc_query)], &vols, 7, &cfg, 0);

    assert_eq!(hits.len(), 1);
    let h = &hits[0];
    assert_eq!(h.strand, '-');
    assert_eq!(h.score, 26);
    assert_eq!(h.q_start, 0);
    assert_eq!(h.q_end, 32);
    assert_eq!(h.s_start, 0);
    assert_eq!(h.s_end, 32);
}

#[test]
fn distinct_minus_strand_match_is_found() {
    // a non-palindromic reference; the query is its reverse complement
    let reference = "AACCGGTTACGATCGATTACCGGATCGATCGA";
    let rc_query = kseek_search::align::reverse_complement(reference);
    assert_ne!(rc_query, reference);

    let dir = tempfile::tempdir().unwrap();
    let vols = build_db(dir.path(), "rc", 7, &[&[("REF_RC", reference)]]);

    let hits = search(&[query("q1", &rc_query)], &vols, 7, &config(), 0);
    let minus: Vec<&OutputHit> = hits.iter().filter(|h| h.strand == '-').collect();
    assert_eq!(minus.len(), 1);
    let h = minus[0];
    assert_eq!(h.score, (reference.len() - 7 + 1) as u32);
    assert_eq!(h.q_start, 0);
    assert_eq!(h.q_end, reference.len() as u32);
    assert_eq!(h.s_start, 0);
    assert_eq!(h.s_end, reference.len() as u32);
}

#[test]
fn poly_a_query_matches_only_the_poly_a_reference() {
    let dir = tempfile::tempdir().unwrap();
    let a100: String = "A".repeat(100);
    let acgt100: String = "ACGT".repeat(25);
    let vols = build_db(
        dir.path(),
        "e3",
        5,
        &[&[("POLY_A", a100.as_str()), ("MIXED", acgt100.as_str())]],
    );

    let hits = search(&[query("q1", "AAAAA")], &vols, 5, &config(), 0);
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.accession == "POLY_A"));
    // one valid window in the query: chains cannot stack hits at one q_pos
    assert!(hits.iter().all(|h| h.score == 1));
}

#[test]
fn split_query_hits_both_volumes() {
    let left = "ACGTTGCAACGGTTAACCGGTTAACCGTTGCA";
    let right = "TGATCCAGTGATCACGATATCGCAGTTCTGAT";
    let dir = tempfile::tempdir().unwrap();
    let vols =
        build_db(dir.path(), "e4", 7, &[&[("LEFT", left)], &[("RIGHT", right)]]);

    let combined = format!("{}{}", left, right);
    let mut cfg = config();
    cfg.strand = StrandChoice::Plus;
    cfg.num_results = 0;
    let hits = search(&[query("q1", &combined)], &vols, 7, &cfg, 0);

    let volumes: BTreeSet<u16> = hits.iter().map(|h| h.volume).collect();
    assert_eq!(volumes, BTreeSet::from([0, 1]));
    let left_hit = hits.iter().find(|h| h.accession == "LEFT").unwrap();
    assert_eq!(left_hit.q_start, 0);
    let right_hit = hits.iter().find(|h| h.accession == "RIGHT").unwrap();
    assert_eq!(right_hit.q_start, 32);
}

#[test]
fn build_time_exclusion_silences_poly_a_queries() {
    let dir = tempfile::tempdir().unwrap();
    let k = 5;
    let a100: String = "A".repeat(100);
    let mixed = "ACGTTGCAACGGTTAACCGGTTAACCGTTGCA";
    let vols_seqs: &[&[(&str, &str)]] = &[&[("POLY_A", a100.as_str()), ("MIXED", mixed)]];
    drop(build_db(dir.path(), "e5", k, vols_seqs)); // build files, close handles

    // exclude anything with more than 20 postings across the database
    let prefix = index_file_stem(dir.path(), "e5.00", k);
    let khx_path = khx_path_for(dir.path(), "e5", k);
    filter_volumes(&[prefix], &khx_path, k, 20).unwrap();
    let khx = KhxReader::open(&khx_path).unwrap();
    assert!(khx.is_excluded(0)); // AAAAA

    let discovered = discover_volumes(dir.path().join("e5").to_str().unwrap(), k);
    let vols: Vec<VolumeHandle> =
        discovered.iter().map(|dv| VolumeHandle::open(dv, true).unwrap()).collect();

    let abort = AtomicBool::new(false);
    let outcome = run_search(
        &[query("q1", &"A".repeat(40))],
        &vols,
        Some(&khx),
        k,
        &config(),
        0,
        &abort,
    )
    .unwrap();
    assert!(outcome.hits.is_empty());

    // the mixed reference is still searchable
    let outcome =
        run_search(&[query("q2", mixed)], &vols, Some(&khx), k, &config(), 0, &abort).unwrap();
    assert!(outcome.hits.iter().any(|h| h.accession == "MIXED"));
}

#[test]
fn stage1_only_mode_reports_scores_without_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let vols = build_db(dir.path(), "e6", 7, &[&[("REF_1", S1)]]);

    let mut cfg = config();
    cfg.mode = SearchMode::Stage1Only;
    cfg.sort_score = SortScore::Stage1;
    let hits = search(&[query("q1", S1)], &vols, 7, &cfg, 0);

    assert!(!hits.is_empty());
    for h in &hits {
        assert_eq!(h.q_start, 0);
        assert_eq!(h.q_end, 0);
        assert_eq!(h.s_start, 0);
        assert_eq!(h.s_end, 0);
        assert_eq!(h.score, 0);
        assert!(h.stage1_score > 0);
    }
}

fn hit_tuple(h: &OutputHit) -> (String, String, char, u32, u32, u32, u32, u32, u16) {
    (
        h.query_id.clone(),
        h.accession.clone(),
        h.strand,
        h.q_start,
        h.q_end,
        h.s_start,
        h.s_end,
        h.score,
        h.volume,
    )
}

#[test]
fn parallel_search_equals_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let left = "ACGTTGCAACGGTTAACCGGTTAACCGTTGCA";
    let right = "TGATCCAGTGATCACGATATCGCAGTTCTGAT";
    let vols = build_db(
        dir.path(),
        "p10",
        7,
        &[&[("L_0", left), ("L_1", S1)], &[("R_0", right)]],
    );

    let queries = vec![
        query("q1", S1),
        query("q2", left),
        query("q3", right),
        query("q4", &format!("{}{}", left, right)),
        query("q5", &kseek_search::align::reverse_complement(left)),
        query("q6", "TTTTTTTT"),
    ];

    let baseline: BTreeSet<_> =
        search(&queries, &vols, 7, &config(), 1).iter().map(hit_tuple).collect();
    assert!(!baseline.is_empty());
    for threads in [2usize, 4, 8] {
        let got: BTreeSet<_> =
            search(&queries, &vols, 7, &config(), threads).iter().map(hit_tuple).collect();
        assert_eq!(got, baseline, "threads={}", threads);
    }
}

#[test]
fn num_results_caps_each_query() {
    let dir = tempfile::tempdir().unwrap();
    // three references share the query's content to different degrees
    let vols = build_db(
        dir.path(),
        "cap",
        7,
        &[&[
            ("FULL", S1),
            ("HALF", &S1[0..16]),
            ("QUARTER", &S1[0..12]),
        ]],
    );

    let mut cfg = config();
    cfg.strand = StrandChoice::Plus;
    cfg.num_results = 1;
    let mut hits = search(&[query("q1", S1)], &vols, 7, &cfg, 0);
    finalize_results(&mut hits, &cfg);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].accession, "FULL");
}

#[test]
fn alignment_ranking_defers_truncation_until_after_stage3() {
    // GAPPY carries the query's six blocks spread over long runs of Ts: many
    // chainable k-mer hits, but any alignment pays for the gaps. EXACT is a
    // verbatim copy of the query's first 14 bases: a shorter chain that
    // aligns perfectly. Ranking by alignment score must therefore let both
    // candidates reach stage 3; a per-volume cut by chain score would keep
    // only GAPPY and hide the true winner.
    let blocks = ["ACGCATAG", "GACTGACC", "CATTGCAG", "GTCAGGAA", "CCGATAGC", "TGGCACGA"];
    let query_seq: String = blocks.concat();
    let gappy = blocks.join(&"T".repeat(90));
    let exact = &query_seq[..14];

    let dir = tempfile::tempdir().unwrap();
    let seqs: &[&[(&str, &str)]] = &[&[("GAPPY", gappy.as_str()), ("EXACT", exact)]];
    let vols = build_db(dir.path(), "rank", 7, seqs);

    let mut cfg = config();
    cfg.mode = SearchMode::Align;
    cfg.sort_score = SortScore::Alignment;
    cfg.strand = StrandChoice::Plus;
    cfg.num_results = 1;

    let queries = vec![query("q1", &query_seq)];
    let hits = search(&queries, &vols, 7, &cfg, 0);

    // both candidates survive to the alignment stage
    assert_eq!(hits.len(), 2);
    let gappy_chain = hits.iter().find(|h| h.accession == "GAPPY").unwrap().score;
    let exact_chain = hits.iter().find(|h| h.accession == "EXACT").unwrap().score;
    assert!(
        gappy_chain > exact_chain,
        "scenario needs the weaker alignment to hold the stronger chain ({} vs {})",
        gappy_chain,
        exact_chain
    );

    let source = MemorySource::from_named(seqs[0]);
    let mut refined = run_stage3(hits, &queries, &[&source], &cfg.stage3);
    assert_eq!(refined.len(), 2);
    let gappy_aln = refined.iter().find(|h| h.accession == "GAPPY").unwrap().aln_score;
    let exact_aln = refined.iter().find(|h| h.accession == "EXACT").unwrap().aln_score;
    assert!(exact_aln > gappy_aln, "{} vs {}", exact_aln, gappy_aln);

    finalize_results(&mut refined, &cfg);
    assert_eq!(refined.len(), 1);
    assert_eq!(refined[0].accession, "EXACT");
}

#[test]
fn query_without_valid_kmers_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let vols = build_db(dir.path(), "novalid", 7, &[&[("REF_1", S1)]]);

    // too short, and nothing but unknown characters
    let hits = search(&[query("short", "ACGT"), query("junk", "XXXXXXXXXXXX")], &vols, 7, &config(), 0);
    assert!(hits.is_empty());
}

#[test]
fn degenerate_queries_can_be_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let vols = build_db(dir.path(), "degen", 7, &[&[("REF_1", S1)]]);

    let mut cfg = config();
    cfg.accept_qdegen = false;
    let abort = AtomicBool::new(false);
    let outcome = run_search(
        &[query("amb", "ACGTNACGTACGTACGT"), query("clean", S1)],
        &vols,
        None,
        7,
        &cfg,
        0,
        &abort,
    )
    .unwrap();

    assert_eq!(outcome.skipped_queries, vec!["amb".to_string()]);
    assert!(outcome.hits.iter().all(|h| h.query_id == "clean"));
    assert!(!outcome.hits.is_empty());

    // with acceptance on, the ambiguous query expands and still matches
    cfg.accept_qdegen = true;
    let accepted = run_search(
        &[query("amb", "ACGTNACGTACGTACGT")],
        &vols,
        None,
        7,
        &cfg,
        0,
        &abort,
    )
    .unwrap();
    assert!(accepted.skipped_queries.is_empty());
    assert!(accepted.hits.iter().any(|h| h.query_id == "amb"));
}

#[test]
fn preset_abort_flag_yields_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let vols = build_db(dir.path(), "abort", 7, &[&[("REF_1", S1)]]);

    let abort = AtomicBool::new(true);
    let outcome = run_search(&[query("q1", S1)], &vols, None, 7, &config(), 0, &abort).unwrap();
    // cancellation is not an error; whatever was merged comes back
    assert!(outcome.hits.is_empty());
}

#[test]
fn matchscore_counts_repeated_occurrences() {
    let dir = tempfile::tempdir().unwrap();
    // the query k-mer block appears twice in the reference
    let reference = "AACCGGTTACGTTTTTTTTTTAACCGGTTACG";
    let vols = build_db(dir.path(), "ms", 7, &[&[("TWICE", reference)]]);

    let mut cover_cfg = config();
    cover_cfg.mode = SearchMode::Stage1Only;
    cover_cfg.sort_score = SortScore::Stage1;
    cover_cfg.strand = StrandChoice::Plus;
    let cover = search(&[query("q1", "AACCGGTTACG")], &vols, 7, &cover_cfg, 0);

    let mut match_cfg = cover_cfg.clone();
    match_cfg.stage1.score_type = kseek_search::Stage1ScoreType::Matchscore;
    let matches = search(&[query("q1", "AACCGGTTACG")], &vols, 7, &match_cfg, 0);

    assert_eq!(cover.len(), 1);
    assert_eq!(matches.len(), 1);
    assert_eq!(cover[0].stage1_score, 5); // five distinct query positions
    assert_eq!(matches[0].stage1_score, 10); // each occurs twice in the reference
    assert!(matches[0].stage1_score >= cover[0].stage1_score);
}

#[test]
fn mode3_end_to_end_produces_perfect_identity() {
    let dir = tempfile::tempdir().unwrap();
    let seqs: &[&[(&str, &str)]] = &[&[("REF_1", S1)]];
    let vols = build_db(dir.path(), "m3", 7, seqs);

    let mut cfg = config();
    cfg.mode = SearchMode::Align;
    cfg.sort_score = SortScore::Alignment;
    cfg.strand = StrandChoice::Plus;
    cfg.stage3.traceback = true;

    let queries = vec![query("q1", S1)];
    let hits = search(&queries, &vols, 7, &cfg, 0);
    assert_eq!(hits.len(), 1);

    let source = MemorySource::from_named(seqs[0]);
    let refined = run_stage3(hits, &queries, &[&source], &cfg.stage3);
    assert_eq!(refined.len(), 1);
    let h = &refined[0];
    assert_eq!(h.aln_score, 160);
    assert_eq!(h.cigar, "32=");
    assert_eq!(h.nident, 32);
    assert_eq!(h.nmismatch, 0);
    assert!((h.pident - 100.0).abs() < 1e-9);
    assert_eq!((h.q_start, h.q_end), (0, 32));
    assert_eq!((h.s_start, h.s_end), (0, 32));
}
