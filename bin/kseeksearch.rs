use std::env;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use log::{error, info, warn};

use kseek_core::source::SequenceSource;
use kseek_index::discovery::{discover_k_values, discover_volumes, khx_path_for, parse_index_prefix};
use kseek_index::KhxReader;
use kseek_io::{open_fasta_source, out_writer, read_fasta, read_seqidlist, write_results_tab};
use kseek_search::align::run_stage3;
use kseek_search::config::ContextParam;
use kseek_search::oid_filter::{OidFilter, OidFilterMode};
use kseek_search::{
    finalize_results, run_search, SearchConfig, SearchMode, SortScore, Stage1ScoreType,
    StrandChoice, VolumeHandle,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Search kseek index volumes with FASTA queries
/// say kseeksearch -h to see options
struct Args {
    /// index prefix: directory plus database name
    #[clap(long, required = true)]
    ix: String,
    /// query FASTA file, `-` for stdin
    #[clap(short, long, required = true)]
    query: String,
    /// k-mer size; required only when several k values exist for the prefix
    #[clap(short, long, default_value_t = 0)]
    k: usize,
    /// output file (default: stdout)
    #[clap(short, long, default_value = "")]
    out: String,
    /// search threads; 0 uses all cores
    #[clap(long, default_value_t = 0)]
    threads: usize,
    /// 1 = stage 1 only, 2 = stage 1+2, 3 = stage 1+2+3
    #[clap(long, default_value_t = 2)]
    mode: u8,
    /// ranking score for output: 1 = stage-1 score, 2 = chain score,
    /// 3 = alignment score (0 = the deepest score the mode produces)
    #[clap(long, default_value_t = 0)]
    sort_score: u8,
    /// reference FASTA file(s) for mode 3 subject retrieval, in volume order
    #[clap(long, num_args = 0..)]
    db: Vec<String>,
    /// 1 = coverscore, 2 = matchscore
    #[clap(long, default_value_t = 1)]
    stage1_score: u8,
    /// stage-1 minimum score: an integer, or a fraction in (0,1) of the
    /// query's k-mer positions
    #[clap(long, default_value_t = 0.5)]
    stage1_min_score: f64,
    /// stage-1 candidate cap per volume, 0 = unlimited
    #[clap(long, default_value_t = 0)]
    stage1_topn: u32,
    /// high-frequency k-mer cutoff: >= 1 absolute, (0,1) fraction of the
    /// total sequence count, 0 = auto
    #[clap(long, default_value_t = 0.5)]
    stage1_max_freq: f64,
    /// minimum chain score, 0 = adaptive (the resolved stage-1 threshold)
    #[clap(long, default_value_t = 0)]
    stage2_min_score: u32,
    /// chaining diagonal gap tolerance
    #[clap(long, default_value_t = 100)]
    stage2_max_gap: u32,
    /// chaining DP lookback window, 0 = unlimited
    #[clap(long, default_value_t = 64)]
    stage2_max_lookback: u32,
    /// diagonal filter minimum hits
    #[clap(long, default_value_t = 1)]
    stage2_min_diag_hits: u32,
    /// maximum results per query, 0 = unlimited
    #[clap(long, default_value_t = 0)]
    num_results: u32,
    /// include only accessions listed in this file
    #[clap(long)]
    seqidlist: Option<String>,
    /// exclude accessions listed in this file
    #[clap(long)]
    negative_seqidlist: Option<String>,
    /// strand: 1 = plus, -1 = minus, 2 = both
    #[clap(long, default_value_t = 2, allow_hyphen_values = true)]
    strand: i8,
    /// accept queries with IUPAC ambiguity codes
    #[clap(long, default_value_t = 1)]
    accept_qdegen: u8,
    /// mode-3 context extension: integer bases, or a decimal multiplier of
    /// the query length
    #[clap(long, default_value = "0")]
    context: String,
    /// enable traceback in mode 3
    #[clap(long, default_value_t = 0)]
    stage3_traceback: u8,
    /// gap open penalty for mode 3
    #[clap(long, default_value_t = 10)]
    stage3_gapopen: i32,
    /// gap extension penalty for mode 3
    #[clap(long, default_value_t = 1)]
    stage3_gapext: i32,
    /// minimum percent identity filter for mode 3
    #[clap(long, default_value_t = 0.0)]
    stage3_min_pident: f64,
    /// minimum identical bases filter for mode 3
    #[clap(long, default_value_t = 0)]
    stage3_min_nident: u32,
    /// be more verbose and log program actions on the screen
    #[clap(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<SearchConfig, String> {
    let mut config = SearchConfig::default();
    config.mode = SearchMode::from_u8(args.mode).ok_or("mode must be 1, 2 or 3")?;
    config.sort_score = match args.sort_score {
        0 => SortScore::for_mode(config.mode),
        v => SortScore::from_u8(v).ok_or("sort_score must be 0, 1, 2 or 3")?,
    };
    config.strand =
        StrandChoice::from_i8(args.strand).ok_or("strand must be -1, 1 or 2")?;
    config.stage1.score_type =
        Stage1ScoreType::from_u8(args.stage1_score).ok_or("stage1_score must be 1 or 2")?;
    config.stage1.topn = args.stage1_topn;
    if args.stage1_min_score > 0.0 && args.stage1_min_score < 1.0 {
        config.stage1.min_score_frac = args.stage1_min_score;
        config.stage1.min_score = 0;
    } else {
        config.stage1.min_score_frac = 0.0;
        config.stage1.min_score = args.stage1_min_score as u32;
    }
    if args.stage1_max_freq > 0.0 && args.stage1_max_freq < 1.0 {
        config.stage1.max_freq = 0;
        config.stage1.max_freq_frac = args.stage1_max_freq;
    } else {
        config.stage1.max_freq = args.stage1_max_freq as u32;
        config.stage1.max_freq_frac = 0.0;
    }
    config.stage2.min_score = args.stage2_min_score;
    config.stage2.max_gap = args.stage2_max_gap;
    config.stage2.max_lookback = args.stage2_max_lookback;
    config.stage2.min_diag_hits = args.stage2_min_diag_hits;
    config.num_results = args.num_results;
    config.accept_qdegen = args.accept_qdegen != 0;
    config.stage3.gap_open = args.stage3_gapopen;
    config.stage3.gap_ext = args.stage3_gapext;
    config.stage3.traceback = args.stage3_traceback != 0;
    config.stage3.min_pident = args.stage3_min_pident;
    config.stage3.min_nident = args.stage3_min_nident;
    config.stage3.context =
        ContextParam::parse(&args.context).map_err(|e| e.to_string())?;
    Ok(config)
}

fn run(args: &Args) -> Result<i32, String> {
    if args.seqidlist.is_some() && args.negative_seqidlist.is_some() {
        return Err("seqidlist and negative_seqidlist are mutually exclusive".to_string());
    }
    let mut config = build_config(args)?;

    // ---------- resolve k and discover volumes
    let k = if args.k > 0 {
        args.k
    } else {
        let k_values = discover_k_values(&args.ix);
        match k_values.len() {
            0 => return Err(format!("no index files found for prefix '{}'", args.ix)),
            1 => k_values[0],
            _ => {
                return Err(format!(
                    "multiple k-mer sizes found ({:?}); pass -k to select one",
                    k_values
                ))
            }
        }
    };
    config.validate(k).map_err(|e| e.to_string())?;

    let discovered = discover_volumes(&args.ix, k);
    if discovered.is_empty() {
        return Err(format!("no index files found for prefix '{}' with k={}", args.ix, k));
    }
    info!("found {} volume(s), k={}", discovered.len(), k);

    // ---------- queries
    let queries =
        read_fasta(&args.query).map_err(|e| format!("cannot read '{}': {}", args.query, e))?;
    if queries.is_empty() {
        return Err("no query sequences found".to_string());
    }
    info!("read {} query sequence(s)", queries.len());

    // ---------- accession filter
    let (seqids, filter_mode) = if let Some(path) = &args.seqidlist {
        (read_seqidlist(path), OidFilterMode::Include)
    } else if let Some(path) = &args.negative_seqidlist {
        (read_seqidlist(path), OidFilterMode::Exclude)
    } else {
        (Vec::new(), OidFilterMode::None)
    };

    // ---------- open volumes
    let with_kpx = config.mode != SearchMode::Stage1Only;
    let mut volumes = Vec::with_capacity(discovered.len());
    for dv in &discovered {
        let mut vol = VolumeHandle::open(dv, with_kpx).map_err(|e| e.to_string())?;
        if filter_mode != OidFilterMode::None {
            vol.filter = OidFilter::build(&seqids, &vol.ksx, filter_mode);
        }
        volumes.push(vol);
    }

    // ---------- shared exclusion bitset, if one was built
    let parts = parse_index_prefix(&args.ix);
    let khx = KhxReader::open(&khx_path_for(&parts.parent_dir, &parts.db_name, k)).ok();
    if khx.is_some() {
        info!("using shared high-frequency exclusion bitset");
    }

    let total_nseq: u64 = volumes.iter().map(|v| u64::from(v.ksx.num_sequences())).sum();
    config.resolve_max_freq(total_nseq);

    // ---------- stages 1 + 2
    let abort = AtomicBool::new(false);
    let outcome = run_search(&queries, &volumes, khx.as_ref(), k, &config, args.threads, &abort)
        .map_err(|e| e.to_string())?;
    let mut hits = outcome.hits;

    // ---------- stage 3
    if config.mode == SearchMode::Align {
        if args.db.is_empty() {
            return Err("mode 3 needs the reference FASTA files via --db".to_string());
        }
        let mut sources = Vec::with_capacity(args.db.len());
        for fasta in &args.db {
            sources.push(
                open_fasta_source(fasta).map_err(|e| format!("cannot read '{}': {}", fasta, e))?,
            );
        }
        let source_refs: Vec<&dyn SequenceSource> =
            sources.iter().map(|s| s as &dyn SequenceSource).collect();
        info!("running stage 3 on {} hit(s)", hits.len());
        hits = run_stage3(hits, &queries, &source_refs, &config.stage3);
        info!("stage 3 kept {} hit(s)", hits.len());
    }

    finalize_results(&mut hits, &config);

    // ---------- output
    let mut out = out_writer(&args.out).map_err(|e| e.to_string())?;
    write_results_tab(&mut out, &hits, config.mode.as_u8(), config.stage3.traceback)
        .map_err(|e| e.to_string())?;
    info!("done, {} hit(s) reported", hits.len());

    if !outcome.skipped_queries.is_empty() {
        warn!("{} query(ies) were skipped", outcome.skipped_queries.len());
        return Ok(2);
    }
    Ok(0)
}

fn main() {
    let args = Args::parse();
    unsafe {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "info")
        }
        if args.verbose {
            env::set_var("RUST_LOG", "debug");
        }
    }
    env_logger::init();

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(msg) => {
            error!("{}", msg);
            std::process::exit(1);
        }
    }
}
