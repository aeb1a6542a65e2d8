use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info};

use kseek_core::source::SequenceSource;
use kseek_index::builder::{build_volume, IndexBuilderConfig};
use kseek_index::discovery::{index_file_stem, khx_path_for};
use kseek_index::highfreq::{filter_volumes, resolve_build_threshold};
use kseek_index::kvx::write_kvx;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Build kseek index volumes from reference FASTA files
/// say kseekindex -h to see options
struct Args {
    /// reference FASTA file(s); each file becomes one index volume
    #[clap(short = 'd', long, required = true, num_args = 1..)]
    db: Vec<String>,
    /// k-mer length (4-13)
    #[clap(short, long, required = true)]
    k: usize,
    /// output directory
    #[clap(short, long, required = true)]
    out: String,
    /// database name; defaults to the stem of the first FASTA file
    #[clap(long)]
    name: Option<String>,
    /// 1 = stage-1-only index (skip the position file), 2 or 3 = full index
    #[clap(long, default_value_t = 2)]
    mode: u8,
    /// RAM budget for posting buffers, K/M/G suffixes accepted
    #[clap(long, default_value = "1G")]
    memory_limit: String,
    /// exclude k-mers whose cross-volume count exceeds this threshold;
    /// 0 disables, a value in (0,1) is a fraction of the total sequence count
    #[clap(long, default_value_t = 0.0)]
    max_freq_build: f64,
    /// number of scan partitions; 0 picks one from the RAM budget
    #[clap(long, default_value_t = 0)]
    partitions: u32,
    /// worker threads; 0 uses all cores
    #[clap(long, default_value_t = 0)]
    threads: usize,
    /// be more verbose and log program actions on the screen
    #[clap(short, long)]
    verbose: bool,
}

/// Parses a size with an optional K/M/G suffix, e.g. `512M` or `8G`.
fn parse_size_string(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (number, multiplier) = match s.chars().last() {
        Some('K') | Some('k') => (&s[..s.len() - 1], 1u64 << 10),
        Some('M') | Some('m') => (&s[..s.len() - 1], 1u64 << 20),
        Some('G') | Some('g') => (&s[..s.len() - 1], 1u64 << 30),
        _ => (s, 1),
    };
    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some((value * multiplier as f64) as u64)
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn run(args: &Args) -> Result<(), String> {
    if args.mode < 1 || args.mode > 3 {
        return Err("mode must be 1, 2 or 3".to_string());
    }
    let memory_limit = parse_size_string(&args.memory_limit)
        .ok_or_else(|| format!("invalid memory limit '{}'", args.memory_limit))?;
    if args.max_freq_build < 0.0 {
        return Err("max_freq_build must not be negative".to_string());
    }

    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)
        .map_err(|e| format!("cannot create output directory '{}': {}", args.out, e))?;

    let db_name = args.name.clone().unwrap_or_else(|| file_stem(&args.db[0]));
    info!(
        "building '{}': {} volume(s), k={}, mode={}, memory_limit={}",
        db_name,
        args.db.len(),
        args.k,
        args.mode,
        args.memory_limit
    );

    let config = IndexBuilderConfig {
        k: args.k,
        memory_limit,
        partitions: args.partitions,
        threads: args.threads,
        skip_kpx: args.mode == 1,
    };

    let mut basenames = Vec::new();
    let mut prefixes = Vec::new();
    let mut total_nseq = 0u64;
    for (vi, fasta) in args.db.iter().enumerate() {
        let basename = if args.db.len() == 1 {
            db_name.clone()
        } else {
            format!("{}.{:02}", db_name, vi)
        };
        info!("=== volume {}/{}: {} ===", vi + 1, args.db.len(), fasta);
        let source = kseek_io::open_fasta_source(fasta)
            .map_err(|e| format!("cannot read '{}': {}", fasta, e))?;
        if source.num_sequences() == 0 {
            return Err(format!("'{}' holds no sequences", fasta));
        }
        total_nseq += u64::from(source.num_sequences());

        let prefix = index_file_stem(&out_dir, &basename, args.k);
        let stats = build_volume(&source, &config, &prefix, &db_name)
            .map_err(|e| format!("build failed for '{}': {}", fasta, e))?;
        info!(
            "volume '{}' done: {} sequences, {} postings, {} partition(s), {} spill run(s)",
            basename, stats.num_sequences, stats.total_postings, stats.partitions, stats.spill_runs
        );
        basenames.push(basename);
        prefixes.push(prefix);
    }

    let kvx_path = {
        let mut p = index_file_stem(&out_dir, &db_name, args.k).into_os_string();
        p.push(".kvx");
        PathBuf::from(p)
    };
    write_kvx(&kvx_path, &db_name, &basenames)
        .map_err(|e| format!("cannot write {}: {}", kvx_path.display(), e))?;
    info!("wrote volume manifest {}", kvx_path.display());

    if args.max_freq_build > 0.0 {
        let threshold = resolve_build_threshold(args.max_freq_build, total_nseq);
        info!("cross-volume filter: threshold {} posting(s)", threshold);
        let khx_path = khx_path_for(&out_dir, &db_name, args.k);
        let stats = filter_volumes(&prefixes, &khx_path, args.k, threshold)
            .map_err(|e| format!("cross-volume filtering failed: {}", e))?;
        info!(
            "excluded {} k-mer(s) ({} postings) into {}",
            stats.excluded_kmers,
            stats.removed_postings,
            khx_path.display()
        );
    }

    info!("all volumes completed successfully");
    Ok(())
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

    if let Err(msg) = run(&args) {
        error!("{}", msg);
        std::process::exit(1);
    }
}
