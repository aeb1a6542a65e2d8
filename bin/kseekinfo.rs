use std::env;

use clap::Parser;
use log::error;

use kseek_index::discovery::{
    discover_k_values, discover_volumes, khx_path_for, parse_index_prefix,
};
use kseek_index::{KhxReader, KixReader, KsxReader};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Inspect kseek index volumes: per-k inventory, sequence and posting counts
/// say kseekinfo -h to see options
struct Args {
    /// index prefix: directory plus database name
    #[clap(long, required = true)]
    ix: String,
    /// restrict the report to one k-mer size (0 = all)
    #[clap(short, long, default_value_t = 0)]
    k: usize,
    /// also decode per-volume posting statistics (mean list length, densest k-mer)
    #[clap(long)]
    postings: bool,
    /// be more verbose and log program actions on the screen
    #[clap(short, long)]
    verbose: bool,
}

fn report_k(args: &Args, k: usize) -> Result<(), String> {
    let volumes = discover_volumes(&args.ix, k);
    if volumes.is_empty() {
        return Err(format!("no index files found for prefix '{}' with k={}", args.ix, k));
    }

    let parts = parse_index_prefix(&args.ix);
    println!("k = {}", k);

    let mut total_seqs = 0u64;
    let mut total_postings = 0u64;
    for dv in &volumes {
        let kix = KixReader::open(&dv.kix_path).map_err(|e| e.to_string())?;
        let ksx = KsxReader::open(&dv.ksx_path).map_err(|e| e.to_string())?;
        total_seqs += u64::from(kix.num_sequences());
        total_postings += kix.total_postings();

        print!(
            "  volume {:3}  {}  sequences {:>10}  postings {:>14}  kmer_type {}",
            dv.volume_index,
            dv.kix_path.display(),
            kix.num_sequences(),
            kix.total_postings(),
            kix.kmer_type(),
        );
        if !dv.kpx_path.exists() {
            print!("  (no positions)");
        }
        println!();

        if args.postings {
            let ts = kix.table_size();
            let mut populated = 0u64;
            let mut densest = (0u64, 0u32);
            for m in 0..ts {
                let cnt = kix.posting_count(m);
                if cnt > 0 {
                    populated += 1;
                }
                if cnt > densest.1 {
                    densest = (m, cnt);
                }
            }
            let mean = if populated > 0 {
                kix.total_postings() as f64 / populated as f64
            } else {
                0.0
            };
            println!(
                "             populated k-mers {:>12} / {}  mean list {:.1}  densest k-mer {:#x} ({} postings)",
                populated, ts, mean, densest.0, densest.1
            );
        }

        if ksx.num_sequences() != kix.num_sequences() {
            println!(
                "             WARNING: ksx lists {} sequences, kix lists {}",
                ksx.num_sequences(),
                kix.num_sequences()
            );
        }
    }
    println!("  total       sequences {:>10}  postings {:>14}", total_seqs, total_postings);

    match KhxReader::open(&khx_path_for(&parts.parent_dir, &parts.db_name, k)) {
        Ok(khx) => {
            println!("  exclusion bitset: {} k-mer(s) excluded at build time", khx.count_excluded())
        }
        Err(_) => println!("  exclusion bitset: none"),
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), String> {
    let k_values = if args.k > 0 {
        vec![args.k]
    } else {
        let found = discover_k_values(&args.ix);
        if found.is_empty() {
            return Err(format!("no index files found for prefix '{}'", args.ix));
        }
        found
    };
    for (i, k) in k_values.iter().enumerate() {
        if i > 0 {
            println!();
        }
        report_k(args, *k)?;
    }
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
