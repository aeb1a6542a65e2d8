//! Cross-volume high-frequency exclusion.
//!
//! After every volume of a database is built, counts are aggregated across
//! volumes; k-mers whose aggregate exceeds the build threshold are recorded
//! in a shared `.khx` bitset and their postings are dropped from every
//! volume's `.kix`/`.kpx`. Excluded k-mers keep a table entry with count 0,
//! all other k-mers keep their postings byte for byte.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use log::info;

use kseek_core::types::table_size;

use crate::errors::IndexError;
use crate::format::{
    encode_db_name, KIX_FORMAT_VERSION, KIX_MAGIC, KPX_FORMAT_VERSION, KPX_MAGIC,
};
use crate::khx::KhxWriter;
use crate::kix::KixReader;
use crate::kpx::KpxReader;

/// Outcome of the filtering pass.
#[derive(Clone, Debug, Default)]
pub struct HighFreqStats {
    pub threshold: u64,
    pub excluded_kmers: u64,
    pub removed_postings: u64,
}

/// Resolves the `max_freq_build` knob to an absolute posting-count threshold:
/// values in `(0, 1)` are a fraction of the database's total sequence count.
pub fn resolve_build_threshold(raw: f64, total_nseq: u64) -> u64 {
    if raw > 0.0 && raw < 1.0 {
        ((raw * total_nseq as f64).ceil() as u64).max(1)
    } else {
        raw as u64
    }
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Aggregates counts over `vol_prefixes`, writes the shared `.khx` and
/// rewrites every volume without the excluded k-mers.
pub fn filter_volumes(
    vol_prefixes: &[PathBuf],
    khx_path: &Path,
    k: usize,
    threshold: u64,
) -> Result<HighFreqStats, IndexError> {
    let ts = table_size(k) as usize;

    // ---------- aggregate counts across volumes
    let mut aggregate = vec![0u64; ts];
    for prefix in vol_prefixes {
        let kix = KixReader::open(&with_suffix(prefix, ".kix"))?;
        if kix.k() != k {
            return Err(IndexError::Invariant {
                detail: format!(
                    "volume '{}' was built with k={}, filter requested k={}",
                    prefix.display(),
                    kix.k(),
                    k
                ),
            });
        }
        for m in 0..ts {
            aggregate[m] += u64::from(kix.posting_count(m as u64));
        }
    }

    // ---------- exclusion bitset
    let mut khx = KhxWriter::new(k);
    let mut stats = HighFreqStats { threshold, ..Default::default() };
    for (m, &total) in aggregate.iter().enumerate() {
        if total > threshold {
            khx.set(m as u64);
            stats.excluded_kmers += 1;
            stats.removed_postings += total;
        }
    }
    khx.write(khx_path)?;
    info!(
        "high-frequency filter: {} k-mer(s) over threshold {}, {} posting(s) removed",
        stats.excluded_kmers, stats.threshold, stats.removed_postings
    );

    // ---------- rewrite every volume without the excluded postings
    for prefix in vol_prefixes {
        rewrite_volume(prefix, &khx)?;
    }

    Ok(stats)
}

fn rewrite_volume(prefix: &Path, khx: &KhxWriter) -> Result<(), IndexError> {
    let kix_path = with_suffix(prefix, ".kix");
    let kpx_path = with_suffix(prefix, ".kpx");

    {
        let old = KixReader::open(&kix_path)?;
        let tmp_path = with_suffix(prefix, ".kix.tmp");
        write_filtered_kix(&old, khx, &tmp_path)?;
        std::fs::rename(&tmp_path, &kix_path)?;
    }

    if kpx_path.exists() {
        let kix = KixReader::open(&kix_path)?;
        let old = KpxReader::open(&kpx_path)?;
        let tmp_path = with_suffix(prefix, ".kpx.tmp");
        write_filtered_kpx(&kix, &old, khx, &tmp_path)?;
        std::fs::rename(&tmp_path, &kpx_path)?;
    }
    Ok(())
}

fn blob_size(offset_of: impl Fn(u64) -> u64, blob_len: u64, ts: u64, m: u64) -> u64 {
    let next = if m + 1 < ts { offset_of(m + 1) } else { blob_len };
    next - offset_of(m)
}

fn write_filtered_kix(old: &KixReader, khx: &KhxWriter, out_path: &Path) -> Result<(), IndexError> {
    let ts = old.table_size();
    let blob = old.posting_data();

    let mut new_offsets = vec![0u64; ts as usize];
    let mut running = 0u64;
    let mut new_total = 0u64;
    for m in 0..ts {
        new_offsets[m as usize] = running;
        if !khx.is_set(m) {
            running += blob_size(|x| old.posting_offset(x), blob.len() as u64, ts, m);
            new_total += u64::from(old.posting_count(m));
        }
    }

    let mut out = BufWriter::new(File::create(out_path)?);
    out.write_all(KIX_MAGIC)?;
    out.write_u16::<LittleEndian>(KIX_FORMAT_VERSION)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u8(old.k() as u8)?;
    out.write_u8(old.kmer_type())?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(old.num_sequences())?;
    out.write_u64::<LittleEndian>(new_total)?;
    out.write_all(&encode_db_name(old.db_name()))?;
    for &off in &new_offsets {
        out.write_u64::<LittleEndian>(off)?;
    }
    for m in 0..ts {
        let cnt = if khx.is_set(m) { 0 } else { old.posting_count(m) };
        out.write_u32::<LittleEndian>(cnt)?;
    }
    for m in 0..ts {
        if khx.is_set(m) {
            continue;
        }
        let start = old.posting_offset(m) as usize;
        let len = blob_size(|x| old.posting_offset(x), blob.len() as u64, ts, m) as usize;
        out.write_all(&blob[start..start + len])?;
    }
    out.flush()?;
    Ok(())
}

fn write_filtered_kpx(
    kix: &KixReader,
    old: &KpxReader,
    khx: &KhxWriter,
    out_path: &Path,
) -> Result<(), IndexError> {
    let ts = old.table_size();
    let blob = old.posting_data();

    let mut new_offsets = vec![0u64; ts as usize];
    let mut running = 0u64;
    for m in 0..ts {
        new_offsets[m as usize] = running;
        if !khx.is_set(m) {
            running += blob_size(|x| old.pos_offset(x), blob.len() as u64, ts, m);
        }
    }

    let mut out = BufWriter::new(File::create(out_path)?);
    out.write_all(KPX_MAGIC)?;
    out.write_u16::<LittleEndian>(KPX_FORMAT_VERSION)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u8(old.k() as u8)?;
    out.write_all(&[0u8; 7])?;
    out.write_u64::<LittleEndian>(kix.total_postings())?;
    for &off in &new_offsets {
        out.write_u64::<LittleEndian>(off)?;
    }
    for m in 0..ts {
        if khx.is_set(m) {
            continue;
        }
        let start = old.pos_offset(m) as usize;
        let len = blob_size(|x| old.pos_offset(x), blob.len() as u64, ts, m) as usize;
        out.write_all(&blob[start..start + len])?;
    }
    out.flush()?;
    Ok(())
}
