//! Partitioned external-memory index construction.
//!
//! The build runs in three passes over a [`SequenceSource`]:
//!
//! 1. *Counting.* Sharded over k-mer residue classes, every shard scans the
//!    whole sequence stream and accumulates, per k-mer, the posting count and
//!    the exact byte length its delta-varint encoding will take. Since
//!    sequences stream in oid order and positions ascend, the deltas seen
//!    here are identical to the ones the final sorted merge will produce, so
//!    the prefix sums over these byte lengths *are* the final blob layout.
//!    The `.ksx` file is written in this pass.
//! 2. *Scan and partition.* For each partition (a k-mer residue class modulo
//!    the partition count) the sequences are streamed again; postings whose
//!    k-mer belongs to the partition are buffered, sorted and spilled to run
//!    files whenever the buffer reaches the RAM budget, then merged and
//!    written into the pre-allocated blob slices.
//! 3. *Finalization* is implicit: headers and tables were written up front
//!    from the pass-1 layout.
//!
//! Two builds from the same inputs with the same `(k, budget, threads)` are
//! byte-identical, and the output does not depend on the thread count at all:
//! shard results are independent of scheduling and `(kmer, oid, pos)` triples
//! are distinct, so the sort admits exactly one order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::{debug, info};
use rayon::prelude::*;

use kseek_core::kmer::{expand_ambig_kmer, KmerInt, PackedKmerScanner, ScanEvent};
use kseek_core::source::SequenceSource;
use kseek_core::types::{kmer_type_for_k, table_size, SeqId, SeqPos, MAX_K, MIN_K};
use kseek_core::varint;

use crate::errors::IndexError;
use crate::format::{
    encode_db_name, KIX_FORMAT_VERSION, KIX_HEADER_LEN, KIX_MAGIC, KPX_FORMAT_VERSION,
    KPX_HEADER_LEN, KPX_MAGIC,
};
use crate::ksx::KsxWriter;

/// Bytes one buffered posting occupies in RAM and in spill runs.
const POSTING_BYTES: u64 = 12;

/// Hard ceiling on the partition count.
const MAX_PARTITIONS: u32 = 256;

/// Build-time knobs.
#[derive(Clone, Debug)]
pub struct IndexBuilderConfig {
    /// k-mer length, `4..=13`.
    pub k: usize,
    /// RAM budget in bytes for the posting buffer of one partition.
    pub memory_limit: u64,
    /// Number of partitions; 0 picks the smallest power of two whose
    /// expected posting volume fits the budget with slack.
    pub partitions: u32,
    /// Worker threads for counting and sorting; 0 uses the global pool.
    pub threads: usize,
    /// Build without a `.kpx` (stage-1-only indexes).
    pub skip_kpx: bool,
}

impl Default for IndexBuilderConfig {
    fn default() -> IndexBuilderConfig {
        IndexBuilderConfig {
            k: 11,
            memory_limit: 1u64 << 30,
            partitions: 0,
            threads: 0,
            skip_kpx: false,
        }
    }
}

/// What a finished volume build reports back.
#[derive(Clone, Debug, Default)]
pub struct BuildStats {
    pub num_sequences: u32,
    pub total_bases: u64,
    pub total_postings: u64,
    pub partitions: u32,
    pub spill_runs: usize,
}

/// Builds `.kix`, `.kpx` and `.ksx` for one volume.
///
/// `output_prefix` is the file stem, e.g. `out/nt.00.11mer`; the three
/// suffixes are appended to it. On any error the partial output files are
/// removed before the error is returned.
pub fn build_volume(
    source: &dyn SequenceSource,
    config: &IndexBuilderConfig,
    output_prefix: &Path,
    db_name: &str,
) -> Result<BuildStats, IndexError> {
    if !(MIN_K..=MAX_K).contains(&config.k) {
        return Err(IndexError::KOutOfRange { k: config.k, min: MIN_K, max: MAX_K });
    }

    let result = if kmer_type_for_k(config.k) == 0 {
        build_volume_typed::<u16>(source, config, output_prefix, db_name)
    } else {
        build_volume_typed::<u32>(source, config, output_prefix, db_name)
    };

    if result.is_err() {
        for suffix in [".kix", ".kpx", ".ksx"] {
            let _ = std::fs::remove_file(with_suffix(output_prefix, suffix));
        }
    }
    result
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// A dedicated pool when a thread count was requested, the global one otherwise.
struct WorkerPool(Option<rayon::ThreadPool>);

impl WorkerPool {
    fn new(threads: usize) -> Result<WorkerPool, IndexError> {
        if threads == 0 {
            return Ok(WorkerPool(None));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| IndexError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        Ok(WorkerPool(Some(pool)))
    }

    fn run<T: Send>(&self, f: impl FnOnce() -> T + Send) -> T {
        match &self.0 {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

/// Per-shard accumulator of pass 1. A shard owns the k-mers of one residue
/// class modulo the shard count; index within the shard is `kmer / shards`.
struct ShardCounts {
    counts: Vec<u32>,
    id_sizes: Vec<u32>,
    pos_sizes: Vec<u32>,
    last_oid: Vec<SeqId>,
    last_pos: Vec<SeqPos>,
}

impl ShardCounts {
    fn new(len: usize) -> ShardCounts {
        ShardCounts {
            counts: vec![0; len],
            id_sizes: vec![0; len],
            pos_sizes: vec![0; len],
            last_oid: vec![0; len],
            last_pos: vec![0; len],
        }
    }

    #[inline]
    fn record(&mut self, idx: usize, oid: SeqId, pos: SeqPos) {
        if self.counts[idx] == 0 {
            self.id_sizes[idx] += varint::size(oid) as u32;
            self.pos_sizes[idx] += varint::size(pos) as u32;
        } else if self.last_oid[idx] == oid {
            self.id_sizes[idx] += 1; // zero delta
            self.pos_sizes[idx] += varint::size(pos - self.last_pos[idx]) as u32;
        } else {
            self.id_sizes[idx] += varint::size(oid - self.last_oid[idx]) as u32;
            self.pos_sizes[idx] += varint::size(pos) as u32;
        }
        self.counts[idx] += 1;
        self.last_oid[idx] = oid;
        self.last_pos[idx] = pos;
    }
}

/// Pass-1 result: the complete final layout of both blobs.
struct BlobLayout {
    counts: Vec<u32>,
    id_offsets: Vec<u64>,
    pos_offsets: Vec<u64>,
    id_blob_len: u64,
    pos_blob_len: u64,
    total_postings: u64,
}

impl BlobLayout {
    #[inline]
    fn id_size(&self, m: usize) -> u64 {
        let next = if m + 1 < self.id_offsets.len() {
            self.id_offsets[m + 1]
        } else {
            self.id_blob_len
        };
        next - self.id_offsets[m]
    }

    #[inline]
    fn pos_size(&self, m: usize) -> u64 {
        let next = if m + 1 < self.pos_offsets.len() {
            self.pos_offsets[m + 1]
        } else {
            self.pos_blob_len
        };
        next - self.pos_offsets[m]
    }
}

fn count_postings<K: KmerInt>(
    source: &dyn SequenceSource,
    k: usize,
    shards: usize,
) -> Result<BlobLayout, IndexError> {
    let ts = table_size(k) as usize;
    let shards = shards.max(1).min(ts);
    let nseq = source.num_sequences();

    let accums: Vec<ShardCounts> = (0..shards)
        .into_par_iter()
        .map(|s| -> Result<ShardCounts, IndexError> {
            let shard_len = (ts - s + shards - 1) / shards;
            let mut acc = ShardCounts::new(shard_len);
            let scanner: PackedKmerScanner<K> = PackedKmerScanner::new(k);
            for oid in 0..nseq {
                let ps = source.packed_sequence(oid)?;
                scanner.scan(&ps.packed, ps.length, &ps.ambiguity, |ev| match ev {
                    ScanEvent::Kmer { pos, kmer } => {
                        let m = kmer.index();
                        if m % shards == s {
                            acc.record(m / shards, oid, pos);
                        }
                    }
                    ScanEvent::Degenerate { pos, base_kmer, mask, bit_offset } => {
                        expand_ambig_kmer(base_kmer, mask, bit_offset, |expanded: K| {
                            let m = expanded.index();
                            if m % shards == s {
                                acc.record(m / shards, oid, pos);
                            }
                        });
                    }
                });
            }
            Ok(acc)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts = vec![0u32; ts];
    let mut id_offsets = vec![0u64; ts];
    let mut pos_offsets = vec![0u64; ts];
    let mut id_sum = 0u64;
    let mut pos_sum = 0u64;
    let mut total_postings = 0u64;
    for m in 0..ts {
        let acc = &accums[m % shards];
        let idx = m / shards;
        counts[m] = acc.counts[idx];
        id_offsets[m] = id_sum;
        pos_offsets[m] = pos_sum;
        id_sum += u64::from(acc.id_sizes[idx]);
        pos_sum += u64::from(acc.pos_sizes[idx]);
        total_postings += u64::from(acc.counts[idx]);
    }

    Ok(BlobLayout {
        counts,
        id_offsets,
        pos_offsets,
        id_blob_len: id_sum,
        pos_blob_len: pos_sum,
        total_postings,
    })
}

fn choose_partitions(config: &IndexBuilderConfig, total_postings: u64) -> u32 {
    if config.partitions > 0 {
        return config.partitions.next_power_of_two().min(MAX_PARTITIONS);
    }
    let budget = config.memory_limit.max(1);
    let mut p = 1u32;
    while p < MAX_PARTITIONS && total_postings * POSTING_BYTES / u64::from(p) > budget / 2 {
        p *= 2;
    }
    p
}

/// One buffered posting. The derived ordering is the merge order
/// `(kmer, oid, pos)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PostingRecord {
    kmer: u32,
    oid: SeqId,
    pos: SeqPos,
}

impl PostingRecord {
    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        let mut buf = [0u8; POSTING_BYTES as usize];
        LittleEndian::write_u32(&mut buf[0..4], self.kmer);
        LittleEndian::write_u32(&mut buf[4..8], self.oid);
        LittleEndian::write_u32(&mut buf[8..12], self.pos);
        out.write_all(&buf)
    }

    fn read_from(input: &mut impl Read) -> std::io::Result<Option<PostingRecord>> {
        let mut buf = [0u8; POSTING_BYTES as usize];
        match input.read_exact(&mut buf) {
            Ok(()) => Ok(Some(PostingRecord {
                kmer: LittleEndian::read_u32(&buf[0..4]),
                oid: LittleEndian::read_u32(&buf[4..8]),
                pos: LittleEndian::read_u32(&buf[8..12]),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Sorted run files spilled by one partition.
struct SpillSet {
    dir: PathBuf,
    runs: Vec<File>,
}

impl SpillSet {
    fn new(dir: &Path) -> SpillSet {
        SpillSet { dir: dir.to_path_buf(), runs: Vec::new() }
    }

    fn write_run(&mut self, records: &[PostingRecord]) -> std::io::Result<()> {
        let file = tempfile::tempfile_in(&self.dir)?;
        let mut out = BufWriter::new(file);
        for r in records {
            r.write_to(&mut out)?;
        }
        let mut file = out.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        self.runs.push(file);
        Ok(())
    }
}

/// K-way merge over sorted spill runs.
struct RunMerge {
    readers: Vec<BufReader<File>>,
    heap: BinaryHeap<Reverse<(PostingRecord, usize)>>,
}

impl RunMerge {
    fn new(runs: Vec<File>) -> std::io::Result<RunMerge> {
        let mut readers: Vec<BufReader<File>> = runs.into_iter().map(BufReader::new).collect();
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (i, rd) in readers.iter_mut().enumerate() {
            if let Some(rec) = PostingRecord::read_from(rd)? {
                heap.push(Reverse((rec, i)));
            }
        }
        Ok(RunMerge { readers, heap })
    }

    fn next(&mut self) -> std::io::Result<Option<PostingRecord>> {
        let Some(Reverse((rec, i))) = self.heap.pop() else { return Ok(None) };
        if let Some(next) = PostingRecord::read_from(&mut self.readers[i])? {
            self.heap.push(Reverse((next, i)));
        }
        Ok(Some(rec))
    }
}

/// Encodes merged postings into the pre-allocated blob slices.
struct BlobEncoder<'a> {
    layout: &'a BlobLayout,
    kix_file: &'a File,
    kpx_file: Option<&'a File>,
    id_base: u64,
    pos_base: u64,
    cur_kmer: Option<u32>,
    prev_oid: SeqId,
    prev_pos: SeqPos,
    id_buf: Vec<u8>,
    pos_buf: Vec<u8>,
}

impl<'a> BlobEncoder<'a> {
    fn new(
        layout: &'a BlobLayout,
        kix_file: &'a File,
        kpx_file: Option<&'a File>,
        id_base: u64,
        pos_base: u64,
    ) -> BlobEncoder<'a> {
        BlobEncoder {
            layout,
            kix_file,
            kpx_file,
            id_base,
            pos_base,
            cur_kmer: None,
            prev_oid: 0,
            prev_pos: 0,
            id_buf: Vec::new(),
            pos_buf: Vec::new(),
        }
    }

    fn push(&mut self, rec: PostingRecord) -> Result<(), IndexError> {
        if self.cur_kmer != Some(rec.kmer) {
            self.flush()?;
            self.cur_kmer = Some(rec.kmer);
            varint::encode_to(rec.oid, &mut self.id_buf);
            varint::encode_to(rec.pos, &mut self.pos_buf);
        } else if rec.oid == self.prev_oid {
            varint::encode_to(0, &mut self.id_buf);
            varint::encode_to(rec.pos - self.prev_pos, &mut self.pos_buf);
        } else {
            varint::encode_to(rec.oid - self.prev_oid, &mut self.id_buf);
            varint::encode_to(rec.pos, &mut self.pos_buf);
        }
        self.prev_oid = rec.oid;
        self.prev_pos = rec.pos;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IndexError> {
        let Some(m) = self.cur_kmer.take() else { return Ok(()) };
        let m = m as usize;

        if self.id_buf.len() as u64 != self.layout.id_size(m) {
            return Err(IndexError::Invariant {
                detail: format!(
                    "k-mer {}: encoded {} id bytes, layout reserved {}",
                    m,
                    self.id_buf.len(),
                    self.layout.id_size(m)
                ),
            });
        }
        self.kix_file
            .write_at(&self.id_buf, self.id_base + self.layout.id_offsets[m])?;
        self.id_buf.clear();

        if let Some(kpx) = self.kpx_file {
            if self.pos_buf.len() as u64 != self.layout.pos_size(m) {
                return Err(IndexError::Invariant {
                    detail: format!(
                        "k-mer {}: encoded {} position bytes, layout reserved {}",
                        m,
                        self.pos_buf.len(),
                        self.layout.pos_size(m)
                    ),
                });
            }
            kpx.write_at(&self.pos_buf, self.pos_base + self.layout.pos_offsets[m])?;
        }
        self.pos_buf.clear();
        Ok(())
    }
}

fn write_kix_skeleton(
    path: &Path,
    k: usize,
    num_sequences: u32,
    db_name: &str,
    layout: &BlobLayout,
) -> Result<File, IndexError> {
    let file = File::create(path)?;
    {
        let mut out = BufWriter::new(&file);
        out.write_all(KIX_MAGIC)?;
        out.write_u16::<LittleEndian>(KIX_FORMAT_VERSION)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u8(k as u8)?;
        out.write_u8(kmer_type_for_k(k))?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(num_sequences)?;
        out.write_u64::<LittleEndian>(layout.total_postings)?;
        out.write_all(&encode_db_name(db_name))?;
        for &off in &layout.id_offsets {
            out.write_u64::<LittleEndian>(off)?;
        }
        for &cnt in &layout.counts {
            out.write_u32::<LittleEndian>(cnt)?;
        }
        out.flush()?;
    }
    let tables_len = KIX_HEADER_LEN as u64 + 12 * layout.id_offsets.len() as u64;
    file.set_len(tables_len + layout.id_blob_len)?;
    Ok(file)
}

fn write_kpx_skeleton(path: &Path, k: usize, layout: &BlobLayout) -> Result<File, IndexError> {
    let file = File::create(path)?;
    {
        let mut out = BufWriter::new(&file);
        out.write_all(KPX_MAGIC)?;
        out.write_u16::<LittleEndian>(KPX_FORMAT_VERSION)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u8(k as u8)?;
        out.write_all(&[0u8; 7])?;
        out.write_u64::<LittleEndian>(layout.total_postings)?;
        for &off in &layout.pos_offsets {
            out.write_u64::<LittleEndian>(off)?;
        }
        out.flush()?;
    }
    let tables_len = KPX_HEADER_LEN as u64 + 8 * layout.pos_offsets.len() as u64;
    file.set_len(tables_len + layout.pos_blob_len)?;
    Ok(file)
}

fn build_volume_typed<K: KmerInt>(
    source: &dyn SequenceSource,
    config: &IndexBuilderConfig,
    output_prefix: &Path,
    db_name: &str,
) -> Result<BuildStats, IndexError> {
    let k = config.k;
    let nseq = source.num_sequences();
    let parent_dir = match output_prefix.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    // ---------- pass 1: metadata + layout
    let mut ksx = KsxWriter::new();
    let mut total_bases = 0u64;
    for oid in 0..nseq {
        let len = source.sequence_length(oid);
        total_bases += u64::from(len);
        ksx.add_sequence(len, source.accession(oid));
    }
    ksx.write(&with_suffix(output_prefix, ".ksx"))?;

    let pool = WorkerPool::new(config.threads)?;
    // Shard results do not depend on the shard count, only wall-clock does.
    let shards = if config.threads > 0 { config.threads } else { rayon::current_num_threads() };
    let layout = pool.run(|| count_postings::<K>(source, k, shards))?;
    info!(
        "{}: {} sequences, {} bases, {} postings ({} id-blob bytes)",
        output_prefix.display(),
        nseq,
        total_bases,
        layout.total_postings,
        layout.id_blob_len
    );

    // ---------- pass 2: partitioned scan, spill, merge, encode
    let partitions = choose_partitions(config, layout.total_postings);
    let cap = (config.memory_limit / POSTING_BYTES).max(4096) as usize;
    debug!(
        "{}: {} partition(s), posting buffer capacity {}",
        output_prefix.display(),
        partitions,
        cap
    );

    let kix_file = write_kix_skeleton(
        &with_suffix(output_prefix, ".kix"),
        k,
        nseq,
        db_name,
        &layout,
    )?;
    let kpx_file = if config.skip_kpx {
        None
    } else {
        Some(write_kpx_skeleton(&with_suffix(output_prefix, ".kpx"), k, &layout)?)
    };

    let id_base = KIX_HEADER_LEN as u64 + 12 * table_size(k);
    let pos_base = KPX_HEADER_LEN as u64 + 8 * table_size(k);
    let scanner: PackedKmerScanner<K> = PackedKmerScanner::new(k);
    let mut spill_runs_total = 0usize;

    for part in 0..partitions {
        let mut spill = SpillSet::new(&parent_dir);
        let mut buffer: Vec<PostingRecord> = Vec::new();

        for oid in 0..nseq {
            let ps = source.packed_sequence(oid)?;
            scanner.scan(&ps.packed, ps.length, &ps.ambiguity, |ev| {
                let mut take = |kmer: u32, pos: SeqPos| {
                    if kmer % partitions == part {
                        buffer.push(PostingRecord { kmer, oid, pos });
                    }
                };
                match ev {
                    ScanEvent::Kmer { pos, kmer } => take(kmer.to_u64() as u32, pos),
                    ScanEvent::Degenerate { pos, base_kmer, mask, bit_offset } => {
                        expand_ambig_kmer(base_kmer, mask, bit_offset, |m: K| {
                            take(m.to_u64() as u32, pos)
                        });
                    }
                }
            });
            if buffer.len() >= cap {
                pool.run(|| buffer.par_sort_unstable());
                spill.write_run(&buffer)?;
                buffer.clear();
            }
        }

        let mut encoder = BlobEncoder::new(&layout, &kix_file, kpx_file.as_ref(), id_base, pos_base);
        if spill.runs.is_empty() {
            pool.run(|| buffer.par_sort_unstable());
            for rec in &buffer {
                encoder.push(*rec)?;
            }
        } else {
            if !buffer.is_empty() {
                pool.run(|| buffer.par_sort_unstable());
                spill.write_run(&buffer)?;
                buffer.clear();
            }
            spill_runs_total += spill.runs.len();
            let mut merge = RunMerge::new(std::mem::take(&mut spill.runs))?;
            while let Some(rec) = merge.next()? {
                encoder.push(rec)?;
            }
        }
        encoder.flush()?;
    }

    kix_file.sync_all()?;
    if let Some(f) = &kpx_file {
        f.sync_all()?;
    }

    Ok(BuildStats {
        num_sequences: nseq,
        total_bases,
        total_postings: layout.total_postings,
        partitions,
        spill_runs: spill_runs_total,
    })
}
