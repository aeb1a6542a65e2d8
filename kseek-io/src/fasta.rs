//! FASTA input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use kseek_core::source::MemorySource;

/// One FASTA entry: the first word of the header line and the concatenated,
/// uppercased sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub sequence: String,
}

/// Opens a possibly gzip-compressed file for buffered reading.
pub fn open_file<P: AsRef<Path>>(path: P) -> std::io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Reads every record from a stream.
///
/// # Example
/// ```rust
/// use std::io::BufReader;
/// use kseek_io::read_fasta_stream;
///
/// let text = "> q1 some description\nACGT\nacgt\n;comment\n>q2\nTTTT\n";
/// let records = read_fasta_stream(BufReader::new(text.as_bytes())).unwrap();
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].id, "q1");
/// assert_eq!(records[0].sequence, "ACGTACGT");
/// assert_eq!(records[1].sequence, "TTTT");
/// ```
pub fn read_fasta_stream<R: BufRead>(reader: R) -> std::io::Result<Vec<FastaRecord>> {
    let mut records = Vec::new();
    let mut cur_id: Option<String> = None;
    let mut cur_seq = String::new();

    let finish = |id: &mut Option<String>, seq: &mut String, out: &mut Vec<FastaRecord>| {
        if let Some(id) = id.take() {
            out.push(FastaRecord { id, sequence: std::mem::take(seq).to_ascii_uppercase() });
        } else {
            seq.clear();
        }
    };

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            finish(&mut cur_id, &mut cur_seq, &mut records);
            cur_id = Some(
                header
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            );
        } else if line.starts_with(';') {
            continue;
        } else {
            cur_seq.push_str(line.trim());
        }
    }
    finish(&mut cur_id, &mut cur_seq, &mut records);

    // a nameless header still ended the previous record; drop empty ids
    records.retain(|r| !r.id.is_empty());
    Ok(records)
}

/// Reads every record from a FASTA file; `-` reads stdin.
pub fn read_fasta(path: &str) -> std::io::Result<Vec<FastaRecord>> {
    if path == "-" {
        let stdin = std::io::stdin();
        return read_fasta_stream(stdin.lock());
    }
    read_fasta_stream(open_file(path)?)
}

/// Builds a reference-base source from FASTA records; ordinals follow record
/// order and accessions are the record ids.
pub fn source_from_records(records: &[FastaRecord]) -> MemorySource {
    let mut src = MemorySource::new();
    for r in records {
        src.push(&r.id, &r.sequence);
    }
    src
}

/// Reads a FASTA file straight into a reference-base source.
pub fn open_fasta_source(path: &str) -> std::io::Result<MemorySource> {
    Ok(source_from_records(&read_fasta(path)?))
}
