//! Accession list files for the oid filter.
//!
//! Plain text, one accession per line. Blank lines and `#` comments are
//! skipped, a leading `>` is stripped, and only the first whitespace-separated
//! token of a line counts.

use std::io::BufRead;

use log::warn;

use crate::fasta::open_file;

/// Reads an accession list. An unreadable file logs a warning and yields an
/// empty list; the caller decides whether that is fatal.
pub fn read_seqidlist(path: &str) -> Vec<String> {
    let reader = match open_file(path) {
        Ok(r) => r,
        Err(e) => {
            warn!("cannot open seqidlist '{}': {}", path, e);
            return Vec::new();
        }
    };

    let mut accessions = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix('>').unwrap_or(line).trim_start();
        if let Some(token) = line.split_whitespace().next() {
            accessions.push(token.to_string());
        }
    }
    accessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_tokens_and_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# header").unwrap();
        writeln!(f, "ACC_1 extra words").unwrap();
        writeln!(f, "").unwrap();
        writeln!(f, ">ACC_2").unwrap();
        writeln!(f, "   ").unwrap();
        writeln!(f, "ACC_3\r").unwrap();
        drop(f);

        let ids = read_seqidlist(path.to_str().unwrap());
        assert_eq!(ids, vec!["ACC_1", "ACC_2", "ACC_3"]);
    }

    #[test]
    fn missing_file_yields_empty() {
        assert!(read_seqidlist("/nonexistent/ids.txt").is_empty());
    }
}
