//! `.kvx` manifests: the plain-text list of a database's volumes.
//!
//! Recognized lines: `# comment`, `TITLE <name>` and
//! `DBLIST "vol_0" "vol_1" …` with quoted basenames in volume order.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Parsed contents of a manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KvxData {
    pub title: String,
    pub volume_basenames: Vec<String>,
}

/// Reads a manifest. Returns `None` when the file is missing, unreadable or
/// lists no volumes.
pub fn read_kvx(path: &Path) -> Option<KvxData> {
    let file = File::open(path).ok()?;
    let mut data = KvxData::default();

    for line in BufReader::new(file).lines() {
        let line = line.ok()?;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(title) = line.strip_prefix("TITLE ") {
            data.title = title.to_string();
        } else if let Some(rest) = line.strip_prefix("DBLIST") {
            let mut rest = rest;
            while let Some(q1) = rest.find('"') {
                let tail = &rest[q1 + 1..];
                let Some(q2) = tail.find('"') else { break };
                data.volume_basenames.push(tail[..q2].to_string());
                rest = &tail[q2 + 1..];
            }
        }
    }

    if data.volume_basenames.is_empty() {
        return None;
    }
    Some(data)
}

/// Writes a manifest for a freshly built database.
pub fn write_kvx(path: &Path, title: &str, volume_basenames: &[String]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "#")?;
    writeln!(out, "# kseek index volume manifest")?;
    writeln!(out, "#")?;
    writeln!(out, "TITLE {}", title)?;
    write!(out, "DBLIST")?;
    for bn in volume_basenames {
        write!(out, " \"{}\"", bn)?;
    }
    writeln!(out)?;
    out.flush()
}
