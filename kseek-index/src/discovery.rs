//! Finding index volumes on disk.
//!
//! Index files live next to each other as `<dir>/<basename>.<kk>mer.kix`
//! (and `.kpx`, `.ksx`), with one `<dir>/<db>.<kk>mer.kvx` manifest per
//! database and k. Discovery walks the manifests; volumes listed there but
//! missing on disk are skipped with a warning.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::warn;
use regex::Regex;

use crate::kvx::read_kvx;

/// One volume's index files for a specific k.
#[derive(Clone, Debug)]
pub struct DiscoveredVolume {
    pub kix_path: PathBuf,
    pub kpx_path: PathBuf,
    pub ksx_path: PathBuf,
    pub volume_index: u16,
    pub k: usize,
}

/// An index prefix split into its directory and database name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexPrefixParts {
    pub parent_dir: PathBuf,
    pub db_name: String,
}

/// Splits `path/to/nt` into `("path/to", "nt")`.
pub fn parse_index_prefix(ix_prefix: &str) -> IndexPrefixParts {
    let p = Path::new(ix_prefix);
    let parent = p.parent().map(Path::to_path_buf).unwrap_or_default();
    let parent_dir = if parent.as_os_str().is_empty() { PathBuf::from(".") } else { parent };
    let db_name = p
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    IndexPrefixParts { parent_dir, db_name }
}

/// File stem of a volume's index files, e.g. `dir/nt.00.09mer`.
pub fn index_file_stem(parent_dir: &Path, vol_basename: &str, k: usize) -> PathBuf {
    parent_dir.join(format!("{}.{:02}mer", vol_basename, k))
}

/// Path of the shared exclusion bitset, e.g. `dir/nt.09mer.khx`.
pub fn khx_path_for(parent_dir: &Path, db_name: &str, k: usize) -> PathBuf {
    let mut stem = index_file_stem(parent_dir, db_name, k).into_os_string();
    stem.push(".khx");
    PathBuf::from(stem)
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn discover_from_kvx(parts: &IndexPrefixParts, k: usize, volumes: &mut Vec<DiscoveredVolume>) {
    let kvx_path = with_suffix(&index_file_stem(&parts.parent_dir, &parts.db_name, k), ".kvx");
    let Some(kvx) = read_kvx(&kvx_path) else { return };

    for (vi, basename) in kvx.volume_basenames.iter().enumerate() {
        let stem = index_file_stem(&parts.parent_dir, basename, k);
        let kix_path = with_suffix(&stem, ".kix");
        if !kix_path.exists() {
            warn!(
                "volume '{}' listed in {} has no index files, skipping",
                basename,
                kvx_path.display()
            );
            continue;
        }
        volumes.push(DiscoveredVolume {
            kix_path,
            kpx_path: with_suffix(&stem, ".kpx"),
            ksx_path: with_suffix(&stem, ".ksx"),
            volume_index: vi as u16,
            k,
        });
    }
}

fn scan_k_values(parts: &IndexPrefixParts) -> BTreeSet<usize> {
    let mut k_values = BTreeSet::new();
    let pattern = Regex::new(r"^(\d+)mer\.kvx$").unwrap();
    let prefix_dot = format!("{}.", parts.db_name);

    let Ok(entries) = std::fs::read_dir(&parts.parent_dir) else { return k_values };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(suffix) = name.strip_prefix(&prefix_dot) else { continue };
        if let Some(caps) = pattern.captures(suffix) {
            if let Ok(k) = caps[1].parse::<usize>() {
                k_values.insert(k);
            }
        }
    }
    k_values
}

/// Enumerates index volumes under a prefix.
///
/// With `filter_k == 0` every k found next to the prefix is returned; results
/// come back sorted by `(k, volume_index)`.
pub fn discover_volumes(ix_prefix: &str, filter_k: usize) -> Vec<DiscoveredVolume> {
    let parts = parse_index_prefix(ix_prefix);
    let mut volumes = Vec::new();
    if filter_k > 0 {
        discover_from_kvx(&parts, filter_k, &mut volumes);
    } else {
        for k in scan_k_values(&parts) {
            discover_from_kvx(&parts, k, &mut volumes);
        }
    }
    volumes.sort_by_key(|v| (v.k, v.volume_index));
    volumes
}

/// All k values for which the prefix has a manifest.
pub fn discover_k_values(ix_prefix: &str) -> Vec<usize> {
    scan_k_values(&parse_index_prefix(ix_prefix)).into_iter().collect()
}
