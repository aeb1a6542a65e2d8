use std::collections::VecDeque;

use super::{kmer_mask, KmerInt, ScanEvent};
use crate::source::AmbiguityRun;

/// Extracts the 2-bit code of base `pos` from packed bases, four per byte,
/// first base in the high bits.
#[inline]
pub fn unpack_base(packed: &[u8], pos: u32) -> u8 {
    (packed[(pos >> 2) as usize] >> (6 - 2 * (pos & 3))) & 3
}

/// Rolling k-mer scanner over 2-bit packed bases with ambiguity runs.
///
/// This is the builder-side twin of
/// [`KmerScanner::scan_ambig`](crate::kmer::KmerScanner::scan_ambig): the
/// sequence arrives as packed bytes plus a sorted list of
/// [`AmbiguityRun`]s, and windows are classified by how many of their bases
/// fall inside any run: zero emits the packed k-mer as-is, one emits a
/// degenerate event with the affected slot cleared, two or more are skipped.
pub struct PackedKmerScanner<K: KmerInt> {
    k: usize,
    mask: K,
}

impl<K: KmerInt> PackedKmerScanner<K> {
    pub fn new(k: usize) -> PackedKmerScanner<K> {
        PackedKmerScanner { k, mask: kmer_mask(k) }
    }

    /// Scans `length` bases of `packed`, reporting through `emit`.
    ///
    /// `ambiguity` must be sorted by start position and non-overlapping.
    /// Returns `true` when any window held two or more ambiguous bases.
    pub fn scan<F: FnMut(ScanEvent<K>)>(
        &self,
        packed: &[u8],
        length: u32,
        ambiguity: &[AmbiguityRun],
        mut emit: F,
    ) -> bool {
        let mut has_multi_degen = false;
        if (length as usize) < self.k {
            return has_multi_degen;
        }

        let mut kmer = K::default();
        let mut run_idx = 0usize;
        let mut degens: VecDeque<(u32, u8)> = VecDeque::new();

        for i in 0..length {
            kmer = kmer.push_base(unpack_base(packed, i), self.mask);

            while run_idx < ambiguity.len() && ambiguity[run_idx].end() <= i {
                run_idx += 1;
            }
            if run_idx < ambiguity.len() {
                let run = &ambiguity[run_idx];
                if i >= run.start {
                    degens.push_back((i, run.mask));
                }
            }

            if (i as usize) + 1 < self.k {
                continue;
            }
            let pos = i + 1 - self.k as u32;
            while let Some(&(dpos, _)) = degens.front() {
                if dpos < pos {
                    degens.pop_front();
                } else {
                    break;
                }
            }
            match degens.len() {
                0 => emit(ScanEvent::Kmer { pos, kmer }),
                1 => {
                    let (dpos, mask) = degens[0];
                    let bit_offset = 2 * (i - dpos);
                    emit(ScanEvent::Degenerate {
                        pos,
                        base_kmer: kmer.clear_slot(bit_offset),
                        mask,
                        bit_offset,
                    });
                }
                _ => has_multi_degen = true,
            }
        }
        has_multi_degen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PackedSequence;

    #[test]
    fn packed_scan_matches_text_scan() {
        let text = "ACGTACGTTTGCA";
        let ps = PackedSequence::from_text(text);
        assert!(ps.ambiguity.is_empty());

        let scanner: PackedKmerScanner<u16> = PackedKmerScanner::new(5);
        let mut from_packed = vec![];
        scanner.scan(&ps.packed, ps.length, &ps.ambiguity, |ev| {
            if let ScanEvent::Kmer { pos, kmer } = ev {
                from_packed.push((pos, kmer));
            }
        });

        let text_scanner: crate::kmer::KmerScanner<u16> = crate::kmer::KmerScanner::new(5);
        let mut from_text = vec![];
        text_scanner.scan(text.as_bytes(), |pos, kmer| from_text.push((pos, kmer)));

        assert_eq!(from_packed, from_text);
    }
}
