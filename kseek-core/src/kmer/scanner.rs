use std::collections::VecDeque;

use super::{ambiguity_mask, encode_base, kmer_mask, KmerInt, BASE_ENCODE_INVALID};

/// One observation made by the ambiguity-aware scanners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanEvent<K: KmerInt> {
    /// A fully determined k-mer starting at `pos`.
    Kmer { pos: u32, kmer: K },
    /// A window with exactly one ambiguous base.
    ///
    /// `base_kmer` has the ambiguous 2-bit slot at `bit_offset` zeroed; the
    /// caller expands it with
    /// [`expand_ambig_kmer`](crate::kmer::expand_ambig_kmer), one concrete
    /// k-mer per base in `mask`.
    Degenerate {
        pos: u32,
        base_kmer: K,
        mask: u8,
        bit_offset: u32,
    },
}

/// Rolling k-mer scanner over plain-text sequences.
///
/// [`scan`](KmerScanner::scan) emits `(pos, kmer)` for every window of `k`
/// valid bases; any other character resets the window, so the next `k - 1`
/// bases only re-prime the rolling value.
///
/// # Example
/// ```rust
/// use kseek_core::kmer::KmerScanner;
///
/// let scanner: KmerScanner<u16> = KmerScanner::new(5);
/// let mut positions = vec![];
/// scanner.scan(b"ACGTACGT", |pos, _kmer| positions.push(pos));
/// assert_eq!(positions, vec![0, 1, 2, 3]);
/// ```
pub struct KmerScanner<K: KmerInt> {
    k: usize,
    mask: K,
}

impl<K: KmerInt> KmerScanner<K> {
    pub fn new(k: usize) -> KmerScanner<K> {
        KmerScanner { k, mask: kmer_mask(k) }
    }

    pub fn k(&self) -> usize { self.k }

    /// Scans `seq`, calling `emit(pos, kmer)` for each valid window.
    pub fn scan<F: FnMut(u32, K)>(&self, seq: &[u8], mut emit: F) {
        if seq.len() < self.k {
            return;
        }
        let mut kmer = K::default();
        // number of further valid bases needed before the next emission
        let mut need = self.k - 1;
        for (i, &c) in seq.iter().enumerate() {
            let code = encode_base(c);
            if code == BASE_ENCODE_INVALID {
                need = self.k - 1;
                kmer = K::default();
                continue;
            }
            kmer = kmer.push_base(code, self.mask);
            if need > 0 {
                need -= 1;
                continue;
            }
            emit((i + 1 - self.k) as u32, kmer);
        }
    }

    /// Scans `seq` treating IUPAC ambiguity codes as expandable rather than
    /// invalid.
    ///
    /// Windows without ambiguity produce [`ScanEvent::Kmer`]; windows with
    /// exactly one ambiguous base produce [`ScanEvent::Degenerate`]; windows
    /// with two or more are skipped silently. Returns `true` when at least one
    /// window was skipped that way.
    pub fn scan_ambig<F: FnMut(ScanEvent<K>)>(&self, seq: &[u8], mut emit: F) -> bool {
        let mut has_multi_degen = false;
        if seq.len() < self.k {
            return has_multi_degen;
        }
        let mut kmer = K::default();
        let mut valid_run = 0usize;
        // ambiguous positions currently inside the window, oldest first
        let mut degens: VecDeque<(u32, u8)> = VecDeque::new();

        for (i, &c) in seq.iter().enumerate() {
            let code = encode_base(c);
            if code != BASE_ENCODE_INVALID {
                kmer = kmer.push_base(code, self.mask);
                valid_run += 1;
            } else {
                let mask = ambiguity_mask(c);
                if mask == 0 {
                    // truly invalid character: hard reset
                    valid_run = 0;
                    kmer = K::default();
                    degens.clear();
                    continue;
                }
                // placeholder code 0; the slot is cleared again before expansion
                kmer = kmer.push_base(0, self.mask);
                valid_run += 1;
                degens.push_back((i as u32, mask));
            }

            if valid_run < self.k {
                continue;
            }
            let pos = (i + 1 - self.k) as u32;
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
                    let bit_offset = 2 * (i as u32 - dpos);
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
