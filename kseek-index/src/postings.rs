//! Streaming decoders for the delta-compressed posting blobs.

use kseek_core::types::{SeqId, SeqPos};
use kseek_core::varint;

/// Decodes one oid at a time from a `.kix` posting slice.
///
/// The first varint is the absolute oid; afterwards a zero delta repeats the
/// previous oid (another position in the same sequence) and a non-zero delta
/// advances it.
pub struct SeqIdDecoder<'a> {
    data: &'a [u8],
    cursor: usize,
    prev_id: SeqId,
    first: bool,
    was_new_seq: bool,
}

impl<'a> SeqIdDecoder<'a> {
    pub fn new(data: &'a [u8]) -> SeqIdDecoder<'a> {
        SeqIdDecoder { data, cursor: 0, prev_id: 0, first: true, was_new_seq: false }
    }

    /// Decodes and returns the next absolute oid.
    #[inline]
    pub fn next(&mut self) -> SeqId {
        let (delta, n) = varint::decode(&self.data[self.cursor..]);
        self.cursor += n;
        if self.first {
            self.first = false;
            self.prev_id = delta;
            self.was_new_seq = true;
        } else {
            self.was_new_seq = delta != 0;
            self.prev_id += delta;
        }
        self.prev_id
    }

    /// Did the last [`next`](SeqIdDecoder::next) move to a different oid?
    ///
    /// The position decoder keys its delta reset off this flag.
    #[inline]
    pub fn was_new_seq(&self) -> bool {
        self.was_new_seq
    }

    pub fn bytes_consumed(&self) -> usize {
        self.cursor
    }
}

/// Decodes one position at a time from a `.kpx` posting slice, in lockstep
/// with a [`SeqIdDecoder`].
pub struct PosDecoder<'a> {
    data: &'a [u8],
    cursor: usize,
    prev_pos: SeqPos,
}

impl<'a> PosDecoder<'a> {
    pub fn new(data: &'a [u8]) -> PosDecoder<'a> {
        PosDecoder { data, cursor: 0, prev_pos: 0 }
    }

    /// Decodes the next position. `was_new_seq` must come from the paired id
    /// decoder's last step: a new oid resets the delta chain, so the varint
    /// is an absolute position; otherwise it is a delta.
    #[inline]
    pub fn next(&mut self, was_new_seq: bool) -> SeqPos {
        let (value, n) = varint::decode(&self.data[self.cursor..]);
        self.cursor += n;
        if was_new_seq {
            self.prev_pos = value;
        } else {
            self.prev_pos += value;
        }
        self.prev_pos
    }

    pub fn bytes_consumed(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kseek_core::varint::encode_to;

    #[test]
    fn lockstep_decoding() {
        // postings: (oid 3, pos 5), (oid 3, pos 9), (oid 7, pos 2)
        let mut ids = vec![];
        encode_to(3, &mut ids); // absolute
        encode_to(0, &mut ids); // same oid
        encode_to(4, &mut ids); // 3 -> 7
        let mut poss = vec![];
        encode_to(5, &mut poss); // absolute
        encode_to(4, &mut poss); // 5 -> 9
        encode_to(2, &mut poss); // absolute again (new oid)

        let mut idd = SeqIdDecoder::new(&ids);
        let mut posd = PosDecoder::new(&poss);
        let mut decoded = vec![];
        for _ in 0..3 {
            let oid = idd.next();
            let pos = posd.next(idd.was_new_seq());
            decoded.push((oid, pos));
        }
        assert_eq!(decoded, vec![(3, 5), (3, 9), (7, 2)]);
    }
}
