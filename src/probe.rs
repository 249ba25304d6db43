/// Triangular probe sequence over a power-of-two bucket array.
///
/// Starting from `hash & mask`, the `n`th probe lands `n * (n + 1) / 2`
/// buckets past the home bucket. For a power-of-two bucket count the first
/// `capacity` triangular numbers are distinct modulo `capacity`, so the
/// sequence visits every bucket exactly once before it ends.
#[derive(Clone, Debug)]
pub(crate) struct ProbeSeq {
    pos: usize,
    stride: usize,
    mask: usize,
    remaining: usize,
}

impl ProbeSeq {
    /// `mask` must be `capacity - 1` for a power-of-two `capacity`, or
    /// `usize::MAX` for an unallocated table, which yields nothing.
    #[inline(always)]
    pub(crate) fn new(hash: u64, mask: usize) -> Self {
        Self {
            pos: hash as usize & mask,
            stride: 0,
            mask,
            remaining: mask.wrapping_add(1),
        }
    }
}

impl Iterator for ProbeSeq {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let pos = self.pos;
        self.stride += 1;
        self.pos = (self.pos + self.stride) & self.mask;
        Some(pos)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ProbeSeq {}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    #[test]
    fn visits_every_bucket_once() {
        for shift in 0..=12 {
            let capacity = 1usize << shift;
            for hash in [0u64, 1, 7, 0xdead_beef, u64::MAX] {
                let mut seen = vec![false; capacity];
                let seq = ProbeSeq::new(hash, capacity - 1);
                assert_eq!(seq.len(), capacity);
                for idx in seq {
                    assert!(!seen[idx], "bucket {idx} visited twice at capacity {capacity}");
                    seen[idx] = true;
                }
                assert!(seen.iter().all(|&s| s), "capacity {capacity} not covered");
            }
        }
    }

    #[test]
    fn starts_at_home_bucket_with_triangular_steps() {
        let seq: Vec<usize> = ProbeSeq::new(5, 15).take(5).collect();
        assert_eq!(seq, [5, 6, 8, 11, 15]);
    }

    #[test]
    fn unallocated_table_yields_nothing() {
        assert_eq!(ProbeSeq::new(42, usize::MAX).next(), None);
    }
}
