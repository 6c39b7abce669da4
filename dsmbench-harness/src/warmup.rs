/// The warm-up sequence numbers owned by one worker thread.
///
/// Sequence numbers `1..end` are dealt round-robin to all threads of the cluster: thread `id`
/// of `threads` owns every `i` with `i % threads == id`. Together, the partitions of all threads
/// cover `1..end` exactly once.
#[derive(Clone, Debug)]
pub struct WarmupPartition {
    next: u64,
    end: u64,
    step: u64,
}

impl WarmupPartition {
    /// Creates the partition of the thread with global id `id` out of `threads`.
    ///
    /// # Panics
    ///
    /// Panics if `id >= threads`.
    pub fn new(end: u64, threads: u64, id: u64) -> Self {
        assert!(id < threads, "thread {id} out of {threads} threads");

        let first = if id == 0 { threads } else { id };
        Self {
            next: first,
            end,
            step: threads,
        }
    }
}

impl Iterator for WarmupPartition {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.end {
            return None;
        }

        let seq = self.next;
        self.next = self.next.saturating_add(self.step);
        Some(seq)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next).div_ceil(self.step);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covers_exactly_once(end: u64, threads: u64) {
        let mut seen = vec![0u32; end as usize];
        for id in 0..threads {
            for seq in WarmupPartition::new(end, threads, id) {
                assert_eq!(seq % threads, id);
                seen[seq as usize] += 1;
            }
        }

        assert!(end == 0 || seen[0] == 0, "sequence number 0 is never inserted");
        for (seq, &count) in seen.iter().enumerate().skip(1) {
            assert_eq!(count, 1, "{seq} inserted {count} times ({threads} threads)");
        }
    }

    #[test]
    fn partitions_cover_range() {
        for threads in 1..=9 {
            for end in [0, 1, 2, 7, 8, 9, 100, 101, 800, 1000] {
                covers_exactly_once(end, threads);
            }
        }
    }

    #[test]
    fn four_threads_over_800() {
        let partitions: Vec<Vec<u64>> = (0..4)
            .map(|id| WarmupPartition::new(800, 4, id).collect())
            .collect();

        assert_eq!(partitions[0][..3], [4, 8, 12]);
        assert_eq!(partitions[1][..3], [1, 5, 9]);
        assert_eq!(partitions[3].last(), Some(&799));
        assert_eq!(partitions.iter().map(Vec::len).sum::<usize>(), 799);
    }

    #[test]
    fn size_hint_is_exact() {
        for id in 0..3 {
            let partition = WarmupPartition::new(100, 3, id);
            let (lower, upper) = partition.size_hint();
            let count = partition.count();
            assert_eq!(lower, count);
            assert_eq!(upper, Some(count));
        }
    }

    #[test]
    #[should_panic]
    fn id_out_of_range() {
        WarmupPartition::new(100, 2, 2);
    }
}
