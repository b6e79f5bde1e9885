#[cfg(test)]
pub mod tests {
    use shared::partition::{partition, uncovered, RemainderPolicy, WorkPartition};

    #[test]
    pub fn five_thousand_rows_over_four_workers() {
        let partitions = partition(5120, 4, RemainderPolicy::Drop).unwrap();
        let ranges: Vec<_> = partitions.iter().map(WorkPartition::range).collect();
        assert_eq!(ranges, vec![0..1280, 1280..2560, 2560..3840, 3840..5120]);
    }

    #[test]
    pub fn even_division_covers_exactly_once() {
        for total in [0usize, 1, 7, 64, 960, 5120] {
            for workers in (1..=16).filter(|w| total % w == 0) {
                for policy in [RemainderPolicy::Drop, RemainderPolicy::FoldIntoLast] {
                    let partitions = partition(total, workers, policy).unwrap();
                    assert_eq!(partitions.len(), workers);

                    let mut hits = vec![0u8; total];
                    for p in &partitions {
                        for row in p.range() {
                            hits[row] += 1;
                        }
                    }
                    assert!(hits.iter().all(|&h| h == 1), "N={total} W={workers}");

                    // contiguous and ordered by worker id
                    for pair in partitions.windows(2) {
                        assert_eq!(pair[0].end, pair[1].start);
                        assert_eq!(pair[0].worker_id + 1, pair[1].worker_id);
                    }
                }
            }
        }
    }

    #[test]
    pub fn remainder_policies_are_consistent() {
        let dropped = partition(10, 4, RemainderPolicy::Drop).unwrap();
        assert_eq!(dropped.last().unwrap().end, 8);
        assert_eq!(uncovered(10, 4, RemainderPolicy::Drop), 2);

        let folded = partition(10, 4, RemainderPolicy::FoldIntoLast).unwrap();
        assert_eq!(folded.last().unwrap().range(), 6..10);
        assert_eq!(uncovered(10, 4, RemainderPolicy::FoldIntoLast), 0);

        assert_eq!(dropped, partition(10, 4, RemainderPolicy::Drop).unwrap());
    }

    #[test]
    pub fn more_workers_than_rows_leaves_empty_blocks() {
        let partitions = partition(3, 4, RemainderPolicy::Drop).unwrap();
        assert!(partitions.iter().all(WorkPartition::is_empty));
        assert!(partition(3, 0, RemainderPolicy::Drop).is_err());
    }
}
