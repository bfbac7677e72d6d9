//! Splitting matrix rows into contiguous ranges for parallel workers.
//!
//! A partition plan for `R` rows is an ordered list of [`Partition`]s whose row ranges are
//! pairwise disjoint and together cover `[0, R)`, so that every row is processed exactly once.
//!
//! Note that a plan for `N` workers does not necessarily contain `N` partitions. The
//! [`Partitioning`] policy picks one block size for all partitions, and the last partition is
//! truncated to the rows that are left; depending on the policy this can leave some of the `N`
//! workers without any rows to process.

use std::{fmt, ops::Range};

/// A contiguous range of rows assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    pub start_row: usize,
    pub row_count: usize,
}

impl Partition {
    /// Returns the index one past the last row of this partition.
    #[inline]
    pub fn end_row(&self) -> usize {
        self.start_row + self.row_count
    }

    /// Returns the range of row indices covered by this partition.
    #[inline]
    pub fn rows(&self) -> Range<usize> {
        self.start_row..self.end_row()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows {}..{}", self.start_row, self.end_row())
    }
}

/// Policy that determines the block size of a partition plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Partitioning {
    /// Every block gets `R % N + R / N` rows.
    ///
    /// The remainder is added to *every* block rather than spread over some of them, so this
    /// over-covers the rows whenever `R % N != 0` and produces fewer than `N` partitions. For
    /// example, 5 rows and 2 workers give blocks of 3 and 2 rows, but 4 rows and 3 workers give
    /// only 2 blocks of 2 rows each.
    #[default]
    Legacy,
    /// Every block gets `ceil(R / N)` rows, with the last block truncated.
    Balanced,
}

impl Partitioning {
    /// Returns the number of rows per block for `rows` rows and `workers` workers.
    ///
    /// `workers` must not be 0.
    pub fn block_size(self, rows: usize, workers: usize) -> usize {
        match self {
            Partitioning::Legacy => rows % workers + rows / workers,
            Partitioning::Balanced => rows.div_ceil(workers),
        }
    }
}

/// Splits `rows` rows into an ordered partition plan for `workers` workers.
///
/// The returned plan always passes [`validate`]. An empty plan is returned for 0 rows.
pub fn partition(
    rows: usize,
    workers: usize,
    policy: Partitioning,
) -> Result<Vec<Partition>, PartitionFault> {
    if workers == 0 {
        return Err(PartitionFault::NoWorkers);
    }

    let size = policy.block_size(rows, workers);
    let mut plan = Vec::with_capacity(workers.min(rows));
    let mut start = 0;
    while start < rows {
        plan.push(Partition {
            start_row: start,
            row_count: size.min(rows - start),
        });
        start += size;
    }
    Ok(plan)
}

/// Checks that `plan` covers `[0, rows)` exactly once, in row order.
///
/// Returns the first problem found.
pub fn validate(plan: &[Partition], rows: usize) -> Result<(), PartitionFault> {
    let mut covered = 0;
    for (index, part) in plan.iter().enumerate() {
        if part.row_count == 0 {
            return Err(PartitionFault::Empty { index });
        }
        let end = match part.start_row.checked_add(part.row_count) {
            Some(end) if end <= rows => end,
            _ => {
                return Err(PartitionFault::OutOfBounds {
                    index,
                    start: part.start_row,
                    rows,
                })
            }
        };
        if part.start_row > covered {
            return Err(PartitionFault::Gap {
                start: covered,
                end: part.start_row,
            });
        }
        if part.start_row < covered {
            return Err(PartitionFault::Overlap {
                index,
                start: part.start_row,
                end: covered.min(end),
            });
        }
        covered = end;
    }

    if covered < rows {
        return Err(PartitionFault::Gap {
            start: covered,
            end: rows,
        });
    }
    Ok(())
}

/// A malformed partition plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionFault {
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("partition {index} is empty")]
    Empty { index: usize },
    #[error("rows {start}..{end} are not covered by any partition")]
    Gap { start: usize, end: usize },
    #[error("partition {index} covers rows {start}..{end} a second time")]
    Overlap {
        index: usize,
        start: usize,
        end: usize,
    },
    #[error("partition {index} starting at row {start} extends past the last row ({rows} rows)")]
    OutOfBounds {
        index: usize,
        start: usize,
        rows: usize,
    },
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn row_counts(rows: usize, workers: usize, policy: Partitioning) -> Vec<usize> {
        partition(rows, workers, policy)
            .unwrap()
            .iter()
            .map(|p| p.row_count)
            .collect()
    }

    #[test]
    fn legacy_folds_remainder_into_every_block() {
        let plan = partition(5, 2, Partitioning::Legacy).unwrap();
        assert_eq!(
            plan,
            [
                Partition {
                    start_row: 0,
                    row_count: 3
                },
                Partition {
                    start_row: 3,
                    row_count: 2
                },
            ]
        );
        assert_eq!(plan.iter().map(|p| p.row_count).sum::<usize>(), 5);
    }

    #[test]
    fn legacy_can_produce_fewer_partitions_than_workers() {
        assert_eq!(row_counts(4, 3, Partitioning::Legacy), [2, 2]);
        assert_eq!(row_counts(10, 4, Partitioning::Legacy), [4, 4, 2]);
        assert_eq!(row_counts(4, 5, Partitioning::Legacy), [4]);
        assert_eq!(row_counts(1, 5, Partitioning::Legacy), [1]);
    }

    #[test]
    fn legacy_exact_division() {
        assert_eq!(row_counts(6, 3, Partitioning::Legacy), [2, 2, 2]);
        assert_eq!(row_counts(4, 4, Partitioning::Legacy), [1, 1, 1, 1]);
    }

    #[test]
    fn balanced_truncates_last_block() {
        assert_eq!(row_counts(5, 2, Partitioning::Balanced), [3, 2]);
        assert_eq!(row_counts(10, 4, Partitioning::Balanced), [3, 3, 3, 1]);
        assert_eq!(row_counts(4, 5, Partitioning::Balanced), [1, 1, 1, 1]);
    }

    #[test]
    fn no_workers() {
        assert_eq!(
            partition(5, 0, Partitioning::Legacy),
            Err(PartitionFault::NoWorkers)
        );
    }

    #[test]
    fn no_rows() {
        assert_eq!(partition(0, 3, Partitioning::Legacy), Ok(Vec::new()));
        assert_eq!(validate(&[], 0), Ok(()));
    }

    #[test]
    fn validate_rejects_malformed_plans() {
        let p = |start_row, row_count| Partition {
            start_row,
            row_count,
        };

        assert_eq!(
            validate(&[p(0, 2), p(3, 2)], 5),
            Err(PartitionFault::Gap { start: 2, end: 3 })
        );
        assert_eq!(
            validate(&[p(0, 2)], 5),
            Err(PartitionFault::Gap { start: 2, end: 5 })
        );
        assert_eq!(
            validate(&[p(0, 3), p(2, 3)], 5),
            Err(PartitionFault::Overlap {
                index: 1,
                start: 2,
                end: 3
            })
        );
        assert_eq!(
            validate(&[p(0, 3), p(3, 3)], 5),
            Err(PartitionFault::OutOfBounds {
                index: 1,
                start: 3,
                rows: 5
            })
        );
        assert_eq!(
            validate(&[p(0, 5), p(5, 0)], 5),
            Err(PartitionFault::Empty { index: 1 })
        );
        assert_eq!(
            validate(&[p(0, 1), p(usize::MAX, 2)], 5),
            Err(PartitionFault::OutOfBounds {
                index: 1,
                start: usize::MAX,
                rows: 5
            })
        );
        assert_eq!(validate(&[p(0, 2), p(2, 3)], 5), Ok(()));
    }

    #[test]
    fn fault_messages() {
        assert_eq!(
            PartitionFault::Gap { start: 2, end: 3 }.to_string(),
            "rows 2..3 are not covered by any partition"
        );
        assert_eq!(
            PartitionFault::NoWorkers.to_string(),
            "at least one worker is required"
        );
    }

    proptest! {
        #[test]
        fn plans_cover_every_row_exactly_once(
            (rows, workers) in (1usize..500).prop_flat_map(|rows| (Just(rows), 1..=rows)),
            balanced in any::<bool>(),
        ) {
            let policy = if balanced { Partitioning::Balanced } else { Partitioning::Legacy };
            let plan = partition(rows, workers, policy).unwrap();
            prop_assert!(validate(&plan, rows).is_ok());
            prop_assert!(!plan.is_empty());
            prop_assert!(plan.len() <= workers);

            let mut hits = vec![0u32; rows];
            for part in &plan {
                for row in part.rows() {
                    hits[row] += 1;
                }
            }
            prop_assert!(hits.iter().all(|&h| h == 1));
        }
    }
}
