//! Date-range expansion and shard partitioning.
//!
//! A run is described by an inclusive `MM-YYYY--MM-YYYY` range. This module
//! turns that into the ordered sequence of [`WorkItem`]s (one per issue) and
//! splits the sequence into contiguous, near-equal shards — one per worker.
//! Both operations are pure and validated up front, so malformed input fails
//! before any browser is launched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::FetchError;

/// Earliest publication year the archive accepts (the magazine began in 1888).
pub const MIN_YEAR: i32 = 1888;
/// Upper bound on accepted years.
pub const MAX_YEAR: i32 = 2099;

static RE_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{2})-(\d{4})$").unwrap());

/// One issue's worth of work: a (year, month) pair.
///
/// `month` is zero-based (January = 0), matching the month-name table used
/// to build issue URLs. Ordering is chronological; the field order makes the
/// derived `Ord` compare year first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkItem {
    pub year: i32,
    /// Zero-based month, 0–11.
    pub month: u32,
}

impl WorkItem {
    /// Parse a `MM-YYYY` string into a validated work item.
    ///
    /// `MM` is the human one-based month; the stored month is zero-based.
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        let caps = RE_MONTH_YEAR
            .captures(input.trim())
            .ok_or_else(|| FetchError::InvalidDateRange {
                input: input.to_string(),
                reason: "expected MM-YYYY".into(),
            })?;

        // The regex guarantees both groups are all-digit, so parse cannot fail.
        let month: u32 = caps[1].parse().unwrap();
        let year: i32 = caps[2].parse().unwrap();

        if !(1..=12).contains(&month) {
            return Err(FetchError::InvalidDateRange {
                input: input.to_string(),
                reason: format!("month must be 01-12, got {month:02}"),
            });
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(FetchError::InvalidDateRange {
                input: input.to_string(),
                reason: format!("year must be {MIN_YEAR}-{MAX_YEAR}, got {year}"),
            });
        }

        Ok(WorkItem {
            year,
            month: month - 1,
        })
    }

    /// The issue immediately after this one, wrapping December into January.
    pub fn next(self) -> Self {
        if self.month == 11 {
            WorkItem {
                year: self.year + 1,
                month: 0,
            }
        } else {
            WorkItem {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month + 1, self.year)
    }
}

/// Parse an inclusive `MM-YYYY--MM-YYYY` range string.
pub fn parse_range(input: &str) -> Result<(WorkItem, WorkItem), FetchError> {
    let (start, end) = input
        .split_once("--")
        .ok_or_else(|| FetchError::InvalidDateRange {
            input: input.to_string(),
            reason: "missing '--' separator".into(),
        })?;
    Ok((WorkItem::parse(start)?, WorkItem::parse(end)?))
}

/// Expand `start..=end` into the ordered sequence of every issue in between.
///
/// Strictly chronological, inclusive of both ends, no gaps or duplicates.
/// Rejects ranges where `start` is after `end`.
pub fn time_range(start: WorkItem, end: WorkItem) -> Result<Vec<WorkItem>, FetchError> {
    if start > end {
        return Err(FetchError::InvalidDateRange {
            input: format!("{start}--{end}"),
            reason: "start is after end".into(),
        });
    }

    let mut items = Vec::new();
    let mut current = start;
    loop {
        items.push(current);
        if current == end {
            break;
        }
        current = current.next();
    }
    Ok(items)
}

/// Split `items` into `n` contiguous shards of near-equal size.
///
/// The first `len % n` shards receive one extra item, so shard sizes differ
/// by at most one and concatenating the shards in order reproduces the
/// input exactly. When `items` is shorter than `n` the tail shards are
/// empty; callers skip those rather than spinning up idle workers.
pub fn partition(items: &[WorkItem], n: usize) -> Vec<Vec<WorkItem>> {
    assert!(n > 0, "worker count must be at least 1");

    let base = items.len() / n;
    let remainder = items.len() % n;

    let mut shards = Vec::with_capacity(n);
    let mut offset = 0;
    for shard_index in 0..n {
        let len = base + usize::from(shard_index < remainder);
        shards.push(items[offset..offset + len].to_vec());
        offset += len;
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(month1: u32, year: i32) -> WorkItem {
        WorkItem {
            year,
            month: month1 - 1,
        }
    }

    #[test]
    fn parse_valid_month_year() {
        assert_eq!(WorkItem::parse("02-2025").unwrap(), item(2, 2025));
        assert_eq!(WorkItem::parse("12-1899").unwrap(), item(12, 1899));
    }

    #[test]
    fn parse_rejects_bad_input() {
        for bad in ["2025-02", "0-2025", "13-2025", "02-1887", "02-2100", "feb-2025", ""] {
            assert!(WorkItem::parse(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn parse_range_splits_on_double_dash() {
        let (s, e) = parse_range("01-2020--12-2024").unwrap();
        assert_eq!(s, item(1, 2020));
        assert_eq!(e, item(12, 2024));
        assert!(parse_range("01-2020-12-2024").is_err());
    }

    #[test]
    fn time_range_wraps_year_boundary() {
        // November 2024 through February 2025 crosses a year boundary.
        let range = time_range(item(11, 2024), item(2, 2025)).unwrap();
        assert_eq!(
            range,
            vec![item(11, 2024), item(12, 2024), item(1, 2025), item(2, 2025)]
        );
    }

    #[test]
    fn time_range_single_issue() {
        let range = time_range(item(6, 1960), item(6, 1960)).unwrap();
        assert_eq!(range, vec![item(6, 1960)]);
    }

    #[test]
    fn time_range_rejects_inverted_input() {
        assert!(time_range(item(3, 2025), item(2, 2025)).is_err());
        assert!(time_range(item(1, 2025), item(12, 2024)).is_err());
    }

    #[test]
    fn time_range_is_strictly_increasing_without_gaps() {
        let range = time_range(item(1, 2000), item(12, 2004)).unwrap();
        assert_eq!(range.len(), 60);
        for pair in range.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), pair[1]);
        }
    }

    #[test]
    fn partition_ten_items_three_workers() {
        let items = time_range(item(1, 2024), item(10, 2024)).unwrap();
        let shards = partition(&items, 3);
        let sizes: Vec<usize> = shards.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn partition_reconstructs_original_sequence() {
        let items = time_range(item(1, 2019), item(7, 2025)).unwrap();
        for n in 1..=10 {
            let shards = partition(&items, n);
            assert_eq!(shards.len(), n);

            let sizes: Vec<usize> = shards.iter().map(Vec::len).collect();
            let max = sizes.iter().max().unwrap();
            let min = sizes.iter().min().unwrap();
            assert!(max - min <= 1, "n={n}: sizes {sizes:?}");
            assert_eq!(sizes.iter().sum::<usize>(), items.len());

            let rebuilt: Vec<WorkItem> = shards.into_iter().flatten().collect();
            assert_eq!(rebuilt, items, "n={n}");
        }
    }

    #[test]
    fn partition_more_workers_than_items() {
        let items = time_range(item(1, 2024), item(2, 2024)).unwrap();
        let shards = partition(&items, 5);
        assert_eq!(shards.len(), 5);
        assert_eq!(shards[0].len(), 1);
        assert_eq!(shards[1].len(), 1);
        assert!(shards[2..].iter().all(Vec::is_empty));
    }

    #[test]
    fn display_is_human_one_based() {
        assert_eq!(item(1, 1999).to_string(), "01/1999");
        assert_eq!(item(12, 2024).to_string(), "12/2024");
    }
}
