use crate::descriptor::JobDescriptor;
use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use time::Date;

/// A validated, 1-based inclusive selection of descriptor rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize, // 1-based inclusive
    pub end: usize,   // 1-based inclusive
}

impl RowRange {
    /// Defaults to the whole file. Fails unless `1 <= start <= end <= total`,
    /// so an empty file never resolves.
    pub fn resolve(
        total: usize,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Result<Self, BatchError> {
        let start = start.unwrap_or(1);
        let end = end.unwrap_or(total);
        if start < 1 || start > end || end > total {
            return Err(BatchError::Range { start, end, total });
        }
        Ok(Self { start, end })
    }

    pub fn row_count(&self) -> usize {
        self.end - self.start + 1
    }

    /// The selected rows, in their original order.
    pub fn select<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.start - 1..self.end]
    }
}

/// Optional acquisition-date window applied after row selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateWindow {
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, date: Date) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }

    /// Keeps descriptors acquired inside the window, preserving order.
    pub fn filter<'a>(&self, descriptors: &'a [JobDescriptor]) -> Vec<&'a JobDescriptor> {
        descriptors
            .iter()
            .filter(|d| self.contains(d.identity.date_acquired))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn defaults_select_every_row() {
        let r = RowRange::resolve(8, None, None).unwrap();
        assert_eq!(r, RowRange { start: 1, end: 8 });
        let rows: Vec<u32> = (1..=8).collect();
        assert_eq!(r.select(&rows), rows.as_slice());
    }

    #[test]
    fn open_end_runs_to_last_row() {
        let r = RowRange::resolve(8, Some(3), None).unwrap();
        assert_eq!(r.row_count(), 6);
        let rows: Vec<u32> = (1..=8).collect();
        assert_eq!(r.select(&rows), &[3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn every_valid_pair_selects_exact_span() {
        let n = 6;
        let rows: Vec<usize> = (1..=n).collect();
        for start in 1..=n {
            for end in start..=n {
                let r = RowRange::resolve(n, Some(start), Some(end)).unwrap();
                let picked = r.select(&rows);
                assert_eq!(picked.len(), end - start + 1);
                assert_eq!(picked.first(), Some(&start));
                assert_eq!(picked.last(), Some(&end));
            }
        }
    }

    #[test]
    fn rejects_inverted_and_out_of_bounds() {
        for (start, end) in [(0, 3), (4, 3), (2, 9), (9, 9)] {
            let err = RowRange::resolve(8, Some(start), Some(end)).unwrap_err();
            assert!(matches!(err, BatchError::Range { total: 8, .. }), "{start}..{end}");
        }
    }

    #[test]
    fn empty_file_never_resolves() {
        assert!(RowRange::resolve(0, None, None).is_err());
    }

    #[test]
    fn date_window_bounds_are_inclusive() {
        let w = DateWindow {
            from: Some(date!(2025 - 02 - 01)),
            to: Some(date!(2025 - 03 - 31)),
        };
        assert!(w.contains(date!(2025 - 02 - 01)));
        assert!(w.contains(date!(2025 - 03 - 31)));
        assert!(!w.contains(date!(2025 - 01 - 31)));
        assert!(!w.contains(date!(2025 - 04 - 01)));
        assert!(DateWindow::default().contains(date!(1999 - 12 - 31)));
    }
}
