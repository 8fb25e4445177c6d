//! Triplet accumulator with row translation and column-major consolidation.

use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;

use crate::error::{SparseError, SparseResult};

/// Row (or column) index meaning "nowhere"; entries translated here are
/// removed by [`SparseMatrixAssembler::filter`].
pub const NULL_LOCATION: usize = usize::MAX;

/// One `(row, col, value)` contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseEntry {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Accumulates Jacobian entries from many objects into one structure.
///
/// Duplicate `(row, col)` pairs are legal and add together; [`compact`]
/// merges them. After `compact` the entries are sorted by column, then row,
/// and each pair appears once with a nonzero value.
///
/// Limits default to unbounded. Entries beyond a declared limit are kept
/// until export, where they surface as [`SparseError::OutOfRange`].
///
/// [`compact`]: SparseMatrixAssembler::compact
#[derive(Debug, Clone)]
pub struct SparseMatrixAssembler {
    entries: Vec<SparseEntry>,
    row_limit: usize,
    col_limit: usize,
    compacted: bool,
}

impl Default for SparseMatrixAssembler {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            row_limit: NULL_LOCATION,
            col_limit: NULL_LOCATION,
            compacted: true,
        }
    }
}

impl SparseMatrixAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an assembler sized for a `rows x cols` matrix.
    pub fn with_limits(rows: usize, cols: usize) -> Self {
        Self {
            row_limit: rows,
            col_limit: cols,
            ..Self::default()
        }
    }

    pub fn set_row_limit(&mut self, rows: usize) {
        self.row_limit = rows;
    }

    pub fn set_col_limit(&mut self, cols: usize) {
        self.col_limit = cols;
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    pub fn col_limit(&self) -> usize {
        self.col_limit
    }

    /// Pre-size storage for `n` entries.
    pub fn reserve(&mut self, n: usize) {
        if n > self.entries.len() {
            self.entries.reserve(n - self.entries.len());
        }
    }

    /// Drop every entry, keeping capacity and limits.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.compacted = true;
    }

    /// Add `value` at `(row, col)`.
    #[inline]
    pub fn assign(&mut self, row: usize, col: usize, value: f64) {
        self.entries.push(SparseEntry { row, col, value });
        self.compacted = false;
    }

    /// Move every entry of `old_row` to `new_row`.
    ///
    /// `new_row == NULL_LOCATION` marks the entries for removal by `filter`.
    pub fn translate_row(&mut self, old_row: usize, new_row: usize) {
        for entry in self.entries.iter_mut().filter(|e| e.row == old_row) {
            entry.row = new_row;
        }
        self.compacted = false;
    }

    /// Mark every entry of `row` for removal.
    pub fn drop_row(&mut self, row: usize) {
        self.translate_row(row, NULL_LOCATION);
    }

    /// Remove translated-away entries and exact zeros.
    pub fn filter(&mut self) {
        self.entries
            .retain(|e| e.row != NULL_LOCATION && e.col != NULL_LOCATION && e.value != 0.0);
    }

    /// Sort entries by column, then row. Stable, so duplicates keep
    /// insertion order.
    pub fn sort_index_col(&mut self) {
        self.entries.sort_by_key(|e| (e.col, e.row));
    }

    /// Sort, merge duplicate `(row, col)` pairs by summation and remove zeros.
    ///
    /// Idempotent: compacting a compacted assembler changes nothing.
    pub fn compact(&mut self) {
        if self.compacted {
            return;
        }
        self.filter();
        self.sort_index_col();

        let mut merged: Vec<SparseEntry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match merged.last_mut() {
                Some(last) if last.row == entry.row && last.col == entry.col => {
                    last.value += entry.value;
                }
                _ => merged.push(entry),
            }
        }
        merged.retain(|e| e.value != 0.0);
        self.entries = merged;
        self.compacted = true;
    }

    pub fn is_compacted(&self) -> bool {
        self.compacted
    }

    /// Append every entry of `other`.
    pub fn merge(&mut self, other: &SparseMatrixAssembler) {
        if other.entries.is_empty() {
            return;
        }
        self.entries.extend_from_slice(&other.entries);
        self.compacted = false;
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn row_index(&self, k: usize) -> usize {
        self.entries[k].row
    }

    pub fn col_index(&self, k: usize) -> usize {
        self.entries[k].col
    }

    pub fn val(&self, k: usize) -> f64 {
        self.entries[k].value
    }

    pub fn iter(&self) -> impl Iterator<Item = &SparseEntry> {
        self.entries.iter()
    }

    /// Check every entry against the declared limits.
    pub fn check_limits(&self) -> SparseResult<()> {
        match self
            .entries
            .iter()
            .find(|e| e.row >= self.row_limit || e.col >= self.col_limit)
        {
            Some(e) => Err(SparseError::OutOfRange {
                row: e.row,
                col: e.col,
                rows: self.row_limit,
                cols: self.col_limit,
            }),
            None => Ok(()),
        }
    }

    fn declared_dims(&self) -> SparseResult<(usize, usize)> {
        if self.row_limit == NULL_LOCATION {
            return Err(SparseError::Unbounded { what: "row limit" });
        }
        if self.col_limit == NULL_LOCATION {
            return Err(SparseError::Unbounded { what: "column limit" });
        }
        Ok((self.row_limit, self.col_limit))
    }

    /// Rows inside the row limit that have no entry at all.
    ///
    /// A row with no entry makes the Jacobian structurally singular.
    pub fn find_missing(&self) -> Vec<usize> {
        let rows = if self.row_limit == NULL_LOCATION {
            self.entries
                .iter()
                .filter(|e| e.row != NULL_LOCATION)
                .map(|e| e.row + 1)
                .max()
                .unwrap_or(0)
        } else {
            self.row_limit
        };
        let mut seen = vec![false; rows];
        for e in &self.entries {
            if e.row < rows {
                seen[e.row] = true;
            }
        }
        seen.iter()
            .enumerate()
            .filter_map(|(row, &hit)| (!hit).then_some(row))
            .collect()
    }

    /// Export into a dense matrix, summing duplicates on the fly.
    ///
    /// Does not require `compact`; translated-away entries are skipped.
    pub fn to_dense(&self) -> SparseResult<DMatrix<f64>> {
        let (rows, cols) = self.declared_dims()?;
        let mut dense = DMatrix::zeros(rows, cols);
        for e in &self.entries {
            if e.row == NULL_LOCATION {
                continue;
            }
            if e.row >= rows || e.col >= cols {
                return Err(SparseError::OutOfRange {
                    row: e.row,
                    col: e.col,
                    rows,
                    cols,
                });
            }
            dense[(e.row, e.col)] += e.value;
        }
        Ok(dense)
    }

    /// Export into compressed sparse column form.
    ///
    /// The assembler must be compacted first; duplicates would otherwise
    /// produce a structurally invalid matrix.
    pub fn to_csc(&self) -> SparseResult<CscMatrix<f64>> {
        if !self.compacted {
            return Err(SparseError::NotCompacted);
        }
        let (rows, cols) = self.declared_dims()?;
        self.check_limits()?;

        let mut col_offsets = vec![0usize; cols + 1];
        for e in &self.entries {
            col_offsets[e.col + 1] += 1;
        }
        for c in 0..cols {
            col_offsets[c + 1] += col_offsets[c];
        }
        let row_indices: Vec<usize> = self.entries.iter().map(|e| e.row).collect();
        let values: Vec<f64> = self.entries.iter().map(|e| e.value).collect();

        CscMatrix::try_from_csc_data(rows, cols, col_offsets, row_indices, values).map_err(|e| {
            SparseError::Pattern {
                message: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_sums_duplicates() {
        let mut a = SparseMatrixAssembler::with_limits(3, 3);
        a.assign(1, 2, 5.0);
        a.assign(1, 2, 3.0);
        a.compact();
        assert_eq!(a.size(), 1);
        assert_eq!(a.row_index(0), 1);
        assert_eq!(a.col_index(0), 2);
        assert_eq!(a.val(0), 8.0);
    }

    #[test]
    fn compact_is_idempotent() {
        let mut a = SparseMatrixAssembler::with_limits(3, 3);
        a.assign(1, 2, 5.0);
        a.assign(1, 2, 3.0);
        a.assign(0, 0, 1.0);
        a.compact();
        let once: Vec<SparseEntry> = a.iter().copied().collect();
        a.compact();
        let twice: Vec<SparseEntry> = a.iter().copied().collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn compact_orders_by_column_then_row() {
        let mut a = SparseMatrixAssembler::with_limits(3, 3);
        a.assign(2, 0, 1.0);
        a.assign(0, 1, 1.0);
        a.assign(0, 0, 1.0);
        a.assign(1, 1, 1.0);
        a.compact();
        let order: Vec<(usize, usize)> = a.iter().map(|e| (e.col, e.row)).collect();
        assert_eq!(order, vec![(0, 0), (0, 2), (1, 0), (1, 1)]);
    }

    #[test]
    fn cancelling_entries_disappear() {
        let mut a = SparseMatrixAssembler::with_limits(2, 2);
        a.assign(0, 1, 2.0);
        a.assign(0, 1, -2.0);
        a.compact();
        assert!(a.is_empty());
    }

    #[test]
    fn translate_to_null_then_filter_removes_row() {
        let mut a = SparseMatrixAssembler::with_limits(3, 3);
        a.assign(1, 0, 4.0);
        a.assign(1, 1, 2.0);
        a.assign(2, 1, 7.0);
        a.drop_row(1);
        a.assign(1, 1, 100.0);
        a.filter();
        a.compact();
        let entries: Vec<(usize, usize, f64)> =
            a.iter().map(|e| (e.row, e.col, e.value)).collect();
        assert_eq!(entries, vec![(1, 1, 100.0), (2, 1, 7.0)]);
    }

    #[test]
    fn translate_row_moves_entries() {
        let mut a = SparseMatrixAssembler::with_limits(3, 3);
        a.assign(0, 0, 1.0);
        a.assign(0, 2, 2.0);
        a.translate_row(0, 2);
        a.compact();
        assert!(a.iter().all(|e| e.row == 2));
    }

    #[test]
    fn csc_export_requires_compaction() {
        let mut a = SparseMatrixAssembler::with_limits(2, 2);
        a.assign(0, 0, 1.0);
        assert_eq!(a.to_csc().unwrap_err(), SparseError::NotCompacted);
        a.compact();
        let csc = a.to_csc().unwrap();
        assert_eq!(csc.nnz(), 1);
    }

    #[test]
    fn csc_export_matches_dense() {
        let mut a = SparseMatrixAssembler::with_limits(3, 3);
        a.assign(0, 0, 2.0);
        a.assign(2, 0, -1.0);
        a.assign(1, 1, 3.0);
        a.assign(1, 1, 1.0);
        a.assign(0, 2, 5.0);
        let dense = a.to_dense().unwrap();
        a.compact();
        let csc = a.to_csc().unwrap();
        let from_csc = DMatrix::from(&csc);
        assert_eq!(dense, from_csc);
        assert_eq!(dense[(1, 1)], 4.0);
    }

    #[test]
    fn out_of_range_entries_fail_export() {
        let mut a = SparseMatrixAssembler::with_limits(2, 2);
        a.assign(3, 0, 1.0);
        assert!(matches!(
            a.to_dense(),
            Err(SparseError::OutOfRange { row: 3, .. })
        ));
        a.compact();
        assert!(matches!(a.to_csc(), Err(SparseError::OutOfRange { .. })));
    }

    #[test]
    fn unbounded_dense_export_fails() {
        let mut a = SparseMatrixAssembler::new();
        a.assign(0, 0, 1.0);
        assert!(matches!(a.to_dense(), Err(SparseError::Unbounded { .. })));
    }

    #[test]
    fn find_missing_reports_empty_rows() {
        let mut a = SparseMatrixAssembler::with_limits(4, 4);
        a.assign(0, 0, 1.0);
        a.assign(2, 1, 1.0);
        assert_eq!(a.find_missing(), vec![1, 3]);
    }

    #[test]
    fn merge_accumulates_other_contributions() {
        let mut a = SparseMatrixAssembler::with_limits(2, 2);
        a.assign(0, 0, 1.0);
        let mut b = SparseMatrixAssembler::with_limits(2, 2);
        b.assign(0, 0, 2.0);
        b.assign(1, 1, 1.0);
        a.merge(&b);
        a.compact();
        assert_eq!(a.size(), 2);
        assert_eq!(a.val(0), 3.0);
    }

    #[test]
    fn clear_keeps_limits() {
        let mut a = SparseMatrixAssembler::with_limits(5, 5);
        a.reserve(16);
        a.assign(1, 1, 1.0);
        a.clear();
        assert!(a.is_empty());
        assert!(a.is_compacted());
        assert_eq!(a.row_limit(), 5);
        assert!(a.capacity() >= 16);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn triplets() -> impl Strategy<Value = Vec<(usize, usize, i32)>> {
        prop::collection::vec((0usize..6, 0usize..6, -5i32..5), 0..40)
    }

    proptest! {
        #[test]
        fn compaction_preserves_dense_values(entries in triplets()) {
            let mut a = SparseMatrixAssembler::with_limits(6, 6);
            for (r, c, v) in &entries {
                a.assign(*r, *c, f64::from(*v));
            }
            let before = a.to_dense().unwrap();
            a.compact();
            let after = a.to_dense().unwrap();
            prop_assert_eq!(before, after);
        }

        #[test]
        fn compacted_entries_are_unique_and_sorted(entries in triplets()) {
            let mut a = SparseMatrixAssembler::with_limits(6, 6);
            for (r, c, v) in &entries {
                a.assign(*r, *c, f64::from(*v));
            }
            a.compact();
            let keys: Vec<(usize, usize)> = a.iter().map(|e| (e.col, e.row)).collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            prop_assert!(a.iter().all(|e| e.value != 0.0));
        }
    }
}
