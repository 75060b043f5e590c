//! Canonical in-memory model of a single-sheet ledger workbook.

use serde::Serialize;

/// A rectangular cell range. 1-based, inclusive on both ends.
///
/// Invariant: `start_row <= end_row` and `start_col <= end_col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl CellRange {
    /// Whether the given 1-based position lies inside this range.
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    /// Whether the given position is the top-left anchor of this range.
    pub fn is_anchor(&self, row: u32, col: u32) -> bool {
        row == self.start_row && col == self.start_col
    }
}

/// One cell, flattened to display text.
#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    /// 1-based row index.
    pub row: u32,
    /// 1-based column index.
    pub col: u32,
    /// Flattened display text: formulas resolve to their cached result,
    /// rich text concatenates its runs, empty cells are "".
    pub value: String,
}

impl Cell {
    /// "A1"-style address of this cell.
    pub fn address(&self) -> String {
        crate::cell_ref::cell_ref_string(self.row, self.col)
    }
}

/// One row of the sheet, in source order.
#[derive(Debug, Clone, Serialize)]
pub struct Row {
    /// 1-based row index as declared in the sheet XML.
    pub index: u32,
    pub cells: Vec<Cell>,
}

impl Row {
    /// Whether every cell in this row flattened to empty text.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.value.is_empty())
    }
}

/// Immutable model of the source document, built once per run.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentModel {
    pub sheet_name: String,
    /// ZIP path of the worksheet part, e.g. "xl/worksheets/sheet1.xml".
    pub sheet_path: String,
    pub rows: Vec<Row>,
    pub merged_ranges: Vec<CellRange>,
    /// Declared print area, if any, from the `_xlnm.Print_Area` defined name.
    pub print_area: Option<CellRange>,
    /// Raw formula text of the print-area defined name, kept verbatim for
    /// round-tripping (e.g. `Sheet1!$A$1:$H$40`).
    pub print_area_formula: Option<String>,
}

impl DocumentModel {
    /// Look up a cell's flattened value; empty string when absent.
    pub fn cell_value(&self, row: u32, col: u32) -> &str {
        self.rows
            .iter()
            .find(|r| r.index == row)
            .and_then(|r| r.cells.iter().find(|c| c.col == col))
            .map_or("", |c| c.value.as_str())
    }

    /// The merge range containing the given position, if any.
    pub fn merge_at(&self, row: u32, col: u32) -> Option<&CellRange> {
        self.merged_ranges.iter().find(|m| m.contains(row, col))
    }
}
