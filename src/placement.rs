//! Placement legality checks against merge and print-area metadata.

use crate::types::DocumentModel;

/// Outcome of checking a candidate anchor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Legal anchor: in bounds and either unmerged or a merge's top-left cell.
    Anchorable,
    /// Outside the declared print area. The marker text stays untouched.
    OutsidePrintArea,
    /// Inside a merge range but not its anchor cell. Writing here either
    /// does nothing visible or corrupts the merge.
    InsideMergeBody,
}

/// Check whether an image may be anchored at the given 1-based position.
///
/// Print-area bounds are checked first; merge containment second. Only the
/// top-left cell of a merge carries content or attached graphics in the file
/// format, so every other cell of a merge is rejected.
pub fn check(row: u32, col: u32, model: &DocumentModel) -> Placement {
    if let Some(area) = &model.print_area {
        if !area.contains(row, col) {
            return Placement::OutsidePrintArea;
        }
    }

    if let Some(merge) = model.merge_at(row, col) {
        if !merge.is_anchor(row, col) {
            return Placement::InsideMergeBody;
        }
    }

    Placement::Anchorable
}

/// Convenience predicate over [`check`].
pub fn can_place(row: u32, col: u32, model: &DocumentModel) -> bool {
    check(row, col, model) == Placement::Anchorable
}
