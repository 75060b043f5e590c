//! Per-run diagnostics returned alongside the reconstructed document.

use serde::Serialize;

/// Counts describing what one reconstruction run did and skipped.
///
/// The engine never silently drops work: every assignment that was not
/// materialized shows up in exactly one of the `skipped_*` counters, and a
/// merge-count discrepancy is visible via the `merges_*` fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Assignments produced by the assignment engine.
    pub assigned: usize,
    /// Assignments materialized as anchored images.
    pub placed: usize,
    /// Skipped: person/variant not found in the pool at reconstruction time.
    pub skipped_missing_asset: usize,
    /// Skipped: bitmap decode or rotation failed.
    pub skipped_render_failed: usize,
    /// Skipped: position outside the declared print area. Expected, not a
    /// failure; the marker text is left untouched.
    pub skipped_out_of_bounds: usize,
    /// Skipped: position is a non-anchor cell of a merge range.
    pub skipped_merge_body: usize,

    /// Raster cache statistics for the run.
    pub cache_hits: usize,
    pub cache_misses: usize,

    /// Merge ranges declared in the source document.
    pub merges_original: usize,
    /// Ranges still present after image insertion.
    pub merges_intact: usize,
    /// Ranges re-applied by the restoration pass.
    pub merges_restored: usize,
    /// Ranges that could not be re-applied; the run still returns a buffer.
    pub merges_failed: usize,

    /// Whether the print-area defined name had to be re-applied.
    pub print_area_restored: bool,

    /// True when no name column was located; zero assignments follow.
    pub name_column_missing: bool,
}

impl RunReport {
    /// Whether some original merge ranges are missing from the output.
    pub fn has_merge_discrepancy(&self) -> bool {
        self.merges_failed > 0
    }
}
