//! Tunable limits and transform bands for a pipeline run.

use std::ops::RangeInclusive;

/// Engine configuration. The defaults are tuned for real-world safety/payroll
/// ledger templates and are what the CLI and wasm entry points use.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Hard cap on emitted rows. Ledger templates routinely carry formatting
    /// on tens of thousands of nominally empty trailing rows.
    pub max_rows: u32,
    /// Stop parsing once this many consecutive fully-empty rows are seen.
    pub empty_row_run_limit: u32,
    /// How many leading rows to scan for the name-column header.
    pub header_scan_rows: u32,

    /// Whole-degree rotation band for placed signatures.
    pub rotation_range: RangeInclusive<i32>,
    /// Scale band applied to the signature footprint.
    pub scale_range: (f64, f64),
    /// Sub-cell pixel offset band, applied on both axes.
    pub offset_range: RangeInclusive<i32>,

    /// Largest source dimension kept when rasterizing; larger images are
    /// downscaled, smaller ones are never upscaled.
    pub raster_ceiling_px: u32,
    /// Hardware-safe maximum for any rotation canvas side. Exceeding it is a
    /// render failure for that asset, not a crash.
    pub max_surface_px: u32,

    /// Unscaled width of the placed signature box, in pixels. Height follows
    /// the bitmap's aspect ratio.
    pub footprint_px: f64,
    /// Assignments processed between cooperative yields in the main pass.
    pub batch_size: usize,
    /// Drop rows wholly outside a declared print area from the output.
    pub trim_outside_print_area: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            empty_row_run_limit: 100,
            header_scan_rows: 50,
            rotation_range: -5..=5,
            scale_range: (0.95, 1.10),
            offset_range: 0..=6,
            raster_ceiling_px: 800,
            max_surface_px: 16_384,
            footprint_px: 96.0,
            batch_size: 20,
            trim_outside_print_area: false,
        }
    }
}
