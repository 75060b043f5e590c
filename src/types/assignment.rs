//! Marker-to-signature assignments produced by the assignment engine.

use serde::Serialize;

/// One placed signature: which variant goes where, and how it is jittered.
///
/// Keyed uniquely by `(row, col)` within a run. Never mutated after
/// creation; a reshuffle builds an entirely new set.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    /// 1-based position of the placeholder cell.
    pub row: u32,
    pub col: u32,
    /// Normalized person key the variant was drawn from.
    pub base_name: String,
    /// Variant id within that person's pool entry.
    pub variant_id: String,
    /// Whole-degree rotation. Integral on purpose: it is the raster cache
    /// key's second half, so coarse values collide and bound output size.
    pub rotation_deg: i32,
    /// Footprint multiplier, drawn from a narrow band around 1.0.
    pub scale: f64,
    /// Sub-cell pixel offsets from the anchor cell's top-left corner.
    pub offset_x_px: i32,
    pub offset_y_px: i32,
}
