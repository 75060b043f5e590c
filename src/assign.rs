//! Assignment engine: pairs each placeholder marker with a signature variant
//! and a randomized transform.
//!
//! The RNG is an explicit parameter. Given a seeded source the function is
//! fully deterministic; re-running with a fresh source is the supported
//! "reshuffle" and always yields a complete, independent assignment set.

use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

use crate::header::HeaderHit;
use crate::marker::is_placeholder;
use crate::normalize::normalize_name;
use crate::options::EngineOptions;
use crate::placement::can_place;
use crate::types::{Assignment, DocumentModel, SignaturePool};

/// Produce the assignment set for one run.
///
/// Walks every data row below the header: rows with no recognized name or no
/// pool entry contribute nothing (that is not an error); each placeholder
/// cell that is a legal anchor gets exactly one assignment. Within a row,
/// variants do not repeat until all of them have been used once.
pub fn assign<R: Rng>(
    model: &DocumentModel,
    pool: &SignaturePool,
    hit: HeaderHit,
    rng: &mut R,
    options: &EngineOptions,
) -> Vec<Assignment> {
    let mut assignments = Vec::new();

    for row in &model.rows {
        if row.index <= hit.row {
            continue;
        }

        let name = normalize_name(model.cell_value(row.index, hit.col));
        if name.is_empty() {
            continue;
        }
        let Some(variants) = pool.variants(&name) else {
            debug!(row = row.index, name = %name, "no signatures for this name, skipping row");
            continue;
        };
        if variants.is_empty() {
            continue;
        }

        // Anti-repetition state, scoped to this row.
        let mut used: HashSet<usize> = HashSet::new();

        for cell in &row.cells {
            if cell.col == hit.col || !is_placeholder(&cell.value) {
                continue;
            }
            if !can_place(cell.row, cell.col, model) {
                continue;
            }

            if used.len() == variants.len() {
                // Every variant used once; start a fresh cycle.
                used.clear();
            }
            let pick = pick_unused(variants.len(), &used, rng);
            used.insert(pick);
            let Some(variant) = variants.get(pick) else {
                continue;
            };

            let (scale_lo, scale_hi) = options.scale_range;
            assignments.push(Assignment {
                row: cell.row,
                col: cell.col,
                base_name: name.clone(),
                variant_id: variant.variant_id.clone(),
                rotation_deg: rng.gen_range(options.rotation_range.clone()),
                scale: rng.gen_range(scale_lo..scale_hi),
                offset_x_px: rng.gen_range(options.offset_range.clone()),
                offset_y_px: rng.gen_range(options.offset_range.clone()),
            });
        }
    }

    debug!(count = assignments.len(), "assignment set built");
    assignments
}

/// Uniform pick among variant indexes not yet used in this row.
fn pick_unused<R: Rng>(total: usize, used: &HashSet<usize>, rng: &mut R) -> usize {
    let free: Vec<usize> = (0..total).filter(|i| !used.contains(i)).collect();
    match free.len() {
        0 => 0,
        1 => free.first().copied().unwrap_or(0),
        n => free.get(rng.gen_range(0..n)).copied().unwrap_or(0),
    }
}
