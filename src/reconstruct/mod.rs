//! Document reconstruction: clear markers, anchor signature images, restore
//! structural metadata, serialize.
//!
//! The run owns a freshly loaded part map and a raster cache; neither is
//! shared across runs. Inserting drawings is known to interact badly with
//! merge and print-area declarations in common tooling, so both are
//! snapshotted up front and explicitly re-applied at the end, with the
//! discrepancy accounted for in the run report.

mod drawing;
mod package;
mod worksheet_patch;

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::{Result, XlsignError};
use crate::options::EngineOptions;
use crate::parser;
use crate::placement::{self, Placement};
use crate::raster::{RasterCache, RenderOutcome};
use crate::types::{Assignment, RunReport, SignaturePool};

use drawing::{
    append_anchors_to_drawing, append_relationships, drawing_document, ensure_content_types,
    next_rid, parse_rels, px_offset_to_emu, px_to_emu, rels_path_for, resolve_relative_path,
    AnchorSpec, REL_TYPE_DRAWING, REL_TYPE_IMAGE,
};
use package::Package;
use worksheet_patch::{append_merges, patch_sheet, read_merge_refs, PatchPlan};

/// Cooperative yield point called between batches of the main pass.
/// Receives (processed, total).
pub type ProgressFn<'a> = &'a mut dyn FnMut(usize, usize);

/// Rebuild the document with the given assignments materialized.
///
/// Always returns either a usable buffer plus its [`RunReport`], or one
/// categorized fatal error. Per-assignment problems (missing asset, failed
/// render, rejected placement) never abort the run.
#[allow(clippy::too_many_lines)]
pub fn reconstruct(
    data: &[u8],
    assignments: &[Assignment],
    pool: &SignaturePool,
    options: &EngineOptions,
    mut progress: Option<ProgressFn<'_>>,
) -> Result<(Vec<u8>, RunReport)> {
    // Step 1: fresh instances for this run. The caller's buffer is never
    // mutated; concurrent runs each load their own copy.
    let model = parser::parse(data, options)?;
    let mut package = Package::load(data)?;

    let mut report = RunReport {
        assigned: assignments.len(),
        ..RunReport::default()
    };

    // Step 2: snapshot structural metadata for later restoration.
    let snapshot_merges: Vec<String> = model
        .merged_ranges
        .iter()
        .map(worksheet_patch::range_string)
        .collect();
    report.merges_original = snapshot_merges.len();
    let snapshot_print_area = model.print_area_formula.clone();

    // Placement screening. Out-of-bounds markers keep their text.
    let mut legal: Vec<&Assignment> = Vec::new();
    for a in assignments {
        match placement::check(a.row, a.col, &model) {
            Placement::Anchorable => legal.push(a),
            Placement::OutsidePrintArea => {
                debug!(row = a.row, col = a.col, "skipped, outside print area");
                report.skipped_out_of_bounds += 1;
            }
            Placement::InsideMergeBody => {
                debug!(row = a.row, col = a.col, "skipped, inside merge body");
                report.skipped_merge_body += 1;
            }
        }
    }

    // Step 3 prep: placeholder cells to clear in the pre-pass.
    let clear: HashSet<(u32, u32)> = legal.iter().map(|a| (a.row, a.col)).collect();

    // Step 4: main pass. Batched, with a cooperative yield between batches
    // so a host UI thread stays responsive. Processing order is the stable
    // order the assignments were produced in.
    let mut cache = RasterCache::new();
    // (variant, rotation) -> index into `media`
    let mut media_index: HashMap<(String, i32), usize> = HashMap::new();
    // (png bytes, width, height)
    let mut media: Vec<(Vec<u8>, u32, u32)> = Vec::new();
    // (assignment, media slot)
    let mut placed: Vec<(&Assignment, usize)> = Vec::new();

    let total = legal.len();
    for (i, &a) in legal.iter().enumerate() {
        if i > 0 && i % options.batch_size == 0 {
            if let Some(cb) = progress.as_mut() {
                cb(i, total);
            }
        }

        let Some(asset) = pool.asset(&a.base_name, &a.variant_id) else {
            warn!(
                name = %a.base_name,
                variant = %a.variant_id,
                "assignment references an asset missing from the pool"
            );
            report.skipped_missing_asset += 1;
            continue;
        };

        let key = (a.variant_id.clone(), a.rotation_deg);
        let slot = match cache.get_or_render(asset, a.rotation_deg, options) {
            RenderOutcome::Bitmap(bmp) => {
                if let Some(&slot) = media_index.get(&key) {
                    slot
                } else {
                    let slot = media.len();
                    media.push((bmp.png.clone(), bmp.width, bmp.height));
                    media_index.insert(key, slot);
                    slot
                }
            }
            RenderOutcome::Unavailable => {
                report.skipped_render_failed += 1;
                continue;
            }
        };

        placed.push((a, slot));
        report.placed += 1;
    }
    if let Some(cb) = progress.as_mut() {
        cb(total, total);
    }
    let (hits, misses) = cache.stats();
    report.cache_hits = hits;
    report.cache_misses = misses;

    // Wire media, drawing, and relationship parts.
    let sheet_drawing_rid = if placed.is_empty() {
        None
    } else {
        Some(install_drawing(&mut package, &model.sheet_path, &placed, &media, options)?)
    };

    // Steps 3+4 applied to the worksheet part, plus the optional trim.
    let plan = PatchPlan {
        clear,
        drawing_rid: sheet_drawing_rid,
        keep_rows: if options.trim_outside_print_area {
            model.print_area
        } else {
            None
        },
    };
    let sheet_xml = package
        .get(&model.sheet_path)
        .ok_or_else(|| {
            XlsignError::ReconstructionFailed(format!(
                "worksheet part {} vanished from the container",
                model.sheet_path
            ))
        })?
        .to_vec();
    package.set(&model.sheet_path, patch_sheet(&sheet_xml, &plan)?);

    // Step 5: merge restoration against the mutated part.
    restore_merges(&mut package, &model.sheet_path, &snapshot_merges, &mut report)?;

    // Print-area restoration against the workbook part.
    if let Some(ref formula) = snapshot_print_area {
        restore_print_area(&mut package, formula, &mut report)?;
    }

    // Step 7: serialize and validate.
    let out = package.save()?;
    if out.len() < 512 {
        return Err(XlsignError::ReconstructionFailed(format!(
            "output buffer is undersized ({} bytes)",
            out.len()
        )));
    }
    if !out.starts_with(b"PK\x03\x04") {
        return Err(XlsignError::ReconstructionFailed(
            "output buffer is missing the container signature".to_string(),
        ));
    }

    info!(
        placed = report.placed,
        skipped = report.assigned - report.placed,
        merges_restored = report.merges_restored,
        "reconstruction complete"
    );
    Ok((out, report))
}

/// Create or extend the drawing wiring for the sheet: media parts, drawing
/// part, both relationship files, and the content-type registrations.
/// Returns the relationship id the worksheet should reference.
fn install_drawing(
    package: &mut Package,
    sheet_path: &str,
    placed: &[(&Assignment, usize)],
    media: &[(Vec<u8>, u32, u32)],
    options: &EngineOptions,
) -> Result<String> {
    let sheet_rels_path = rels_path_for(sheet_path);
    let sheet_rels = parse_rels(package.get(&sheet_rels_path).unwrap_or_default());

    // Reuse an existing drawing if the sheet already has one; otherwise
    // allocate the next free drawing part.
    let existing = sheet_rels.iter().find(|e| e.rel_type == REL_TYPE_DRAWING);
    let sheet_dir = sheet_path.rsplit_once('/').map_or("", |(d, _)| d);
    let (drawing_rid, drawing_path, is_new_drawing) = match existing {
        Some(entry) => (
            entry.id.clone(),
            resolve_relative_path(sheet_dir, &entry.target),
            false,
        ),
        None => {
            let mut n = 1;
            while package.contains(&format!("xl/drawings/drawing{n}.xml")) {
                n += 1;
            }
            (
                format!("rId{}", next_rid(&sheet_rels)),
                format!("xl/drawings/drawing{n}.xml"),
                true,
            )
        }
    };

    // Media parts, one per rendered bitmap, with non-colliding names.
    let mut media_n = 1;
    let mut media_targets: Vec<String> = Vec::with_capacity(media.len());
    for (png, _, _) in media {
        while package.contains(&format!("xl/media/signature{media_n}.png")) {
            media_n += 1;
        }
        let path = format!("xl/media/signature{media_n}.png");
        package.set(&path, png.clone());
        media_targets.push(format!("../media/signature{media_n}.png"));
        media_n += 1;
    }

    // Image relationships inside the drawing's rels.
    let drawing_rels_path = rels_path_for(&drawing_path);
    let drawing_rels = parse_rels(package.get(&drawing_rels_path).unwrap_or_default());
    let rid_base = next_rid(&drawing_rels);
    let image_rids: Vec<String> = (0..media.len())
        .map(|i| format!("rId{}", rid_base + u32::try_from(i).unwrap_or(0)))
        .collect();

    let new_rels: Vec<(String, &str, String)> = image_rids
        .iter()
        .zip(media_targets.iter())
        .map(|(rid, target)| (rid.clone(), REL_TYPE_IMAGE, target.clone()))
        .collect();
    let patched_rels =
        append_relationships(package.get(&drawing_rels_path), &new_rels)?;
    package.set(&drawing_rels_path, patched_rels);

    // Anchors. Shape ids must not collide with anything already in the part.
    let shape_base: u32 = if is_new_drawing { 1 } else { 1_001 };
    let mut anchors: Vec<AnchorSpec> = Vec::with_capacity(placed.len());
    for (i, (a, slot)) in placed.iter().enumerate() {
        let Some((_, bmp_w, bmp_h)) = media.get(*slot) else {
            continue;
        };
        let width_px = options.footprint_px * a.scale;
        let aspect = if *bmp_w == 0 {
            1.0
        } else {
            f64::from(*bmp_h) / f64::from(*bmp_w)
        };
        let height_px = width_px * aspect;

        anchors.push(AnchorSpec {
            col: a.col.saturating_sub(1),
            row: a.row.saturating_sub(1),
            col_off_emu: px_offset_to_emu(a.offset_x_px),
            row_off_emu: px_offset_to_emu(a.offset_y_px),
            ext_cx_emu: px_to_emu(width_px),
            ext_cy_emu: px_to_emu(height_px),
            rel_id: image_rids.get(*slot).cloned().unwrap_or_default(),
            shape_id: shape_base + u32::try_from(i).unwrap_or(0),
        });
    }

    let drawing_part = match package.get(&drawing_path) {
        Some(existing_xml) if !is_new_drawing => {
            append_anchors_to_drawing(existing_xml, &anchors)?
        }
        _ => drawing_document(&anchors),
    };
    package.set(&drawing_path, drawing_part);

    // Sheet-side relationship, unless the sheet already had one.
    if is_new_drawing {
        let sheet_dir_rel = drawing_path
            .strip_prefix("xl/")
            .map_or(drawing_path.as_str(), |p| p);
        let target = format!("../{sheet_dir_rel}");
        let patched = append_relationships(
            package.get(&sheet_rels_path),
            &[(drawing_rid.clone(), REL_TYPE_DRAWING, target)],
        )?;
        package.set(&sheet_rels_path, patched);
    }

    // Content types: PNG default always, override only for a fresh part.
    let ct = package.get("[Content_Types].xml").ok_or_else(|| {
        XlsignError::ReconstructionFailed("container has no content types part".to_string())
    })?;
    let new_part = is_new_drawing.then_some(drawing_path.as_str());
    let patched_ct = ensure_content_types(ct, new_part)?;
    package.set("[Content_Types].xml", patched_ct);

    Ok(drawing_rid)
}

/// Compare the mutated sheet's merges against the snapshot and re-apply
/// whatever went missing. Individual failures are recorded, never fatal.
fn restore_merges(
    package: &mut Package,
    sheet_path: &str,
    snapshot: &[String],
    report: &mut RunReport,
) -> Result<()> {
    let sheet_xml = package.get(sheet_path).map(<[u8]>::to_vec).unwrap_or_default();
    let current: HashSet<String> = read_merge_refs(&sheet_xml)?.into_iter().collect();

    let mut missing: Vec<String> = Vec::new();
    for range in snapshot {
        if current.contains(range) {
            report.merges_intact += 1;
        } else if worksheet_patch::reparseable(range) {
            missing.push(range.clone());
        } else {
            warn!(range = %range, "merge range cannot be re-applied");
            report.merges_failed += 1;
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    match append_merges(&sheet_xml, &missing) {
        Ok(patched) => {
            package.set(sheet_path, patched);
            // Verify against the part we just wrote.
            let after: HashSet<String> = read_merge_refs(
                package.get(sheet_path).unwrap_or_default(),
            )?
            .into_iter()
            .collect();
            for range in &missing {
                if after.contains(range) {
                    report.merges_restored += 1;
                } else {
                    warn!(range = %range, "merge range did not survive restoration");
                    report.merges_failed += 1;
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "merge restoration pass failed");
            report.merges_failed += missing.len();
        }
    }
    Ok(())
}

/// Re-apply the print-area defined name when it no longer matches the
/// snapshot formula.
fn restore_print_area(
    package: &mut Package,
    snapshot_formula: &str,
    report: &mut RunReport,
) -> Result<()> {
    let Some(workbook_xml) = package.get("xl/workbook.xml").map(<[u8]>::to_vec) else {
        return Ok(());
    };

    let current = read_print_area_formula(&workbook_xml);
    if current.as_deref() == Some(snapshot_formula) {
        return Ok(());
    }

    let patched = write_print_area(&workbook_xml, snapshot_formula)?;
    package.set("xl/workbook.xml", patched);
    report.print_area_restored = true;
    debug!(formula = snapshot_formula, "print area re-applied");
    Ok(())
}

/// The first-sheet print-area formula currently in workbook.xml, if any.
fn read_print_area_formula(workbook_xml: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(workbook_xml).ok()?;
    let mut reader = quick_xml::Reader::from_str(text);
    let mut in_target = false;
    let mut value = String::new();

    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"definedName" {
                    let is_print_area = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"name" && a.value.as_ref() == b"_xlnm.Print_Area"
                    });
                    if is_print_area {
                        in_target = true;
                        value.clear();
                    }
                }
            }
            Ok(quick_xml::events::Event::Text(ref t)) if in_target => {
                if let Ok(s) = t.unescape() {
                    value.push_str(&s);
                }
            }
            Ok(quick_xml::events::Event::End(ref e)) => {
                if e.local_name().as_ref() == b"definedName" && in_target {
                    return Some(value);
                }
            }
            Ok(quick_xml::events::Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    None
}

/// Insert or replace the first-sheet print-area defined name.
fn write_print_area(workbook_xml: &[u8], formula: &str) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(workbook_xml).map_err(|_| {
        XlsignError::MalformedDocument("workbook part is not UTF-8".to_string())
    })?;

    let element = format!(
        r#"<definedName name="_xlnm.Print_Area" localSheetId="0">{}</definedName>"#,
        worksheet_patch::xml_escape(formula)
    );

    // Replace an existing declaration wholesale.
    if let Some(start) = text.find(r#"name="_xlnm.Print_Area""#) {
        let elem_start = text.get(..start).and_then(|s| s.rfind("<definedName"))
            .ok_or_else(|| {
                XlsignError::ReconstructionFailed("malformed definedName element".to_string())
            })?;
        let elem_end = text
            .get(elem_start..)
            .and_then(|s| s.find("</definedName>").map(|p| elem_start + p + "</definedName>".len()))
            .or_else(|| {
                // self-closing form
                text.get(elem_start..)
                    .and_then(|s| s.find("/>").map(|p| elem_start + p + 2))
            })
            .ok_or_else(|| {
                XlsignError::ReconstructionFailed("unterminated definedName element".to_string())
            })?;
        let mut out = String::with_capacity(text.len() + element.len());
        out.push_str(text.get(..elem_start).unwrap_or(""));
        out.push_str(&element);
        out.push_str(text.get(elem_end..).unwrap_or(""));
        return Ok(out.into_bytes());
    }

    // Append into an existing definedNames block.
    if let Some(at) = text.find("</definedNames>") {
        let mut out = String::with_capacity(text.len() + element.len());
        out.push_str(text.get(..at).unwrap_or(""));
        out.push_str(&element);
        out.push_str(text.get(at..).unwrap_or(""));
        return Ok(out.into_bytes());
    }

    // No block at all: it belongs right after </sheets>.
    if let Some(pos) = text.find("</sheets>") {
        let at = pos + "</sheets>".len();
        let mut out = String::with_capacity(text.len() + element.len() + 32);
        out.push_str(text.get(..at).unwrap_or(""));
        out.push_str("<definedNames>");
        out.push_str(&element);
        out.push_str("</definedNames>");
        out.push_str(text.get(at..).unwrap_or(""));
        return Ok(out.into_bytes());
    }

    Err(XlsignError::ReconstructionFailed(
        "workbook part has no sheets element".to_string(),
    ))
}
