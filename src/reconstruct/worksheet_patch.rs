//! Stream patching of worksheet XML.
//!
//! The reader walks the original part and records byte spans to replace;
//! the output is spliced from the original text, so every untouched byte of
//! the worksheet (styles, widths, validation, page setup) survives verbatim.

use std::collections::HashSet;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::cell_ref::{cell_ref_string, normalize_range, parse_cell_range, parse_cell_ref};
use crate::error::{Result, XlsignError};
use crate::types::CellRange;

/// What one patch pass should do to the worksheet part.
#[derive(Debug, Default)]
pub(super) struct PatchPlan {
    /// Placeholder cells whose text content is cleared. Attributes other
    /// than the value type survive, so styling is untouched.
    pub clear: HashSet<(u32, u32)>,
    /// Attach `<drawing r:id="..."/>` unless the sheet already has one.
    pub drawing_rid: Option<String>,
    /// When set, drop `<row>` elements whose index lies outside these row
    /// bounds (the declared print area).
    pub keep_rows: Option<CellRange>,
}

/// One span replacement in the original text.
struct Edit {
    start: usize,
    end: usize,
    replacement: String,
}

/// Apply the plan to a worksheet part.
pub(super) fn patch_sheet(xml: &[u8], plan: &PatchPlan) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(xml)
        .map_err(|_| XlsignError::MalformedDocument("worksheet part is not UTF-8".to_string()))?;
    let mut reader = Reader::from_str(text);
    let mut edits: Vec<Edit> = Vec::new();

    let mut current_row: u32 = 0;
    let mut last_col: u32 = 0;
    let mut saw_drawing = plan.drawing_rid.is_none();
    let mut drawing_insert_at: Option<usize> = None;
    // Element depth: 1 = direct child of <worksheet>. The drawing reference
    // must precede extLst/tableParts, but only the worksheet-level ones.
    let mut depth: u32 = 0;

    loop {
        let start = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = row_index(e, current_row);
                    last_col = 0;
                    if row_trimmed(current_row, plan) {
                        reader.read_to_end(e.name())?;
                        edits.push(Edit {
                            start,
                            end: reader.buffer_position(),
                            replacement: String::new(),
                        });
                    } else {
                        depth += 1;
                    }
                }
                b"c" => {
                    let col = cell_col(e, last_col);
                    last_col = col;
                    if plan.clear.contains(&(current_row, col)) {
                        reader.read_to_end(e.name())?;
                        edits.push(Edit {
                            start,
                            end: reader.buffer_position(),
                            replacement: cleared_cell(e),
                        });
                    } else {
                        depth += 1;
                    }
                }
                b"drawing" => {
                    saw_drawing = true;
                    depth += 1;
                }
                b"extLst" | b"tableParts" => {
                    if depth == 1 && drawing_insert_at.is_none() {
                        drawing_insert_at = Some(start);
                    }
                    depth += 1;
                }
                _ => depth += 1,
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = row_index(e, current_row);
                    last_col = 0;
                    if row_trimmed(current_row, plan) {
                        edits.push(Edit {
                            start,
                            end: reader.buffer_position(),
                            replacement: String::new(),
                        });
                    }
                }
                b"c" => {
                    // Self-closing cells carry no value; nothing to clear.
                    last_col = cell_col(e, last_col);
                }
                b"drawing" => saw_drawing = true,
                b"extLst" | b"tableParts" => {
                    if depth == 1 && drawing_insert_at.is_none() {
                        drawing_insert_at = Some(start);
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => {
                depth = depth.saturating_sub(1);
                if e.local_name().as_ref() == b"worksheet" && drawing_insert_at.is_none() {
                    drawing_insert_at = Some(start);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
    }

    if !saw_drawing {
        if let (Some(rid), Some(at)) = (&plan.drawing_rid, drawing_insert_at) {
            edits.push(Edit {
                start: at,
                end: at,
                replacement: format!("<drawing r:id=\"{}\"/>", xml_escape(rid)),
            });
        }
    }

    Ok(splice(text, edits).into_bytes())
}

/// Collect the sheet's merge declarations as normalized "A1:B2" strings.
pub(super) fn read_merge_refs(xml: &[u8]) -> Result<Vec<String>> {
    let text = std::str::from_utf8(xml)
        .map_err(|_| XlsignError::MalformedDocument("worksheet part is not UTF-8".to_string()))?;
    let mut reader = Reader::from_str(text);
    let mut refs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e) | Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"mergeCell" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"ref" {
                            if let Some(norm) = std::str::from_utf8(&attr.value)
                                .ok()
                                .and_then(normalize_range)
                            {
                                refs.push(norm);
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
    }

    Ok(refs)
}

/// Re-append merge ranges missing from the part.
///
/// The existing `mergeCells` block is rebuilt with its original entries plus
/// the missing ones and a corrected `count`. A sheet with no block at all
/// gets one right after `</sheetData>`, the only schema-legal spot.
pub(super) fn append_merges(xml: &[u8], missing: &[String]) -> Result<Vec<u8>> {
    if missing.is_empty() {
        return Ok(xml.to_vec());
    }
    let text = std::str::from_utf8(xml)
        .map_err(|_| XlsignError::MalformedDocument("worksheet part is not UTF-8".to_string()))?;
    let mut reader = Reader::from_str(text);

    let mut block_span: Option<(usize, usize)> = None;
    let mut existing: Vec<String> = Vec::new();
    let mut after_sheet_data: Option<usize> = None;

    loop {
        let start = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"mergeCells" => {
                    // Walk the block manually so existing refs keep their
                    // original spelling.
                    loop {
                        match reader.read_event() {
                            Ok(Event::Start(ref inner) | Event::Empty(ref inner)) => {
                                if inner.local_name().as_ref() == b"mergeCell" {
                                    for attr in inner.attributes().flatten() {
                                        if attr.key.as_ref() == b"ref" {
                                            if let Ok(s) = std::str::from_utf8(&attr.value) {
                                                existing.push(s.to_string());
                                            }
                                        }
                                    }
                                }
                            }
                            Ok(Event::End(ref inner))
                                if inner.local_name().as_ref() == b"mergeCells" =>
                            {
                                break;
                            }
                            Ok(Event::Eof) | Err(_) => break,
                            _ => {}
                        }
                    }
                    block_span = Some((start, reader.buffer_position()));
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"mergeCells" {
                    block_span = Some((start, reader.buffer_position()));
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"sheetData" && after_sheet_data.is_none() {
                    after_sheet_data = Some(reader.buffer_position());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
    }

    let block = merge_cells_block(&existing, missing);
    let edit = match (block_span, after_sheet_data) {
        (Some((start, end)), _) => Edit {
            start,
            end,
            replacement: block,
        },
        (None, Some(at)) => Edit {
            start: at,
            end: at,
            replacement: block,
        },
        (None, None) => {
            return Err(XlsignError::ReconstructionFailed(
                "worksheet has no sheetData to anchor merge restoration".to_string(),
            ))
        }
    };

    Ok(splice(text, vec![edit]).into_bytes())
}

/// Drop assignments' cleared cell down to an attribute-only element.
fn cleared_cell(e: &quick_xml::events::BytesStart<'_>) -> String {
    let mut out = String::from("<c");
    for attr in e.attributes().flatten() {
        // The t attribute describes the removed value; everything else
        // (reference, style index) stays.
        if attr.key.as_ref() == b"t" {
            continue;
        }
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(attr.key.as_ref()));
        out.push_str("=\"");
        out.push_str(&String::from_utf8_lossy(&attr.value));
        out.push('"');
    }
    out.push_str("/>");
    out
}

fn merge_cells_block(existing: &[String], missing: &[String]) -> String {
    let mut out = format!("<mergeCells count=\"{}\">", existing.len() + missing.len());
    for r in existing.iter().chain(missing.iter()) {
        out.push_str("<mergeCell ref=\"");
        out.push_str(&xml_escape(r));
        out.push_str("\"/>");
    }
    out.push_str("</mergeCells>");
    out
}

fn row_index(e: &quick_xml::events::BytesStart<'_>, previous: u32) -> u32 {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"r" {
            if let Some(idx) = std::str::from_utf8(&attr.value).ok().and_then(|s| s.parse().ok()) {
                return idx;
            }
        }
    }
    previous.saturating_add(1)
}

fn cell_col(e: &quick_xml::events::BytesStart<'_>, last_col: u32) -> u32 {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"r" {
            if let Some((_, col)) = std::str::from_utf8(&attr.value).ok().and_then(parse_cell_ref) {
                return col;
            }
        }
    }
    last_col.saturating_add(1)
}

fn row_trimmed(row: u32, plan: &PatchPlan) -> bool {
    plan.keep_rows
        .is_some_and(|keep| row < keep.start_row || row > keep.end_row)
}

/// Apply non-overlapping span edits to the source text.
fn splice(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| e.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for edit in edits {
        if edit.start < cursor {
            continue; // overlapping edit, already covered
        }
        out.push_str(text.get(cursor..edit.start).unwrap_or(""));
        out.push_str(&edit.replacement);
        cursor = edit.end;
    }
    out.push_str(text.get(cursor..).unwrap_or(""));
    out
}

/// Minimal XML escaping for attribute/text content.
pub(super) fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalized "A1:B2" spelling of a model range, the form the restoration
/// accounting compares against.
pub(super) fn range_string(range: &CellRange) -> String {
    format!(
        "{}:{}",
        cell_ref_string(range.start_row, range.start_col),
        cell_ref_string(range.end_row, range.end_col)
    )
}

/// Whether a normalized ref survives a parse round trip; used to classify
/// restoration failures.
pub(super) fn reparseable(range: &str) -> bool {
    parse_cell_range(range).is_some()
}
