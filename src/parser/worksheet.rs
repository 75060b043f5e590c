//! Worksheet parsing: rows, flattened cell values, and merge ranges.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{BufReader, Read, Seek};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::cell_ref::{parse_cell_range, parse_cell_ref};
use crate::error::{Result, XlsignError};
use crate::options::EngineOptions;
use crate::types::{Cell, CellRange, Row};

/// Cell type tag from the `t` attribute of a `<c>` element.
#[derive(Copy, Clone)]
enum CellTypeTag {
    Shared,
    Inline,
    Str,
    Bool,
    Error,
    Number,
    Unknown,
}

fn parse_cell_type_tag(value: &[u8]) -> CellTypeTag {
    match value {
        b"s" => CellTypeTag::Shared,
        b"b" => CellTypeTag::Bool,
        b"e" => CellTypeTag::Error,
        b"str" => CellTypeTag::Str,
        b"inlineStr" => CellTypeTag::Inline,
        b"n" => CellTypeTag::Number,
        _ => CellTypeTag::Unknown,
    }
}

/// Parse one worksheet part into rows and merge ranges.
///
/// All cells are flattened to display text with a total type dispatch;
/// formula cells resolve to their cached `<v>` result. Two guards protect
/// against real-world "infinite" templates: a hard row cap and a limit on
/// consecutive fully-empty rows (gaps in `r=` indices count toward the run).
#[allow(clippy::too_many_lines)]
pub(super) fn parse_sheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    sheet_path: &str,
    shared_strings: &[String],
    options: &EngineOptions,
) -> Result<(Vec<Row>, Vec<CellRange>)> {
    let file = archive.by_name(sheet_path).map_err(|_| {
        XlsignError::MalformedDocument(format!("missing worksheet part {sheet_path}"))
    })?;

    let reader = BufReader::new(file);
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(false);

    let mut rows: Vec<Row> = Vec::new();
    let mut merges: Vec<CellRange> = Vec::new();

    let mut buf = Vec::new();
    let mut cell_buf = Vec::new();

    let mut current_row: Option<Row> = None;
    let mut last_row_index: u32 = 0;
    let mut empty_run: u32 = 0;
    let mut row_cap_hit = false;

    'document: loop {
        match xml.read_event_into(&mut buf) {
            Ok(ref event @ (Event::Start(_) | Event::Empty(_))) => {
                let (Event::Start(ref e) | Event::Empty(ref e)) = event else {
                    continue;
                };
                let is_start_event = matches!(event, Event::Start(_));

                match e.local_name().as_ref() {
                    b"row" => {
                        if let Some(row) = current_row.take() {
                            if finish_row(row, &mut rows, &mut empty_run) > options.empty_row_run_limit
                            {
                                debug!(
                                    run = empty_run,
                                    "empty-row run limit reached, stopping row scan"
                                );
                                break 'document;
                            }
                        }

                        let mut index = last_row_index + 1;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"r" {
                                index = std::str::from_utf8(&attr.value)
                                    .ok()
                                    .and_then(|s| s.parse().ok())
                                    .unwrap_or(index);
                            }
                        }

                        // Rows absent from the XML are fully empty; they
                        // count toward the empty run.
                        let gap = index.saturating_sub(last_row_index).saturating_sub(1);
                        empty_run = empty_run.saturating_add(gap);
                        if empty_run > options.empty_row_run_limit {
                            debug!(run = empty_run, "empty-row gap exceeds limit, stopping");
                            break 'document;
                        }
                        last_row_index = index;

                        if u32::try_from(rows.len()).unwrap_or(u32::MAX) >= options.max_rows {
                            row_cap_hit = true;
                            break 'document;
                        }

                        current_row = Some(Row {
                            index,
                            cells: Vec::new(),
                        });
                    }

                    b"c" => {
                        if let Some(ref mut row) = current_row {
                            let mut col: u32 =
                                row.cells.last().map_or(0, |c| c.col).saturating_add(1);
                            let mut cell_type = CellTypeTag::Number;
                            let mut saw_unknown_tag = false;

                            for attr in e.attributes().flatten() {
                                match attr.key.as_ref() {
                                    b"r" => {
                                        if let Some((_, c)) = std::str::from_utf8(&attr.value)
                                            .ok()
                                            .and_then(parse_cell_ref)
                                        {
                                            col = c;
                                        }
                                    }
                                    b"t" => {
                                        cell_type = parse_cell_type_tag(&attr.value);
                                        if matches!(cell_type, CellTypeTag::Unknown) {
                                            saw_unknown_tag = true;
                                        }
                                    }
                                    _ => {}
                                }
                            }

                            // Child elements carry the value; self-closing
                            // cells like <c r="A1" s="3"/> have none.
                            let mut v_text: Option<String> = None;
                            let mut inline_text: Option<String> = None;
                            if is_start_event {
                                read_cell_children(
                                    &mut xml,
                                    &mut cell_buf,
                                    &mut v_text,
                                    &mut inline_text,
                                );
                            }

                            if saw_unknown_tag {
                                debug!(
                                    row = row.index,
                                    col, "unknown cell type tag, using raw value text"
                                );
                            }

                            let value =
                                flatten_value(cell_type, v_text, inline_text, shared_strings);
                            row.cells.push(Cell {
                                row: row.index,
                                col,
                                value,
                            });
                        }
                    }

                    b"mergeCell" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"ref" {
                                if let Ok(ref_str) = std::str::from_utf8(&attr.value) {
                                    if let Some(merge) = parse_cell_range(ref_str) {
                                        merges.push(merge);
                                    } else {
                                        warn!(range = ref_str, "unparseable merge range, dropped");
                                    }
                                }
                            }
                        }
                    }

                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(row) = current_row.take() {
        finish_row(row, &mut rows, &mut empty_run);
    }
    if row_cap_hit {
        debug!(cap = options.max_rows, "row cap reached, remaining rows ignored");
    }

    Ok((rows, merges))
}

/// Push a completed row and update the empty-run counter, returning it.
fn finish_row(row: Row, rows: &mut Vec<Row>, empty_run: &mut u32) -> u32 {
    if row.is_empty() {
        *empty_run = empty_run.saturating_add(1);
    } else {
        *empty_run = 0;
    }
    rows.push(row);
    *empty_run
}

/// Read the children of a `<c>` element: the `<v>` text and any inline
/// string (`<is>`, rich runs concatenated). Leaves the reader just past the
/// closing `</c>`.
fn read_cell_children<B: std::io::BufRead>(
    xml: &mut Reader<B>,
    cell_buf: &mut Vec<u8>,
    v_text: &mut Option<String>,
    inline_text: &mut Option<String>,
) {
    let mut in_v = false;
    let mut in_is = false;
    let mut in_is_t = false;
    let mut is_parts = String::new();

    loop {
        cell_buf.clear();
        match xml.read_event_into(cell_buf) {
            Ok(Event::Start(ref inner)) => match inner.local_name().as_ref() {
                b"v" => in_v = true,
                b"is" => in_is = true,
                b"t" if in_is => in_is_t = true,
                _ => {}
            },
            Ok(Event::Text(ref text)) => {
                if in_v {
                    if let Ok(s) = text.unescape() {
                        *v_text = Some(s.into_owned());
                    }
                } else if in_is_t {
                    if let Ok(s) = text.unescape() {
                        is_parts.push_str(&s);
                    }
                }
            }
            Ok(Event::End(ref inner)) => match inner.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_is_t = false,
                b"is" => {
                    in_is = false;
                    *inline_text = Some(is_parts.clone());
                }
                b"c" => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
}

/// Total mapping from the stored representation to display text.
fn flatten_value(
    tag: CellTypeTag,
    v_text: Option<String>,
    inline_text: Option<String>,
    shared_strings: &[String],
) -> String {
    match tag {
        CellTypeTag::Shared => v_text
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(|idx| shared_strings.get(idx).cloned())
            .unwrap_or_default(),
        CellTypeTag::Inline => inline_text.unwrap_or_default(),
        CellTypeTag::Bool => match v_text.as_deref().map(str::trim) {
            Some("1") | Some("true") => "TRUE".to_string(),
            Some(_) => "FALSE".to_string(),
            None => String::new(),
        },
        // str (formula string result), error codes, plain numbers, and
        // unknown tags all surface the raw value text.
        CellTypeTag::Str | CellTypeTag::Error | CellTypeTag::Number | CellTypeTag::Unknown => {
            v_text.unwrap_or_default()
        }
    }
}
