//! Parses `xl/workbook.xml` for the sheet list and defined names.
//!
//! The only defined name this engine cares about is `_xlnm.Print_Area`,
//! which must be round-tripped verbatim into the reconstructed document.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};
use zip::ZipArchive;

use crate::cell_ref::parse_cell_range;
use crate::error::{Result, XlsignError};
use crate::types::CellRange;

/// Sheet metadata from workbook.xml.
#[derive(Debug)]
pub(super) struct SheetInfo {
    pub name: String,
    pub path: String,
}

/// A `<definedName>` entry, value kept verbatim.
#[derive(Debug)]
pub(super) struct DefinedName {
    pub name: String,
    pub local_sheet_id: Option<u32>,
    pub value: String,
}

#[derive(Debug, Default)]
pub(super) struct WorkbookMeta {
    pub sheets: Vec<SheetInfo>,
    pub defined_names: Vec<DefinedName>,
}

impl WorkbookMeta {
    /// The print area scoped to the first sheet, as (parsed range, verbatim
    /// formula). A name scoped elsewhere or unparseable is ignored.
    pub fn print_area_for_first_sheet(
        &self,
        sheet_name: &str,
    ) -> (Option<CellRange>, Option<String>) {
        for dn in &self.defined_names {
            if dn.name != "_xlnm.Print_Area" {
                continue;
            }
            let scoped_here = match dn.local_sheet_id {
                Some(id) => id == 0,
                None => formula_sheet_name(&dn.value).is_some_and(|n| n == sheet_name),
            };
            if !scoped_here {
                continue;
            }
            let range = extract_range_from_formula(&dn.value).and_then(|r| parse_cell_range(&r));
            return (range, Some(dn.value.clone()));
        }
        (None, None)
    }
}

/// Parse workbook.xml for sheet info and defined names.
pub(super) fn parse_workbook_xml<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    worksheet_rels: &HashMap<String, String>,
) -> Result<WorkbookMeta> {
    let file = archive.by_name("xl/workbook.xml").map_err(|_| {
        XlsignError::MalformedDocument("missing xl/workbook.xml".to_string())
    })?;

    let reader = BufReader::new(file);
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);

    let mut meta = WorkbookMeta::default();
    let mut buf = Vec::new();
    let mut in_defined_names = false;
    let mut current_defined_name: Option<DefinedName> = None;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"definedNames" => in_defined_names = true,
                b"definedName" if in_defined_names => {
                    current_defined_name = Some(parse_defined_name_attributes(e));
                }
                b"sheet" => {
                    if let Some(info) = parse_sheet_element(e, worksheet_rels, meta.sheets.len()) {
                        meta.sheets.push(info);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    if let Some(info) = parse_sheet_element(e, worksheet_rels, meta.sheets.len()) {
                        meta.sheets.push(info);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(ref mut dn) = current_defined_name {
                    if let Ok(text) = e.unescape() {
                        dn.value.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"definedNames" => in_defined_names = false,
                b"definedName" => {
                    if let Some(dn) = current_defined_name.take() {
                        if !dn.name.is_empty() {
                            meta.defined_names.push(dn);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(meta)
}

fn parse_defined_name_attributes(e: &quick_xml::events::BytesStart<'_>) -> DefinedName {
    let mut name = String::new();
    let mut local_sheet_id = None;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"name" => {
                name = String::from_utf8_lossy(&attr.value).into_owned();
            }
            b"localSheetId" => {
                local_sheet_id = std::str::from_utf8(&attr.value)
                    .ok()
                    .and_then(|s| s.parse().ok());
            }
            _ => {}
        }
    }

    DefinedName {
        name,
        local_sheet_id,
        value: String::new(),
    }
}

fn parse_sheet_element(
    e: &quick_xml::events::BytesStart<'_>,
    worksheet_rels: &HashMap<String, String>,
    sheet_index: usize,
) -> Option<SheetInfo> {
    let mut name = String::new();
    let mut r_id = String::new();

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"name" => {
                name = String::from_utf8_lossy(&attr.value).into_owned();
            }
            // r:id attribute (namespace prefixed)
            key if key.ends_with(b":id") || key == b"id" => {
                r_id = String::from_utf8_lossy(&attr.value).into_owned();
            }
            _ => {}
        }
    }

    if name.is_empty() {
        return None;
    }

    // Prefer the rels target, fall back to the conventional path.
    let path = worksheet_rels.get(&r_id).cloned().unwrap_or_else(|| {
        let idx = sheet_index + 1;
        format!("xl/worksheets/sheet{idx}.xml")
    });

    Some(SheetInfo { name, path })
}

/// Extract the range part from a formula like `Sheet1!$A$1:$D$10` or
/// `'My Sheet'!$A$1:$D$10`.
fn extract_range_from_formula(formula: &str) -> Option<String> {
    let range_part = match formula.rfind('!') {
        Some(pos) => formula.get(pos + 1..)?,
        None => formula,
    };
    let cleaned: String = range_part.chars().filter(|&c| c != '$').collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Sheet name referenced by a defined-name formula, unquoted.
fn formula_sheet_name(formula: &str) -> Option<&str> {
    let pos = formula.rfind('!')?;
    let name = formula.get(..pos)?;
    Some(name.trim_matches('\''))
}
