//! Document model builder.
//!
//! Orchestrates parsing of the workbook container: relationships, sheet
//! list, defined names, shared strings, then the worksheet itself. Pure
//! function of the input bytes plus the engine options.

mod relationships;
mod workbook;
mod worksheet;

use std::io::Cursor;
use zip::ZipArchive;

use crate::error::{Result, XlsignError};
use crate::options::EngineOptions;
use crate::types::DocumentModel;

use relationships::parse_workbook_relationships;
pub(crate) use relationships::parse_shared_strings;
use workbook::parse_workbook_xml;
use worksheet::parse_sheet;

/// Parse workbook bytes into the canonical model.
///
/// The first worksheet listed in `xl/workbook.xml` is used; this engine does
/// not process multi-sheet documents beyond passing the other parts through.
///
/// # Errors
/// `MalformedDocument` when the bytes are empty, not a ZIP container, or
/// declare no worksheet; `EmptyDocument` when no data rows remain after
/// trailing-empty-row trimming.
pub fn parse(data: &[u8], options: &EngineOptions) -> Result<DocumentModel> {
    if data.is_empty() {
        return Err(XlsignError::MalformedDocument("empty input".to_string()));
    }

    let cursor = Cursor::new(data);
    let mut archive = ZipArchive::new(cursor)
        .map_err(|e| XlsignError::MalformedDocument(format!("not a workbook container: {e}")))?;

    let relationships = parse_workbook_relationships(&mut archive);
    let meta = parse_workbook_xml(&mut archive, &relationships.worksheets)?;
    let Some(sheet_info) = meta.sheets.first() else {
        return Err(XlsignError::MalformedDocument(
            "workbook declares no worksheet".to_string(),
        ));
    };

    let shared_strings = parse_shared_strings(&mut archive, relationships.shared_strings.as_deref());

    let (mut rows, merged_ranges) =
        parse_sheet(&mut archive, &sheet_info.path, &shared_strings, options)?;

    // Trailing fully-empty rows are formatting residue, not data.
    while rows.last().is_some_and(crate::types::Row::is_empty) {
        rows.pop();
    }
    if rows.is_empty() {
        return Err(XlsignError::EmptyDocument);
    }

    let (print_area, print_area_formula) = meta.print_area_for_first_sheet(&sheet_info.name);

    Ok(DocumentModel {
        sheet_name: sheet_info.name.clone(),
        sheet_path: sheet_info.path.clone(),
        rows,
        merged_ranges,
        print_area,
        print_area_formula,
    })
}
