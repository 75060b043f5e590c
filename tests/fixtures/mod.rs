//! Test fixtures for generating valid ledger XLSX files in memory.
//!
//! Provides a builder for the workbook shapes the engine cares about:
//! header rows, name cells, placeholder markers, merged ranges, and a
//! print-area defined name. The output is a real ZIP container parsed by
//! the same code paths as production input.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

/// A cell value in the fixture sheet.
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Shared-string text.
    Text(String),
    /// Shared-string entry written as rich runs (`<si><r><t>..`).
    RichText(Vec<String>),
    /// Numeric `<v>`.
    Number(f64),
    /// Inline string (`t="inlineStr"`).
    Inline(String),
    /// Formula with its cached result.
    Formula { expr: String, cached: String },
    /// Boolean cell.
    Bool(bool),
    /// Style-only cell with no value.
    Empty,
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

#[derive(Debug, Clone)]
struct CellEntry {
    cell_ref: String,
    value: CellValue,
}

/// Builder for a single-sheet ledger workbook.
#[derive(Debug, Default)]
pub struct LedgerBuilder {
    sheet_name: String,
    cells: Vec<CellEntry>,
    merges: Vec<String>,
    print_area: Option<String>,
    raw_rows: Vec<String>,
}

impl LedgerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sheet_name(mut self, name: &str) -> Self {
        self.sheet_name = name.to_string();
        self
    }

    /// Add a cell by "A1"-style reference.
    #[must_use]
    pub fn cell<V: Into<CellValue>>(mut self, cell_ref: &str, value: V) -> Self {
        self.cells.push(CellEntry {
            cell_ref: cell_ref.to_string(),
            value: value.into(),
        });
        self
    }

    /// Add a merge range like "A1:B2".
    #[must_use]
    pub fn merge(mut self, range: &str) -> Self {
        self.merges.push(range.to_string());
        self
    }

    /// Declare a print area, e.g. "A1:J20". Becomes the
    /// `_xlnm.Print_Area` defined name scoped to the sheet.
    #[must_use]
    pub fn print_area(mut self, range: &str) -> Self {
        self.print_area = Some(range.to_string());
        self
    }

    /// Append raw `<row>` XML verbatim, for shapes the typed API does not
    /// cover (e.g. thousands of styled empty rows).
    #[must_use]
    pub fn raw_row(mut self, xml: &str) -> Self {
        self.raw_rows.push(xml.to_string());
        self
    }

    /// A standard ledger header: name column at B of the given row.
    #[must_use]
    pub fn header_row(self, row: u32) -> Self {
        self.cell(&format!("A{row}"), "序号")
            .cell(&format!("B{row}"), "姓名")
            .cell(&format!("C{row}"), "部门")
    }

    /// Build the XLSX file as bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut shared: Vec<SharedEntry> = Vec::new();
        for cell in &self.cells {
            match &cell.value {
                CellValue::Text(s) => {
                    let entry = SharedEntry::Plain(s.clone());
                    if !shared.contains(&entry) {
                        shared.push(entry);
                    }
                }
                CellValue::RichText(parts) => {
                    let entry = SharedEntry::Rich(parts.clone());
                    if !shared.contains(&entry) {
                        shared.push(entry);
                    }
                }
                _ => {}
            }
        }

        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let _ = zip.start_file("[Content_Types].xml", options);
        let _ = zip.write_all(content_types(!shared.is_empty()).as_bytes());

        let _ = zip.start_file("_rels/.rels", options);
        let _ = zip.write_all(ROOT_RELS.as_bytes());

        let _ = zip.start_file("xl/_rels/workbook.xml.rels", options);
        let _ = zip.write_all(workbook_rels(!shared.is_empty()).as_bytes());

        let _ = zip.start_file("xl/workbook.xml", options);
        let _ = zip.write_all(self.workbook_xml().as_bytes());

        let _ = zip.start_file("xl/styles.xml", options);
        let _ = zip.write_all(STYLES_XML.as_bytes());

        if !shared.is_empty() {
            let _ = zip.start_file("xl/sharedStrings.xml", options);
            let _ = zip.write_all(shared_strings_xml(&shared).as_bytes());
        }

        let _ = zip.start_file("xl/worksheets/sheet1.xml", options);
        let _ = zip.write_all(self.sheet_xml(&shared).as_bytes());

        let cursor = zip.finish().expect("failed to finish fixture ZIP");
        cursor.into_inner()
    }

    fn workbook_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#);
        xml.push_str(&format!(
            r#"<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets>"#,
            escape_xml(&self.sheet_name)
        ));
        if let Some(ref area) = self.print_area {
            xml.push_str(&format!(
                r#"<definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">{}</definedName></definedNames>"#,
                escape_xml(&print_area_formula(&self.sheet_name, area))
            ));
        }
        xml.push_str("</workbook>");
        xml
    }

    fn sheet_xml(&self, shared: &[SharedEntry]) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        xml.push_str("<sheetData>");

        // Group cells by row, preserving declaration order within a row.
        let mut rows: std::collections::BTreeMap<u32, Vec<&CellEntry>> =
            std::collections::BTreeMap::new();
        for cell in &self.cells {
            let (row, _) = split_ref(&cell.cell_ref);
            rows.entry(row).or_default().push(cell);
        }

        for (row_num, cells) in rows {
            xml.push_str(&format!("<row r=\"{row_num}\">"));
            for cell in cells {
                xml.push_str(&cell_xml(cell, shared));
            }
            xml.push_str("</row>");
        }
        for raw in &self.raw_rows {
            xml.push_str(raw);
        }
        xml.push_str("</sheetData>");

        if !self.merges.is_empty() {
            xml.push_str(&format!("<mergeCells count=\"{}\">", self.merges.len()));
            for merge in &self.merges {
                xml.push_str(&format!("<mergeCell ref=\"{merge}\"/>"));
            }
            xml.push_str("</mergeCells>");
        }

        xml.push_str("</worksheet>");
        xml
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SharedEntry {
    Plain(String),
    Rich(Vec<String>),
}

fn cell_xml(cell: &CellEntry, shared: &[SharedEntry]) -> String {
    let r = &cell.cell_ref;
    match &cell.value {
        CellValue::Text(s) => {
            let idx = shared
                .iter()
                .position(|e| matches!(e, SharedEntry::Plain(p) if p == s))
                .unwrap_or(0);
            format!(r#"<c r="{r}" t="s"><v>{idx}</v></c>"#)
        }
        CellValue::RichText(parts) => {
            let idx = shared
                .iter()
                .position(|e| matches!(e, SharedEntry::Rich(p) if p == parts))
                .unwrap_or(0);
            format!(r#"<c r="{r}" t="s"><v>{idx}</v></c>"#)
        }
        CellValue::Number(n) => format!(r#"<c r="{r}"><v>{n}</v></c>"#),
        CellValue::Inline(s) => format!(
            r#"<c r="{r}" t="inlineStr"><is><t>{}</t></is></c>"#,
            escape_xml(s)
        ),
        CellValue::Formula { expr, cached } => format!(
            r#"<c r="{r}"><f>{}</f><v>{}</v></c>"#,
            escape_xml(expr),
            escape_xml(cached)
        ),
        CellValue::Bool(b) => format!(r#"<c r="{r}" t="b"><v>{}</v></c>"#, i32::from(*b)),
        CellValue::Empty => format!(r#"<c r="{r}"/>"#),
    }
}

fn shared_strings_xml(entries: &[SharedEntry]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(&format!(
        r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
        entries.len(),
        entries.len()
    ));
    for entry in entries {
        match entry {
            SharedEntry::Plain(s) => {
                xml.push_str(&format!(
                    r#"<si><t xml:space="preserve">{}</t></si>"#,
                    escape_xml(s)
                ));
            }
            SharedEntry::Rich(parts) => {
                xml.push_str("<si>");
                for part in parts {
                    xml.push_str(&format!("<r><t>{}</t></r>", escape_xml(part)));
                }
                xml.push_str("</si>");
            }
        }
    }
    xml.push_str("</sst>");
    xml
}

fn content_types(with_shared: bool) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
    if with_shared {
        xml.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    }
    xml.push_str(r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#);
    xml.push_str("</Types>");
    xml
}

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    "</Relationships>"
);

fn workbook_rels(with_shared: bool) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    xml.push_str(r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#);
    xml.push_str(r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#);
    if with_shared {
        xml.push_str(r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#);
    }
    xml.push_str("</Relationships>");
    xml
}

const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0" applyAlignment="1"><alignment horizontal="center"/></xf></cellXfs>"#,
    r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    "</styleSheet>"
);

fn print_area_formula(sheet_name: &str, range: &str) -> String {
    let range_abs: String = range
        .split(':')
        .map(|part| {
            let (col, row): (String, String) = part.chars().partition(char::is_ascii_alphabetic);
            format!("${col}${row}")
        })
        .collect::<Vec<_>>()
        .join(":");
    if sheet_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        format!("{sheet_name}!{range_abs}")
    } else {
        format!("'{sheet_name}'!{range_abs}")
    }
}

/// Parse "B12" into (12, 2).
fn split_ref(cell_ref: &str) -> (u32, u32) {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    for c in cell_ref.chars() {
        if c.is_ascii_alphabetic() {
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        } else if c.is_ascii_digit() {
            row = row * 10 + (c as u32 - '0' as u32);
        }
    }
    (row, col)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
