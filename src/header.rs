//! Name-column location via header text matching.

use crate::options::EngineOptions;
use crate::types::DocumentModel;

/// Header labels meaning "name". Chinese ledger spellings first, then the
/// English equivalents seen in bilingual templates.
const NAME_HEADERS: [&str; 6] = ["姓名", "名字", "员工姓名", "人员姓名", "name", "fullname"];

/// Where the name column was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderHit {
    /// 1-based row the header label sits in.
    pub row: u32,
    /// 1-based column holding the names below it.
    pub col: u32,
}

/// Scan the leading rows of the model for a name-column header.
///
/// Row-major, top to bottom then left to right; first match wins. The scan
/// is bounded by `header_scan_rows` so a pathological sheet cannot stall it.
/// `None` means "zero assignments possible", never an error.
pub fn locate_name_column(model: &DocumentModel, options: &EngineOptions) -> Option<HeaderHit> {
    for row in &model.rows {
        if row.index > options.header_scan_rows {
            break;
        }
        for cell in &row.cells {
            let squashed: String = cell
                .value
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if !squashed.is_empty() && NAME_HEADERS.contains(&squashed.as_str()) {
                return Some(HeaderHit {
                    row: cell.row,
                    col: cell.col,
                });
            }
        }
    }
    None
}
