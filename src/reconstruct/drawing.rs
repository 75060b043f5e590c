//! Drawing part generation: anchored signature pictures, relationship
//! files, and content-type registration.
//!
//! Every placed signature becomes a `oneCellAnchor` picture — anchored to
//! its cell's top-left corner plus sub-cell offsets, moving with the cell
//! but never resizing with it. Offsets and extents use the drawing format's
//! native EMU unit.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::worksheet_patch::xml_escape;
use crate::error::{Result, XlsignError};

/// EMUs per screen pixel at 96 DPI.
const EMU_PER_PX: i64 = 9_525;

pub(super) const REL_TYPE_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
pub(super) const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// One picture to anchor into the drawing part.
#[derive(Debug)]
pub(super) struct AnchorSpec {
    /// 0-based anchor cell, the drawing format's convention.
    pub col: u32,
    pub row: u32,
    pub col_off_emu: i64,
    pub row_off_emu: i64,
    pub ext_cx_emu: i64,
    pub ext_cy_emu: i64,
    /// Relationship id of the image inside the drawing rels.
    pub rel_id: String,
    /// Shape id, unique within the drawing part.
    pub shape_id: u32,
}

pub(super) fn px_to_emu(px: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let emu = (px * 9_525.0_f64).round() as i64;
    emu.max(0)
}

pub(super) fn px_offset_to_emu(px: i32) -> i64 {
    i64::from(px).saturating_mul(EMU_PER_PX).max(0)
}

/// "xl/worksheets/sheet1.xml" -> "xl/worksheets/_rels/sheet1.xml.rels"
pub(super) fn rels_path_for(part_path: &str) -> String {
    if let Some(pos) = part_path.rfind('/') {
        let dir = part_path.get(..pos).unwrap_or("");
        let filename = part_path.get(pos + 1..).unwrap_or(part_path);
        format!("{dir}/_rels/{filename}.rels")
    } else {
        format!("_rels/{part_path}.rels")
    }
}

/// Resolve a relative target like "../drawings/drawing1.xml" against the
/// directory of the part that references it.
pub(super) fn resolve_relative_path(base_dir: &str, relative: &str) -> String {
    if let Some(stripped) = relative.strip_prefix('/') {
        return stripped.to_string();
    }

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in relative.split('/') {
        match part {
            ".." => {
                components.pop();
            }
            "." | "" => {}
            _ => components.push(part),
        }
    }
    components.join("/")
}

/// A relationship entry from a `.rels` part.
#[derive(Debug)]
pub(super) struct RelEntry {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// Parse a relationships part. Unreadable parts yield an empty list.
pub(super) fn parse_rels(xml: &[u8]) -> Vec<RelEntry> {
    let Ok(text) = std::str::from_utf8(xml) else {
        return Vec::new();
    };
    let mut reader = Reader::from_str(text);
    let mut entries = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e) | Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut entry = RelEntry {
                        id: String::new(),
                        rel_type: String::new(),
                        target: String::new(),
                    };
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Id" => entry.id = String::from_utf8_lossy(&attr.value).into_owned(),
                            b"Type" => {
                                entry.rel_type = String::from_utf8_lossy(&attr.value).into_owned();
                            }
                            b"Target" => {
                                entry.target = String::from_utf8_lossy(&attr.value).into_owned();
                            }
                            _ => {}
                        }
                    }
                    if !entry.id.is_empty() {
                        entries.push(entry);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    entries
}

/// Next free "rIdN" number across existing entries.
pub(super) fn next_rid(entries: &[RelEntry]) -> u32 {
    entries
        .iter()
        .filter_map(|e| e.id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// Append relationships to an existing part, or create the part fresh.
pub(super) fn append_relationships(
    existing: Option<&[u8]>,
    new_entries: &[(String, &str, String)],
) -> Result<Vec<u8>> {
    let mut text = match existing {
        Some(bytes) => std::str::from_utf8(bytes)
            .map_err(|_| {
                XlsignError::MalformedDocument("relationships part is not UTF-8".to_string())
            })?
            .to_string(),
        None => concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            "</Relationships>"
        )
        .to_string(),
    };

    let Some(insert_at) = text.rfind("</Relationships>") else {
        return Err(XlsignError::ReconstructionFailed(
            "relationships part has no closing element".to_string(),
        ));
    };

    let mut additions = String::new();
    for (id, rel_type, target) in new_entries {
        additions.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            xml_escape(id),
            rel_type,
            xml_escape(target)
        ));
    }
    text.insert_str(insert_at, &additions);
    Ok(text.into_bytes())
}

/// Build a complete drawing part from anchor specs.
pub(super) fn drawing_document(anchors: &[AnchorSpec]) -> Vec<u8> {
    let mut out = String::with_capacity(512 + anchors.len() * 700);
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push_str(
        r#"<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" "#,
    );
    out.push_str(r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#);
    out.push_str(
        r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    );
    for anchor in anchors {
        out.push_str(&anchor_xml(anchor));
    }
    out.push_str("</xdr:wsDr>");
    out.into_bytes()
}

/// Insert anchors into an existing drawing part, just before its closing
/// root tag. The root prefix is not assumed; the last close tag in the part
/// is the root by well-formedness.
pub(super) fn append_anchors_to_drawing(
    existing: &[u8],
    anchors: &[AnchorSpec],
) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(existing)
        .map_err(|_| XlsignError::MalformedDocument("drawing part is not UTF-8".to_string()))?;
    let Some(insert_at) = text.rfind("</") else {
        return Err(XlsignError::ReconstructionFailed(
            "drawing part has no closing element".to_string(),
        ));
    };

    let mut out = String::with_capacity(text.len() + anchors.len() * 700);
    out.push_str(text.get(..insert_at).unwrap_or(""));
    for anchor in anchors {
        out.push_str(&anchor_xml(anchor));
    }
    out.push_str(text.get(insert_at..).unwrap_or(""));
    Ok(out.into_bytes())
}

/// One `oneCellAnchor` picture: moves with its cell, does not resize.
fn anchor_xml(a: &AnchorSpec) -> String {
    format!(
        concat!(
            "<xdr:oneCellAnchor>",
            "<xdr:from>",
            "<xdr:col>{col}</xdr:col><xdr:colOff>{col_off}</xdr:colOff>",
            "<xdr:row>{row}</xdr:row><xdr:rowOff>{row_off}</xdr:rowOff>",
            "</xdr:from>",
            "<xdr:ext cx=\"{cx}\" cy=\"{cy}\"/>",
            "<xdr:pic>",
            "<xdr:nvPicPr>",
            "<xdr:cNvPr id=\"{id}\" name=\"Signature {id}\"/>",
            "<xdr:cNvPicPr><a:picLocks noChangeAspect=\"1\"/></xdr:cNvPicPr>",
            "</xdr:nvPicPr>",
            "<xdr:blipFill>",
            "<a:blip r:embed=\"{rel}\"/>",
            "<a:stretch><a:fillRect/></a:stretch>",
            "</xdr:blipFill>",
            "<xdr:spPr>",
            "<a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>",
            "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom>",
            "</xdr:spPr>",
            "</xdr:pic>",
            "<xdr:clientData/>",
            "</xdr:oneCellAnchor>"
        ),
        col = a.col,
        col_off = a.col_off_emu,
        row = a.row,
        row_off = a.row_off_emu,
        cx = a.ext_cx_emu,
        cy = a.ext_cy_emu,
        id = a.shape_id,
        rel = xml_escape(&a.rel_id),
    )
}

/// Make sure `[Content_Types].xml` declares PNG media and the drawing part.
pub(super) fn ensure_content_types(
    xml: &[u8],
    new_drawing_part: Option<&str>,
) -> Result<Vec<u8>> {
    let mut text = std::str::from_utf8(xml)
        .map_err(|_| XlsignError::MalformedDocument("content types part is not UTF-8".to_string()))?
        .to_string();

    let Some(insert_at) = text.rfind("</Types>") else {
        return Err(XlsignError::ReconstructionFailed(
            "content types part has no closing element".to_string(),
        ));
    };

    let mut additions = String::new();
    if !text.contains(r#"Extension="png""#) {
        additions.push_str(r#"<Default Extension="png" ContentType="image/png"/>"#);
    }
    if let Some(part) = new_drawing_part {
        let part_name = format!("/{part}");
        if !text.contains(&part_name) {
            additions.push_str(&format!(
                r#"<Override PartName="{}" ContentType="application/vnd.openxmlformats-officedocument.drawing+xml"/>"#,
                xml_escape(&part_name)
            ));
        }
    }
    text.insert_str(insert_at, &additions);
    Ok(text.into_bytes())
}
