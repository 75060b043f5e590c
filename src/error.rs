//! Structured error types for xlsign.
//!
//! Only conditions that make the whole run unusable are errors; per-marker
//! misses (missing asset, failed render, rejected placement) are counted in
//! the run report instead.

/// All errors that can occur while building, assigning, or reconstructing.
#[derive(Debug, thiserror::Error)]
pub enum XlsignError {
    /// Input bytes are not a readable workbook (empty, not a ZIP, no sheet).
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The workbook parsed but contained no data rows after trimming.
    #[error("document has no data rows")]
    EmptyDocument,

    /// Final serialization produced an unusable buffer.
    #[error("reconstruction failed: {0}")]
    ReconstructionFailed(String),

    /// XML parsing error from quick-xml.
    #[error("XML parsing: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP archive error.
    #[error("ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Image decode/encode error.
    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XlsignError>;

#[cfg(target_arch = "wasm32")]
impl From<XlsignError> for wasm_bindgen::JsValue {
    fn from(e: XlsignError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}
