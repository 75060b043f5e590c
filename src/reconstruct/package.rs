//! Ordered part map over the workbook container.
//!
//! One `Package` is loaded per reconstruction run and owned exclusively by
//! it. Parts keep their original order on save so untouched entries
//! round-trip in place; mutated and appended parts are recompressed.

use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{Result, XlsignError};

pub(crate) struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

impl Package {
    /// Read every entry of the container into memory, preserving order.
    pub fn load(data: &[u8]) -> Result<Self> {
        let cursor = Cursor::new(data);
        let mut archive = ZipArchive::new(cursor).map_err(|e| {
            XlsignError::MalformedDocument(format!("not a workbook container: {e}"))
        })?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry.read_to_end(&mut bytes)?;
            parts.push((name, bytes));
        }

        Ok(Self { parts })
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.parts.iter().any(|(name, _)| name == path)
    }

    /// Replace an existing part or append a new one at the end.
    pub fn set(&mut self, path: &str, bytes: Vec<u8>) {
        if let Some(slot) = self.parts.iter_mut().find(|(name, _)| name == path) {
            slot.1 = bytes;
        } else {
            self.parts.push((path.to_string(), bytes));
        }
    }

    /// Serialize back to container bytes.
    pub fn save(&self) -> Result<Vec<u8>> {
        let buf: Vec<u8> = Vec::new();
        let mut writer = ZipWriter::new(Cursor::new(buf));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            writer.start_file(name, options)?;
            writer.write_all(bytes)?;
        }

        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }
}
