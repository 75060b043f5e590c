//! Signature pool construction from named image files.

use std::io::Cursor;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::Result;
use crate::normalize::base_name_from_filename;
use crate::types::{ImageSource, MemorySource, SignatureAsset, SignaturePool};

/// File-backed image source used by the CLI; bytes are read on demand.
pub struct FileSource {
    pub path: PathBuf,
}

impl ImageSource for FileSource {
    fn bytes(&self) -> Result<std::borrow::Cow<'_, [u8]>> {
        Ok(std::borrow::Cow::Owned(std::fs::read(&self.path)?))
    }
}

/// Register one signature file in the pool.
///
/// The base name comes from the filename with its trailing `_<suffix>` tag
/// stripped; the `variant_id` is the filename itself. Dimensions are probed
/// from the image header without a full decode. Files that do not look like
/// an image, or whose name normalizes to nothing, are skipped with a warning
/// and `Ok(false)`.
pub fn add_signature(
    pool: &mut SignaturePool,
    filename: &str,
    source: Box<dyn ImageSource>,
) -> Result<bool> {
    let base_name = base_name_from_filename(filename);
    if base_name.is_empty() {
        warn!(filename, "signature filename normalizes to empty, skipping");
        return Ok(false);
    }

    let bytes = source.bytes()?;
    let Ok((width, height)) = probe_dimensions(&bytes) else {
        warn!(filename, "unreadable image header, skipping");
        return Ok(false);
    };
    drop(bytes);

    let inserted = pool.insert(SignatureAsset {
        base_name: base_name.clone(),
        variant_id: filename.to_string(),
        source,
        width,
        height,
    });
    if inserted {
        debug!(filename, base_name = %base_name, width, height, "registered signature variant");
    } else {
        warn!(filename, "duplicate variant id, skipping");
    }
    Ok(inserted)
}

/// Build a pool from already-loaded `(filename, bytes)` pairs, the shape the
/// wasm host hands over.
pub fn pool_from_memory(files: Vec<(String, Vec<u8>)>) -> Result<SignaturePool> {
    let mut pool = SignaturePool::new();
    for (filename, data) in files {
        add_signature(&mut pool, &filename, Box::new(MemorySource(data)))?;
    }
    Ok(pool)
}

fn probe_dimensions(bytes: &[u8]) -> std::result::Result<(u32, u32), image::ImageError> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .into_dimensions()
}
