//! Signature assets and the per-person variant pool.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Lazy byte provider for a signature image.
///
/// Assets are referenced, not eagerly loaded: a ledger can carry hundreds of
/// signature files and only a handful get rendered per run.
pub trait ImageSource {
    fn bytes(&self) -> Result<Cow<'_, [u8]>>;
}

/// In-memory image source, used by tests and the wasm entry point where the
/// host has already read the file.
pub struct MemorySource(pub Vec<u8>);

impl ImageSource for MemorySource {
    fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(&self.0))
    }
}

/// One signature image variant belonging to a person.
pub struct SignatureAsset {
    /// Normalized person key this variant belongs to.
    pub base_name: String,
    /// Unique id within the pool entry, the source filename in practice.
    pub variant_id: String,
    pub source: Box<dyn ImageSource>,
    /// Pixel dimensions probed from the image header.
    pub width: u32,
    pub height: u32,
}

impl fmt::Debug for SignatureAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureAsset")
            .field("base_name", &self.base_name)
            .field("variant_id", &self.variant_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Mapping from normalized base name to that person's signature variants.
///
/// Every list is non-empty and holds no duplicate `variant_id`.
#[derive(Debug, Default)]
pub struct SignaturePool {
    entries: HashMap<String, Vec<SignatureAsset>>,
}

impl SignaturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variant under its normalized base name. A duplicate
    /// `variant_id` for the same person is ignored and reported as `false`.
    pub fn insert(&mut self, asset: SignatureAsset) -> bool {
        let variants = self.entries.entry(asset.base_name.clone()).or_default();
        if variants.iter().any(|v| v.variant_id == asset.variant_id) {
            return false;
        }
        variants.push(asset);
        true
    }

    /// Variants for a normalized name, in insertion order.
    pub fn variants(&self, base_name: &str) -> Option<&[SignatureAsset]> {
        self.entries.get(base_name).map(Vec::as_slice)
    }

    /// Find one asset by person and variant id.
    pub fn asset(&self, base_name: &str, variant_id: &str) -> Option<&SignatureAsset> {
        self.entries
            .get(base_name)?
            .iter()
            .find(|v| v.variant_id == variant_id)
    }

    /// Number of people with at least one variant.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
