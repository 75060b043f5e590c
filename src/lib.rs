//! xlsign - signature stamping for XLSX ledgers
//!
//! Takes a payroll/safety-equipment ledger workbook with per-person "sign
//! here" markers and a pool of scanned signature images keyed by person
//! name, and produces a workbook where each marker is replaced by a
//! signature image with a randomized rotation, scale, and offset, so
//! repeated runs look hand-signed rather than stamped:
//! - Heuristic name-column location and closed-vocabulary marker detection
//! - Per-row anti-repetition of signature variants
//! - Rotated bitmaps cached by (variant, whole-degree rotation) to bound
//!   output size
//! - Merged-cell and print-area metadata snapshotted and restored around
//!   image insertion
//!
//! # Usage (JavaScript)
//!
//! ```javascript
//! import init, { sign_ledger } from 'xlsign';
//! await init();
//! const { document, report } = sign_ledger(ledgerBytes, signatureFiles, seed);
//! ```

pub mod assign;
pub mod cell_ref;
pub mod error;
pub mod header;
pub mod marker;
pub mod normalize;
pub mod options;
pub mod parser;
pub mod placement;
pub mod pool;
pub mod raster;
pub mod reconstruct;
pub mod types;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

pub use error::{Result, XlsignError};
pub use options::EngineOptions;
pub use reconstruct::{reconstruct, ProgressFn};
pub use types::*;

/// Run the whole pipeline: parse, locate, assign, reconstruct.
///
/// The RNG is explicit so a seeded source makes the run reproducible;
/// calling again with a fresh source is the "reshuffle" operation. A ledger
/// without a recognizable name column round-trips with zero assignments and
/// `name_column_missing` set in the report.
///
/// # Errors
/// Fatal conditions only: unusable input bytes (`MalformedDocument`,
/// `EmptyDocument`) or an unusable output buffer (`ReconstructionFailed`).
pub fn sign<R: Rng>(
    document: &[u8],
    pool: &SignaturePool,
    options: &EngineOptions,
    rng: &mut R,
    progress: Option<ProgressFn<'_>>,
) -> Result<(Vec<u8>, RunReport)> {
    let model = parser::parse(document, options)?;
    let hit = header::locate_name_column(&model, options);

    let assignments = match hit {
        Some(h) => assign::assign(&model, pool, h, rng, options),
        None => Vec::new(),
    };

    let (bytes, mut report) = reconstruct(document, &assignments, pool, options, progress)?;
    report.name_column_missing = hit.is_none();
    Ok((bytes, report))
}

/// One signature file handed over by the wasm host.
#[derive(Deserialize)]
struct SignatureFile {
    name: String,
    data: Vec<u8>,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Sign a ledger from the browser.
///
/// `signatures` is an array of `{ name, data }` objects where `name` is the
/// original filename (the base name is derived from it) and `data` the raw
/// image bytes. Returns `{ document: Uint8Array, report }`.
///
/// # Errors
/// Returns an error if the ledger bytes are unusable or reconstruction
/// produces an invalid buffer.
#[wasm_bindgen]
pub fn sign_ledger(
    document: &[u8],
    signatures: JsValue,
    seed: Option<u64>,
) -> std::result::Result<JsValue, JsValue> {
    let files: Vec<SignatureFile> = serde_wasm_bindgen::from_value(signatures)
        .map_err(|e| JsValue::from_str(&format!("invalid signature list: {e}")))?;

    let pool = pool::pool_from_memory(files.into_iter().map(|f| (f.name, f.data)).collect())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let options = EngineOptions::default();
    let (bytes, report) = sign(document, &pool, &options, &mut rng, None)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let result = js_sys::Object::new();
    js_sys::Reflect::set(
        &result,
        &JsValue::from_str("document"),
        &js_sys::Uint8Array::from(bytes.as_slice()),
    )
    .map_err(|_| JsValue::from_str("failed to build result object"))?;
    let report_js = serde_wasm_bindgen::to_value(&report)
        .map_err(|e| JsValue::from_str(&format!("report serialization error: {e}")))?;
    js_sys::Reflect::set(&result, &JsValue::from_str("report"), &report_js)
        .map_err(|_| JsValue::from_str("failed to build result object"))?;

    Ok(result.into())
}

/// Get the library version
#[must_use]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
