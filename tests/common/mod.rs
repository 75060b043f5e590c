//! Shared helpers for integration tests: pool construction, pipeline
//! invocation, and inspection of the reconstructed container.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::io::{Cursor, Read};

use rand::rngs::StdRng;
use rand::SeedableRng;
use zip::ZipArchive;

use xlsign::pool::add_signature;
use xlsign::types::{DocumentModel, MemorySource, RunReport, SignaturePool};
use xlsign::EngineOptions;

/// A small opaque PNG usable as a signature image.
pub fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 10, 120, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Build a pool with `n` variants per person, filenames `<name>_<i>.png`.
pub fn pool_of(entries: &[(&str, usize)]) -> SignaturePool {
    let mut pool = SignaturePool::new();
    for (name, count) in entries {
        for i in 1..=*count {
            let filename = format!("{name}_{i}.png");
            add_signature(
                &mut pool,
                &filename,
                Box::new(MemorySource(tiny_png(120, 48))),
            )
            .unwrap();
        }
    }
    pool
}

/// Run the full pipeline with a seeded RNG and default options.
pub fn run(xlsx: &[u8], pool: &SignaturePool, seed: u64) -> (Vec<u8>, RunReport) {
    run_with(xlsx, pool, seed, &EngineOptions::default())
}

/// Run the full pipeline with explicit options.
pub fn run_with(
    xlsx: &[u8],
    pool: &SignaturePool,
    seed: u64,
    options: &EngineOptions,
) -> (Vec<u8>, RunReport) {
    let mut rng = StdRng::seed_from_u64(seed);
    xlsign::sign(xlsx, pool, options, &mut rng, None).expect("pipeline run failed")
}

/// Parse the output back through the production parser.
pub fn reparse(output: &[u8]) -> DocumentModel {
    xlsign::parser::parse(output, &EngineOptions::default()).expect("output failed to re-parse")
}

/// Read one part of the container as text.
pub fn read_part(container: &[u8], path: &str) -> Option<String> {
    let mut archive = ZipArchive::new(Cursor::new(container)).unwrap();
    let mut file = archive.by_name(path).ok()?;
    let mut out = String::new();
    file.read_to_string(&mut out).ok()?;
    Some(out)
}

/// All part names in the container.
pub fn part_names(container: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(container)).unwrap();
    archive.file_names().map(ToString::to_string).collect()
}

/// Names of placed signature media parts.
pub fn media_parts(container: &[u8]) -> Vec<String> {
    let mut parts: Vec<String> = part_names(container)
        .into_iter()
        .filter(|n| n.starts_with("xl/media/signature"))
        .collect();
    parts.sort();
    parts
}

/// Count of anchored pictures in the sheet's drawing part.
pub fn anchor_count(container: &[u8]) -> usize {
    read_part(container, "xl/drawings/drawing1.xml")
        .map(|xml| xml.matches("<xdr:oneCellAnchor>").count())
        .unwrap_or(0)
}

/// The 0-based (row, col) anchor positions declared in the drawing part.
pub fn anchor_positions(container: &[u8]) -> Vec<(u32, u32)> {
    let Some(xml) = read_part(container, "xl/drawings/drawing1.xml") else {
        return Vec::new();
    };
    let mut positions = Vec::new();
    for anchor in xml.split("<xdr:oneCellAnchor>").skip(1) {
        let col = between(anchor, "<xdr:col>", "</xdr:col>").and_then(|s| s.parse().ok());
        let row = between(anchor, "<xdr:row>", "</xdr:row>").and_then(|s| s.parse().ok());
        if let (Some(row), Some(col)) = (row, col) {
            positions.push((row, col));
        }
    }
    positions
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}
