//! CLI tool for xlsign - stamps signature images into an XLSX ledger
//!
//! Usage:
//!   xlsign_cli <ledger.xlsx> <signature-dir> [-o out.xlsx] [--seed N] [--report]
//!
//! Signature files are picked up from the directory; the person key is the
//! filename with its trailing `_<suffix>` tag stripped (e.g. `张三_1.png`
//! and `张三_2.png` are two variants for 张三).

#![allow(clippy::exit)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]

use std::env;
use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;

use xlsign::pool::{add_signature, FileSource};
use xlsign::types::SignaturePool;
use xlsign::EngineOptions;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: xlsign_cli <ledger.xlsx> <signature-dir> [-o out.xlsx] [--seed N] [--report]");
        std::process::exit(1);
    }

    let input_path = &args[1];
    let sig_dir = &args[2];
    let mut output_path: Option<String> = None;
    let mut seed: Option<u64> = None;
    let mut print_report = false;

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "-o" if i + 1 < args.len() => {
                output_path = Some(args[i + 1].clone());
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                seed = args[i + 1].parse().ok();
                i += 2;
            }
            "--report" => {
                print_report = true;
                i += 1;
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
    }

    let data = match fs::read(input_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading {input_path}: {e}");
            std::process::exit(1);
        }
    };

    let pool = match load_pool(sig_dir) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error loading signatures from {sig_dir}: {e}");
            std::process::exit(1);
        }
    };
    if pool.is_empty() {
        eprintln!("Warning: no usable signature images in {sig_dir}");
    }

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let options = EngineOptions::default();
    let (bytes, report) = match xlsign::sign(&data, &pool, &options, &mut rng, None) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error signing ledger: {e}");
            std::process::exit(1);
        }
    };

    let out = output_path.unwrap_or_else(|| {
        let stem = input_path.strip_suffix(".xlsx").unwrap_or(input_path);
        format!("{stem}_signed.xlsx")
    });
    if let Err(e) = fs::write(&out, &bytes) {
        eprintln!("Error writing {out}: {e}");
        std::process::exit(1);
    }
    eprintln!(
        "Written: {out} ({} of {} assignments placed)",
        report.placed, report.assigned
    );
    if report.has_merge_discrepancy() {
        eprintln!(
            "Warning: {} of {} merge ranges could not be restored",
            report.merges_failed, report.merges_original
        );
    }

    if print_report {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => eprintln!("Error serializing report: {e}"),
        }
    }
}

/// Register every readable image file in the directory.
fn load_pool(dir: &str) -> std::io::Result<SignaturePool> {
    let mut pool = SignaturePool::new();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let source = FileSource { path: path.clone() };
        if let Err(e) = add_signature(&mut pool, filename, Box::new(source)) {
            eprintln!("Skipping {filename}: {e}");
        }
    }
    Ok(pool)
}
