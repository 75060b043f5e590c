//! Name normalization shared by pool indexing and row matching.
//!
//! Both sides of the lookup go through [`normalize_name`], so formatting
//! noise (titles, spacing, trailing tags) in either the sheet or the
//! filenames cannot break matching.

/// Annotation bracket pairs stripped before filtering: ASCII and the
/// full-width forms common in CJK ledgers.
const BRACKET_PAIRS: [(char, char); 4] = [('(', ')'), ('（', '）'), ('[', ']'), ('【', '】')];

/// Normalize a raw person name: drop bracketed annotations, keep only
/// letters and digits (any script), lowercase. Returns "" for "no name".
pub fn normalize_name(raw: &str) -> String {
    strip_annotations(raw)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Derive the pool key for a signature file: strip the extension, strip one
/// trailing `_<suffix>` (the variant tag), then normalize.
pub fn base_name_from_filename(filename: &str) -> String {
    let stem = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    let stem = stem.rsplit_once('.').map_or(stem, |(s, _ext)| s);
    let stem = stem.rsplit_once('_').map_or(stem, |(s, _suffix)| s);
    normalize_name(stem)
}

/// Remove bracketed spans. Unbalanced brackets drop the rest of the string,
/// which matches how annotations actually appear (always trailing).
fn strip_annotations(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        if BRACKET_PAIRS.iter().any(|&(open, _)| c == open) {
            depth += 1;
        } else if BRACKET_PAIRS.iter().any(|&(_, close)| c == close) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 {
            out.push(c);
        }
    }
    out
}
