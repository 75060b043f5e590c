//! Placeholder marker classification.
//!
//! The vocabulary is a closed list, not a pattern: ledgers are full of
//! numeric data and a fuzzy match would flag real values as markers.

/// Marker spellings meaning "a signature goes here": the bare digit one, its
/// parenthesized and punctuated variants, and the circle/letter-o variants.
const MARKERS: [&str; 8] = ["1", "(1)", "（1）", "1.", "1、", "○", "〇", "o"];

/// Whether a cell's flattened text is a signature placeholder.
///
/// Whitespace (including full-width spaces) is removed before the membership
/// test; ASCII letters are compared case-insensitively so "O" matches "o".
pub fn is_placeholder(cell_text: &str) -> bool {
    let squashed: String = cell_text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if squashed.is_empty() {
        return false;
    }
    MARKERS.contains(&squashed.as_str())
}
