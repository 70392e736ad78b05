//! OCR text clean-up.

/// Collapse OCR whitespace noise into a single readable line.
///
/// Newlines and tabs become spaces, runs of whitespace shrink to one space,
/// and the ends are trimmed.
pub fn normalize(text: &str) -> String {
    let flattened = text.replace(['\n', '\r', '\t'], " ");
    flattened.split_whitespace().collect::<Vec<_>>().join(" ")
}
