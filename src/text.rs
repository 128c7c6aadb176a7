//! Text normalization applied to every body before it reaches the store.
//!
//! Remote bodies arrive with mixed line endings and the occasional control
//! character. Normalizing them on the way in keeps content comparisons
//! (comment edit detection, description change detection) stable across runs.

/// Normalize a multi-line body.
///
/// - CRLF and lone CR become LF
/// - control characters other than `\n` and `\t` are dropped
/// - surrounding whitespace is trimmed
#[must_use]
pub fn cleanup(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let filtered: String = normalized
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    filtered.trim().to_string()
}

/// Normalize a single-line value such as a title.
///
/// Same as [`cleanup`], with inner newlines and tabs collapsed to a single space.
#[must_use]
pub fn cleanup_one_line(text: &str) -> String {
    cleanup(text)
        .split(['\n', '\t'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
