//! Transaction description normalization

/// Normalize a free-text transaction description.
///
/// Missing input yields the empty string; otherwise the text is lowercased
/// and every character that is neither alphanumeric nor whitespace is
/// dropped, preserving order and spacing. Total and idempotent.
pub fn normalize(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };

    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}
