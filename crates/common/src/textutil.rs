//! Small text cleanups applied to extracted content.

/// Collapse every whitespace run into a single space and trim the ends.
pub fn squeeze_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop control characters, keeping tabs and line endings.
pub fn delete_controls(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Collapse runs of three or more newlines into a paragraph break. Extracted
/// documents (spreadsheets especially) tend to carry long runs of empty rows.
pub fn reduce_line_breaks(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut newlines = 0usize;
    for ch in s.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}
