//! Stable identifiers and filesystem-safe names for arbitrary, possibly
//! adversarial source identifiers (mail subjects, message-ids, attachment
//! names).

use std::path::Path;

use crate::textutil::squeeze_whitespace;

/// Characters never allowed in a generated filename: quotes, shell
/// metacharacters, separators, and everything else that makes a name unsafe
/// to pass around.
const FORBIDDEN: &[char] = &[
    '"', '\'', '&', ';', '.', '\u{201c}', '\u{201d}', ')', '(', '%', '$', '?', ':', '<', '>', '*',
    '#', '~', '!', '@', '\\', '/', '|', '=', '+', '[', ']', '{', '}', ',', '`',
];

const FALLBACK_NAME: &str = "item";

/// Child identity: the declared name when the container supplied one,
/// otherwise an enumeration under the parent's id.
pub fn derive_child_id(parent_id: &str, index: usize, declared_name: Option<&str>) -> String {
    match declared_name {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => format!("{parent_id}_part{index}"),
    }
}

/// Reduce arbitrary text to a safe single-component filename: whitespace runs
/// and forbidden characters become `_`, repeated `_` collapse to one, and
/// trailing `_` are stripped. Never returns an empty string, and applying it
/// twice gives the same result as applying it once.
pub fn safe_filename(text: &str) -> String {
    let squeezed = squeeze_whitespace(text);
    let mut out = String::with_capacity(squeezed.len());
    let mut prev_sep = false;
    for ch in squeezed.chars() {
        let mapped = if ch.is_whitespace() || ch.is_control() || FORBIDDEN.contains(&ch) {
            '_'
        } else {
            ch
        };
        if mapped == '_' {
            if prev_sep {
                continue;
            }
            prev_sep = true;
        } else {
            prev_sep = false;
        }
        out.push(mapped);
    }
    let out = out.trim_end_matches('_');
    if out.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        out.to_string()
    }
}

/// Safe-name an id that may carry a file extension, keeping the extension
/// usable for downstream type detection: `a b.doc` → `a_b.doc`.
pub fn safe_child_filename(id: &str) -> String {
    match id.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(char::is_alphanumeric) =>
        {
            format!("{}.{}", safe_filename(stem), ext.to_lowercase())
        }
        _ => safe_filename(id),
    }
}

/// Shorten an angle-bracket-delimited global identifier
/// (`<localpart@domain>`) to a safe local id: the bracketed value's part
/// before `@`, run through the forbidden-character substitution.
pub fn shorten_protocol_id(global_id: &str) -> String {
    let inner = extract_angle_value(global_id);
    let local = inner.split('@').next().unwrap_or(inner);
    safe_filename(local)
}

/// Pull `value` out of `<value>`; returns the input unchanged when it is not
/// bracketed. Used for message-id and content-id headers.
pub fn extract_angle_value(value: &str) -> &str {
    let v = value.trim();
    match v.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(inner) if !inner.is_empty() => inner,
        _ => v,
    }
}

/// Identity fallback for documents with no protocol-supplied id: source name
/// plus a content-hash prefix, stable across runs over the same input.
pub fn content_id(name: &str, bytes: &[u8]) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let hash = blake3::hash(bytes).to_hex();
    format!("{}_{}", safe_filename(stem), &hash.as_str()[..16])
}
