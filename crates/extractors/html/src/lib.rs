use std::path::Path;

use scraper::{ElementRef, Html, Selector};
use unfurl_common::config::ConvertConfig;
use unfurl_common::error::ExtractError;
use unfurl_common::model::Extraction;

/// Accept .html, .htm, .xhtml files.
pub fn accepts(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str(),
        "html" | "htm" | "xhtml"
    )
}

const EXCLUDED_TAGS: &[&str] = &["nav", "header", "footer", "script", "style"];

/// Scrub markup from an HTML document.
///
/// Metadata captured when present: `title` from `<title>`, `author` from
/// `<meta name="author">`, `description` from `<meta name="description">`.
/// The text is the visible content of block-level elements (h1–h6, p, li,
/// td, th, pre, blockquote, figcaption), one line per element, skipping
/// anything inside nav/header/footer/script/style.
pub fn extract_bytes(bytes: &[u8], cfg: &ConvertConfig) -> Result<Extraction, ExtractError> {
    let src = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&src);

    let mut ex = Extraction {
        encoding: Some("utf-8".to_string()),
        ..Default::default()
    };

    let title_sel = Selector::parse("title").unwrap();
    if let Some(el) = document.select(&title_sel).next() {
        let text = collapse(&el.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            ex.properties
                .insert("title".into(), serde_json::Value::String(text));
        }
    }

    for (meta_name, key) in [("author", "author"), ("description", "description")] {
        let sel = Selector::parse(&format!("meta[name='{meta_name}']")).unwrap();
        if let Some(content) = document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            let text = content.trim();
            if !text.is_empty() {
                ex.properties
                    .insert(key.into(), serde_json::Value::String(text.to_string()));
            }
        }
    }

    let content_sel =
        Selector::parse("h1, h2, h3, h4, h5, h6, p, li, td, th, pre, blockquote, figcaption")
            .unwrap();

    let mut lines: Vec<String> = Vec::new();
    let mut total = 0usize;
    for el in document.select(&content_sel) {
        if in_excluded_container(el) {
            continue;
        }
        let text = collapse(&el.text().collect::<Vec<_>>().join(" "));
        if text.is_empty() {
            continue;
        }
        total += text.len() + 1;
        if total > cfg.max_text_bytes {
            return Err(ExtractError::Truncated {
                limit: cfg.max_text_bytes,
            });
        }
        lines.push(text);
    }

    ex.text = lines.join("\n");
    Ok(ex)
}

pub fn extract(path: &Path, cfg: &ConvertConfig) -> Result<Extraction, ExtractError> {
    let bytes = std::fs::read(path)?;
    extract_bytes(&bytes, cfg)
}

/// Return true if `el` has an ancestor whose tag is in EXCLUDED_TAGS.
fn in_excluded_container(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| EXCLUDED_TAGS.contains(&ancestor.value().name()))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts() {
        assert!(accepts(Path::new("index.html")));
        assert!(accepts(Path::new("page.htm")));
        assert!(accepts(Path::new("INDEX.HTML")));
        assert!(!accepts(Path::new("script.js")));
    }

    #[test]
    fn test_title_and_meta() {
        let html = r#"<!DOCTYPE html>
<html>
<head>
  <title>My Page Title</title>
  <meta name="author" content="J. Doe">
  <meta name="description" content="A great page about stuff">
</head>
<body><p>Hello world</p></body>
</html>"#;

        let ex = extract_bytes(html.as_bytes(), &ConvertConfig::default()).unwrap();
        assert_eq!(
            ex.properties.get("title").and_then(|v| v.as_str()),
            Some("My Page Title")
        );
        assert_eq!(
            ex.properties.get("author").and_then(|v| v.as_str()),
            Some("J. Doe")
        );
        assert_eq!(ex.text, "Hello world");
    }

    #[test]
    fn test_markup_never_in_text() {
        let html = "<html><body><h1>Heading</h1><p>A <strong>bold</strong> claim.</p></body></html>";
        let ex = extract_bytes(html.as_bytes(), &ConvertConfig::default()).unwrap();
        assert!(!ex.text.contains('<'));
        assert!(ex.text.contains("Heading"));
        assert!(ex.text.contains("A bold claim."));
    }

    #[test]
    fn test_excluded_containers() {
        let html = r#"<html><body>
<nav><p>Nav link</p></nav>
<footer><p>Footer text</p></footer>
<script>var x = 1;</script>
<p>Visible content</p>
</body></html>"#;

        let ex = extract_bytes(html.as_bytes(), &ConvertConfig::default()).unwrap();
        assert_eq!(ex.text, "Visible content");
    }

    #[test]
    fn test_truncated_over_cap() {
        let body = "<p>0123456789</p>".repeat(10);
        let html = format!("<html><body>{body}</body></html>");
        let cfg = ConvertConfig {
            max_text_bytes: 32,
            ..Default::default()
        };
        let err = extract_bytes(html.as_bytes(), &cfg).unwrap_err();
        assert!(matches!(err, ExtractError::Truncated { .. }));
    }
}
