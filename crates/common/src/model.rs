use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::naming;

/// Ordered key→value metadata. `serde_json`'s `preserve_order` feature keeps
/// insertion order, so persisted sidecars replay properties in the order the
/// decomposition recorded them.
pub type Properties = serde_json::Map<String, Value>;

pub const PROP_TITLE: &str = "title";
pub const PROP_AUTHOR: &str = "author";
pub const PROP_CREATED: &str = "created";

/// A named byte blob pulled out of a containing document — an attachment, an
/// embedded object — before (or in lieu of) conversion to text.
///
/// Never mutated once appended to a parent's child list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContent {
    /// Unique within the parent's child set. Either the declared filename or
    /// a generated enumeration (see [`naming::derive_child_id`]).
    pub id: String,
    /// Declared or inferred character encoding, if any.
    pub encoding: Option<String>,
    /// Declared or sniffed media type; None until classified.
    pub mime_type: Option<String>,
    /// Raw payload. Not serialized — the bytes live as their own file once
    /// persisted; the sidecar carries only this inventory record.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Provenance metadata: disposition, content-id, namespaced attributes
    /// copied down from the containing document.
    #[serde(default)]
    pub properties: Properties,
}

impl RawContent {
    pub fn set_property(&mut self, key: &str, value: impl Into<String>) {
        self.properties
            .insert(key.to_string(), Value::String(value.into()));
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// The result of converting one source unit — a file, a mail message, an
/// archive entry — to plain text plus metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertedDocument {
    /// Stable, filesystem-safe identifier. Protocol metadata (a message-id)
    /// wins; otherwise derived from the source name plus a content hash.
    pub id: String,
    pub source_path: Option<PathBuf>,
    /// Extracted/concatenated plain text. Persisted as its own file, never
    /// inside the metadata sidecar.
    #[serde(skip)]
    pub text: String,
    /// Resolved character encoding for `text`. For multi-part sources this is
    /// fixed by the first text part that declares one.
    pub encoding: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    /// Unconverted children in container traversal order.
    #[serde(default)]
    pub raw_children: Vec<RawContent>,
    /// Converted sub-documents (archive entries, converted attachments).
    /// Each has its own cache entry; not serialized into the parent sidecar.
    #[serde(skip)]
    pub children: Vec<ConvertedDocument>,
    /// False until extraction succeeds. A converted document may still have
    /// individually failed children.
    #[serde(default)]
    pub is_converted: bool,
}

impl ConvertedDocument {
    pub fn new(source: Option<&Path>) -> Self {
        ConvertedDocument {
            source_path: source.map(Path::to_path_buf),
            ..Default::default()
        }
    }

    /// Base name of the source file, if this document came from one.
    pub fn filename(&self) -> Option<&str> {
        self.source_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<String>) {
        self.properties
            .insert(key.to_string(), Value::String(value.into()));
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.set_property(PROP_TITLE, title);
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.set_property(PROP_AUTHOR, author);
    }

    pub fn set_created(&mut self, created: impl Into<String>) {
        self.set_property(PROP_CREATED, created);
    }

    pub fn add_raw_child(&mut self, child: RawContent) {
        self.raw_children.push(child);
    }

    pub fn add_child(&mut self, child: ConvertedDocument) {
        self.children.push(child);
    }

    /// Fill in the identity fallback: documents whose protocol supplied no id
    /// get one derived from the source name plus a hash of the text, so
    /// re-conversion of the same source yields the same id.
    pub fn ensure_default_id(&mut self) {
        if !self.id.is_empty() {
            return;
        }
        let name = self.filename().unwrap_or("document").to_string();
        self.id = naming::content_id(&name, self.text.as_bytes());
    }
}

/// Output of the text-extraction adapter: text plus whatever metadata the
/// format exposed (title, author, creation date where known).
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    pub encoding: Option<String>,
    pub properties: Properties,
}
