//! Decomposition of RFC822/MIME mail messages saved to disk (`.eml`, `.msg`).
//!
//! A single message file may carry attachments, alternative HTML views, and
//! whole nested messages. Decomposition produces exactly one
//! [`ConvertedDocument`]: plain-text views and scrubbed HTML are inlined into
//! the document text, everything else is emitted as a [`RawContent`] child in
//! container order. One message with two attachments therefore multiplies
//! into a text artifact plus two addressable children once persisted.
//!
//! HTML is never emitted as a child, whether it arrived inline or as an
//! attachment — every HTML view collapses into the body text. Child counts
//! seen here will not match what a mail client displays.

use std::path::Path;

use mail_parser::{Addr, Address, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};
use unfurl_common::config::ConvertConfig;
use unfurl_common::error::ConvertError;
use unfurl_common::model::{ConvertedDocument, RawContent};
use unfurl_common::naming::{derive_child_id, extract_angle_value, shorten_protocol_id};
use unfurl_common::textutil::delete_controls;

/// Namespace prefix for message-level metadata replicated onto children.
pub const MAIL_KEY_PREFIX: &str = "mail:";

/// Divider placed before each scrubbed HTML view inlined into the body.
const HTML_DIVIDER: &str = "\n===============\n";

/// Divider placed after each inlined plain-text body. Not a run of `=`:
/// `=XX` sequences are reserved by quoted-printable encoding.
const TEXT_DIVIDER: &str = "\n*******************\n";

/// Accept RFC822 messages saved to disk.
pub fn accepts(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str(),
        "eml" | "msg"
    )
}

pub struct MessageDecomposer {
    cfg: ConvertConfig,
}

/// Accumulator threaded through the recursive part walk. Owned by the
/// top-level call; recursion never touches shared state.
#[derive(Default)]
struct Walk {
    buf: String,
    parts_seen: usize,
    first_charset: Option<String>,
    truncated: bool,
}

impl MessageDecomposer {
    pub fn new(cfg: ConvertConfig) -> Self {
        Self { cfg }
    }

    pub fn convert_file(&self, path: &Path) -> Result<ConvertedDocument, ConvertError> {
        let raw = std::fs::read(path)?;
        self.convert_bytes(&raw, Some(path))
    }

    /// Convert an RFC822 message held in memory. `source` is recorded on the
    /// document when the message came from a file.
    pub fn convert_bytes(
        &self,
        raw: &[u8],
        source: Option<&Path>,
    ) -> Result<ConvertedDocument, ConvertError> {
        let msg = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| ConvertError::Malformed("not an RFC822 message".into()))?;

        let mut doc = ConvertedDocument::new(source);
        set_mail_attributes(&mut doc, &msg);

        // Children are id-prefixed by the source file stem when there is
        // one, else by the (shortened) message id.
        let prefix = source
            .and_then(Path::file_stem)
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| doc.id.clone());
        let prefix = if prefix.is_empty() {
            "message".to_string()
        } else {
            prefix
        };

        let mut walk = Walk::default();
        self.walk_part(&msg, 0, &mut doc, &mut walk, &prefix, 0);

        if walk.truncated {
            doc.set_property("mail:truncated", "true");
        }
        doc.encoding = walk.first_charset.or_else(|| Some("utf-8".into()));
        doc.text = walk.buf;
        doc.is_converted = true;
        Ok(doc)
    }

    /// Recursive part walk: inline what reads as text, emit the rest as
    /// children. A failing part is logged and skipped; siblings and
    /// ancestors are never affected.
    fn walk_part(
        &self,
        msg: &Message,
        part_id: usize,
        doc: &mut ConvertedDocument,
        walk: &mut Walk,
        prefix: &str,
        depth: usize,
    ) {
        let Some(part) = msg.parts.get(part_id) else {
            return;
        };
        walk.parts_seen += 1;
        let index = walk.parts_seen;

        let info = PartInfo::read(part);

        // Calendar invites carry no extractable content worth keeping.
        if info.is_calendar {
            debug!("{prefix}#{index}: ignoring calendar part");
            return;
        }

        match &part.body {
            PartType::Multipart(children) => {
                if depth >= self.cfg.max_depth {
                    warn!("{prefix}: part nesting exceeds {}, not walked", self.cfg.max_depth);
                    return;
                }
                // The wrapper itself contributes no text and no child.
                for child_id in children {
                    self.walk_part(msg, *child_id as usize, doc, walk, prefix, depth + 1);
                }
            }
            PartType::Message(nested) => {
                if depth >= self.cfg.max_depth {
                    warn!("{prefix}: message nesting exceeds {}, not walked", self.cfg.max_depth);
                    return;
                }
                // An embedded message flattens into the ancestor: same
                // buffer, same prefix, no new top-level document.
                self.walk_part(nested, 0, doc, walk, prefix, depth + 1);
            }
            PartType::Html(html) => {
                // All HTML is inlined, never a child (see module docs).
                match unfurl_extract_html::extract_bytes(html.as_bytes(), &self.cfg) {
                    Ok(ex) => self.append_html(walk, &ex.text),
                    Err(e) => warn!("{prefix}#{index}: skipping HTML part: {e}"),
                }
            }
            PartType::Text(text) => {
                // The first declared charset fixes the parent's encoding;
                // later parts record theirs only on their own child items.
                if walk.first_charset.is_none() {
                    walk.first_charset = info.charset.clone();
                }
                if info.is_attachment {
                    let id = child_id_for(&info, prefix, index, "txt");
                    let mut child = base_child(id, &info);
                    // Text already arrives charset-decoded; children carry
                    // the canonical encoding.
                    child.encoding = Some("utf-8".into());
                    child.bytes = text.as_bytes().to_vec();
                    copy_mail_attrs(doc, &mut child);
                    doc.add_raw_child(child);
                } else {
                    self.append_text(walk, &delete_controls(text));
                }
            }
            PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
                let id = child_id_for(&info, prefix, index, "dat");
                let mut child = base_child(id, &info);
                child.bytes = bytes.to_vec();
                copy_mail_attrs(doc, &mut child);
                doc.add_raw_child(child);
            }
        }
    }

    fn append_html(&self, walk: &mut Walk, text: &str) {
        if !self.has_room(walk, text.len()) {
            return;
        }
        if !walk.buf.is_empty() {
            walk.buf.push_str(HTML_DIVIDER);
        }
        walk.buf.push_str(text);
    }

    fn append_text(&self, walk: &mut Walk, text: &str) {
        if !self.has_room(walk, text.len()) {
            return;
        }
        walk.buf.push_str(text);
        walk.buf.push_str(TEXT_DIVIDER);
    }

    fn has_room(&self, walk: &mut Walk, add: usize) -> bool {
        if walk.buf.len() + add > self.cfg.max_text_bytes {
            if !walk.truncated {
                warn!("message text exceeds {} bytes, further parts dropped", self.cfg.max_text_bytes);
                walk.truncated = true;
            }
            return false;
        }
        true
    }
}

/// Copy the message's innate headers into document properties so the
/// metadata lands in the normal place, and replicate down to children.
fn set_mail_attributes(doc: &mut ConvertedDocument, msg: &Message) {
    if let Some(msg_id) = msg.message_id() {
        doc.id = shorten_protocol_id(msg_id);
        doc.set_property("mail:msgid", extract_angle_value(msg_id));
    }
    if let Some(subject) = msg.subject() {
        doc.set_title(subject);
        doc.set_property("mail:subject", subject);
    }
    if let Some(sender) = msg.from().and_then(first_address) {
        doc.set_author(sender.clone());
        doc.set_property("mail:sender", sender);
    }
    if let Some(date) = msg.date() {
        let date = date.to_rfc3339();
        doc.set_created(date.clone());
        doc.set_property("mail:date", date);
    }
}

fn first_address(addr: &Address) -> Option<String> {
    let a: &Addr = addr.first()?;
    match (a.name.as_deref(), a.address.as_deref()) {
        (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
        (None, Some(email)) => Some(email.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}

/// Each emitted child learns which message carried it: every `mail:` property
/// of the parent is replicated, plus the child's own encoding.
fn copy_mail_attrs(parent: &ConvertedDocument, child: &mut RawContent) {
    if let Some(enc) = child.encoding.clone() {
        child.set_property("encoding", enc);
    }
    let inherited: Vec<(String, String)> = parent
        .properties
        .iter()
        .filter(|(key, _)| key.starts_with(MAIL_KEY_PREFIX))
        .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
        .collect();
    for (key, value) in inherited {
        child.set_property(&key, value);
    }
}

fn child_id_for(info: &PartInfo, prefix: &str, index: usize, default_ext: &str) -> String {
    match info.filename.as_deref() {
        Some(name) => derive_child_id(prefix, index, Some(name)),
        None => {
            let ext = info.ext_hint.unwrap_or(default_ext);
            format!("{}.{ext}", derive_child_id(prefix, index, None))
        }
    }
}

fn base_child(id: String, info: &PartInfo) -> RawContent {
    let mut child = RawContent {
        id,
        encoding: info.charset.clone(),
        mime_type: info.mime_type.clone(),
        ..Default::default()
    };
    child.set_property(
        "mail:disposition",
        info.disposition.as_deref().unwrap_or("none"),
    );
    if let Some(cid) = &info.content_id {
        child.set_property("mail:content-id", cid.clone());
    }
    child
}

/// Everything the walk needs to know about one part, read up front so the
/// classification below stays flat.
struct PartInfo {
    mime_type: Option<String>,
    charset: Option<String>,
    disposition: Option<String>,
    content_id: Option<String>,
    filename: Option<String>,
    is_attachment: bool,
    is_calendar: bool,
    ext_hint: Option<&'static str>,
}

impl PartInfo {
    fn read(part: &MessagePart) -> Self {
        let ct = part.content_type();
        let mime_type = ct.map(|c| match c.subtype() {
            Some(sub) => format!("{}/{}", c.ctype(), sub).to_lowercase(),
            None => c.ctype().to_lowercase(),
        });
        let charset = ct
            .and_then(|c| c.attribute("charset"))
            .map(|s| s.to_lowercase());
        let disposition = part.content_disposition().map(|d| d.ctype().to_lowercase());
        let is_attachment = disposition.as_deref() == Some("attachment");
        let content_id = part
            .content_id()
            .map(|c| extract_angle_value(c).to_string());
        let filename = part.attachment_name().map(str::to_string);

        let file_ext = filename
            .as_deref()
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let mime = mime_type.as_deref().unwrap_or("");
        let is_calendar =
            mime == "text/calendar" || matches!(file_ext.as_deref(), Some("ics" | "ical"));
        let ext_hint = match mime {
            "text/plain" => Some("txt"),
            "text/html" => Some("html"),
            _ => None,
        };

        PartInfo {
            mime_type,
            charset,
            disposition,
            content_id,
            filename,
            is_attachment,
            is_calendar,
            ext_hint,
        }
    }
}
