//! Wire codec for the embedded-HTML dialect.
//!
//! Sheet content is stored as an HTML fragment whose spans carry the
//! annotation and gender markup. The parser here is deliberately lenient:
//! real stored sheets contain hand-edited markup, so recoverable problems
//! (stray close tags, unterminated elements at EOF) are logged and repaired
//! rather than rejected. Hard failures are reserved for input the parser
//! cannot make sense of at all.

use crate::dom::{Document, NodeId};
use smol_str::SmolStr;
use thiserror::Error;

/// Elements that never have children or a close tag.
const VOID_TAGS: &[&str] = &["br", "img", "hr", "input"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HtmlError {
    #[error("unterminated tag starting at byte {pos}")]
    UnterminatedTag { pos: usize },
    #[error("unterminated comment starting at byte {pos}")]
    UnterminatedComment { pos: usize },
    #[error("malformed tag at byte {pos}")]
    MalformedTag { pos: usize },
}

/// Parse an HTML fragment into a fresh document rooted at a synthetic `div`.
pub fn parse(input: &str) -> Result<Document, HtmlError> {
    let mut doc = Document::new("div");
    let root = doc.root();
    parse_into(&mut doc, root, input)?;
    Ok(doc)
}

/// Parse a fragment and append the resulting nodes under `parent`.
pub fn parse_into(doc: &mut Document, parent: NodeId, input: &str) -> Result<(), HtmlError> {
    let mut parser = Parser {
        bytes: input.as_bytes(),
        input,
        pos: 0,
    };
    let mut open_stack: Vec<NodeId> = vec![parent];
    let mut text_buf = String::new();

    loop {
        let current = *open_stack.last().unwrap_or(&parent);
        match parser.next_event()? {
            Event::Text(t) => text_buf.push_str(&t),
            Event::Open { tag, attrs, self_closing } => {
                flush_text(doc, current, &mut text_buf);
                let node = doc.create_element(tag.clone());
                for (name, value) in attrs {
                    doc.set_attr(node, name, value);
                }
                doc.append(current, node);
                if !self_closing && !VOID_TAGS.contains(&tag.as_str()) {
                    open_stack.push(node);
                }
            }
            Event::Close(tag) => {
                flush_text(doc, current, &mut text_buf);
                // Find the matching open element; close intermediates if the
                // source forgot to, ignore the tag if nothing matches.
                let matching = open_stack
                    .iter()
                    .skip(1)
                    .rposition(|n| doc.tag(*n) == Some(tag.as_str()));
                match matching {
                    Some(idx) => {
                        let depth = idx + 1;
                        if open_stack.len() > depth + 1 {
                            tracing::warn!(tag = %tag, "close tag implicitly closed nested elements");
                        }
                        open_stack.truncate(depth);
                    }
                    None => {
                        tracing::warn!(tag = %tag, "ignoring close tag with no open element");
                    }
                }
            }
            Event::Eof => {
                flush_text(doc, current, &mut text_buf);
                if open_stack.len() > 1 {
                    tracing::warn!(
                        open = open_stack.len() - 1,
                        "auto-closing elements left open at end of input"
                    );
                }
                return Ok(());
            }
        }
    }
}

fn flush_text(doc: &mut Document, parent: NodeId, buf: &mut String) {
    if buf.is_empty() {
        return;
    }
    let text = doc.create_text(std::mem::take(buf));
    doc.append(parent, text);
}

enum Event {
    Text(String),
    Open {
        tag: SmolStr,
        attrs: Vec<(SmolStr, String)>,
        self_closing: bool,
    },
    Close(SmolStr),
    Eof,
}

struct Parser<'a> {
    bytes: &'a [u8],
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next_event(&mut self) -> Result<Event, HtmlError> {
        if self.pos >= self.bytes.len() {
            return Ok(Event::Eof);
        }
        if self.peek() == Some(b'<') {
            self.tag_event()
        } else {
            self.text_event()
        }
    }

    fn text_event(&mut self) -> Result<Event, HtmlError> {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'<' {
            self.pos += 1;
        }
        Ok(Event::Text(decode_entities(&self.input[start..self.pos])))
    }

    fn tag_event(&mut self) -> Result<Event, HtmlError> {
        let start = self.pos;
        if self.input[self.pos..].starts_with("<!--") {
            match self.input[self.pos..].find("-->") {
                Some(end) => {
                    self.pos += end + 3;
                    // comments are dropped from the tree
                    return self.next_event();
                }
                None => return Err(HtmlError::UnterminatedComment { pos: start }),
            }
        }
        self.pos += 1; // consume '<'
        let closing = self.peek() == Some(b'/');
        if closing {
            self.pos += 1;
        }
        let tag = self.read_name();
        if tag.is_empty() {
            // A bare '<' in prose; treat it as text.
            self.pos = start + 1;
            return Ok(Event::Text("<".to_string()));
        }
        if closing {
            self.skip_ws();
            if self.peek() != Some(b'>') {
                return Err(HtmlError::MalformedTag { pos: start });
            }
            self.pos += 1;
            return Ok(Event::Close(tag));
        }

        let mut attrs = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(HtmlError::UnterminatedTag { pos: start }),
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(Event::Open { tag, attrs, self_closing: false });
                }
                Some(b'/') => {
                    self.pos += 1;
                    self.skip_ws();
                    if self.peek() != Some(b'>') {
                        return Err(HtmlError::MalformedTag { pos: start });
                    }
                    self.pos += 1;
                    return Ok(Event::Open { tag, attrs, self_closing: true });
                }
                Some(_) => {
                    let name = self.read_attr_name();
                    if name.is_empty() {
                        return Err(HtmlError::MalformedTag { pos: start });
                    }
                    self.skip_ws();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_ws();
                        self.read_attr_value(start)?
                    } else {
                        String::new()
                    };
                    attrs.push((name, value));
                }
            }
        }
    }

    fn read_name(&mut self) -> SmolStr {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        SmolStr::new(self.input[start..self.pos].to_ascii_lowercase())
    }

    fn read_attr_name(&mut self) -> SmolStr {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' {
                self.pos += 1;
            } else {
                break;
            }
        }
        SmolStr::new(self.input[start..self.pos].to_ascii_lowercase())
    }

    fn read_attr_value(&mut self, tag_start: usize) -> Result<String, HtmlError> {
        match self.peek() {
            Some(q @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b == q {
                        let raw = &self.input[start..self.pos];
                        self.pos += 1;
                        return Ok(decode_entities(raw));
                    }
                    self.pos += 1;
                }
                Err(HtmlError::UnterminatedTag { pos: tag_start })
            }
            Some(_) => {
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b.is_ascii_whitespace() || b == b'>' || b == b'/' {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(decode_entities(&self.input[start..self.pos]))
            }
            None => Err(HtmlError::UnterminatedTag { pos: tag_start }),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        // entity names are short; a distant ';' is just punctuation
        let Some(semi) = rest.find(';').filter(|&i| i <= 12) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" | "#39" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                tracing::warn!(entity = %entity, "unknown entity kept literally");
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Serialize the children of the document root, the fragment that gets
/// stored as sheet content.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    for child in doc.children(doc.root()) {
        serialize_node(doc, *child, &mut out);
    }
    out
}

/// Serialize a single node including its own tag.
pub fn serialize_node(doc: &Document, node: NodeId, out: &mut String) {
    if let Some(text) = doc.text(node) {
        escape_text(text, out);
        return;
    }
    let Some(element) = doc.element(node) else {
        return;
    };
    out.push('<');
    out.push_str(&element.tag);
    for (name, value) in element.attrs() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
    if VOID_TAGS.contains(&element.tag.as_str()) {
        return;
    }
    for child in doc.children(node) {
        serialize_node(doc, *child, out);
    }
    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

/// Serialize a detached subtree rooted at `node` (tag included).
pub fn serialize_subtree(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    serialize_node(doc, node, &mut out);
    out
}
