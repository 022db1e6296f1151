//! Selection model over the document tree.
//!
//! A [`Position`] is a boundary either inside a text run (char offset) or
//! between an element's children (child index). A [`DomRange`] pairs two
//! boundaries in document order. The heavy lifting lives in
//! [`extract_contents`], which lifts the selected slice of the tree out as
//! detached nodes, splitting partially-covered text runs and cloning the
//! shells of partially-covered elements.

use crate::dom::{Document, NodeId};

/// A boundary in the tree. For text nodes `offset` counts chars; for
/// elements it counts children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub node: NodeId,
    pub offset: usize,
}

impl Position {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomRange {
    pub start: Position,
    pub end: Position,
}

impl DomRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: Position) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Opaque token for a selection stashed across an operation that steals
/// focus (popup, mode flip). Only the session hands these out.
#[derive(Debug, Clone, Copy)]
pub struct SavedSelection(pub(crate) DomRange);

/// Result of [`extract_contents`]: the lifted nodes plus the collapsed
/// boundary where they came out, always expressed as an element/child-index
/// position so callers can insert there directly.
#[derive(Debug)]
pub struct ExtractedContents {
    pub nodes: Vec<NodeId>,
    pub at: Position,
}

/// Plain text covered by a range, in document order.
pub fn selected_text(doc: &Document, range: &DomRange) -> String {
    if range.is_collapsed() {
        return String::new();
    }
    let mut out = String::new();
    let root = doc.root();
    let mut started = false;
    // Walk every text node in document order and take the covered slice.
    for node in doc.descendants(root) {
        let Some(text) = doc.text(node) else { continue };
        let chars: Vec<char> = text.chars().collect();
        let from = if node == range.start.node {
            started = true;
            range.start.offset.min(chars.len())
        } else if !started && position_precedes_node(doc, &range.start, node) {
            started = true;
            0
        } else if !started {
            continue;
        } else {
            0
        };
        let to = if node == range.end.node {
            range.end.offset.min(chars.len())
        } else if position_precedes_node(doc, &range.end, node) {
            break;
        } else {
            chars.len()
        };
        out.extend(chars[from..to].iter());
        if node == range.end.node {
            break;
        }
    }
    out
}

/// Whether the boundary sits at or before the start of `node` in document
/// order. Element boundaries compare against the child at their index.
fn position_precedes_node(doc: &Document, pos: &Position, node: NodeId) -> bool {
    // Resolve the boundary to "the thing immediately after it".
    let (anchor, before) = resolve_boundary(doc, pos);
    match anchor {
        Some(a) => {
            if a == node {
                return before;
            }
            node_precedes(doc, a, node)
        }
        // Boundary at the very end of its container: node must come after
        // the container entirely.
        None => !doc.contains(pos.node, node) && node_precedes(doc, pos.node, node),
    }
}

/// (node-at-or-after-boundary, boundary-is-before-it). `None` means the
/// boundary is past the container's last child.
fn resolve_boundary(doc: &Document, pos: &Position) -> (Option<NodeId>, bool) {
    if doc.is_text(pos.node) {
        return (Some(pos.node), pos.offset == 0);
    }
    match doc.children(pos.node).get(pos.offset) {
        Some(child) => (Some(*child), true),
        None => (None, false),
    }
}

/// Strict document-order comparison of two distinct nodes.
fn node_precedes(doc: &Document, a: NodeId, b: NodeId) -> bool {
    if a == b {
        return false;
    }
    if doc.contains(a, b) {
        return true; // parent precedes its descendants in pre-order
    }
    if doc.contains(b, a) {
        return false;
    }
    let Some(ca) = doc.common_ancestor(a, b) else {
        return false;
    };
    let branch = |n: NodeId| {
        let mut cur = n;
        while doc.parent(cur) != Some(ca) {
            match doc.parent(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
        cur
    };
    let (ba, bb) = (branch(a), branch(b));
    match (doc.child_index(ba), doc.child_index(bb)) {
        (Some(ia), Some(ib)) => ia < ib,
        _ => false,
    }
}

/// Split a text node at a char offset; returns the position between the
/// halves as an element/child-index boundary, plus whether a new sibling was
/// inserted. Offsets at either end avoid creating empty runs.
fn split_text_boundary(doc: &mut Document, pos: Position) -> (Position, bool) {
    let Some(text) = doc.text(pos.node).map(str::to_owned) else {
        return (pos, false);
    };
    let parent = match doc.parent(pos.node) {
        Some(p) => p,
        None => return (pos, false),
    };
    let index = doc.child_index(pos.node).unwrap_or(0);
    let char_count = text.chars().count();
    let offset = pos.offset.min(char_count);
    if offset == 0 {
        return (Position::new(parent, index), false);
    }
    if offset == char_count {
        return (Position::new(parent, index + 1), false);
    }
    let byte = text
        .char_indices()
        .nth(offset)
        .map(|(b, _)| b)
        .unwrap_or(text.len());
    let (head, tail) = text.split_at(byte);
    doc.set_text(pos.node, head.to_string());
    let tail_node = doc.create_text(tail.to_string());
    doc.insert(parent, index + 1, tail_node);
    (Position::new(parent, index + 1), true)
}

/// Lift the contents of a range out of the tree. Partially-covered text runs
/// are split at the boundaries; partially-covered elements contribute a
/// shallow clone holding their covered children while the original keeps the
/// rest. The range collapses to the extraction point.
pub fn extract_contents(doc: &mut Document, range: &DomRange) -> ExtractedContents {
    if range.is_collapsed() {
        let (at, _) = split_text_boundary(doc, range.start);
        return ExtractedContents { nodes: Vec::new(), at };
    }

    // Same text node: carve out the middle as a fresh run.
    if range.start.node == range.end.node && doc.is_text(range.start.node) {
        let node = range.start.node;
        let text: Vec<char> = doc.text(node).unwrap_or_default().chars().collect();
        let from = range.start.offset.min(text.len());
        let to = range.end.offset.min(text.len()).max(from);
        let head: String = text[..from].iter().collect();
        let middle: String = text[from..to].iter().collect();
        let rest: String = text[to..].iter().collect();
        let parent = doc.parent(node).unwrap_or(doc.root());
        let index = doc.child_index(node).unwrap_or(0);
        let extracted = doc.create_text(middle);
        let at = match (head.is_empty(), rest.is_empty()) {
            (true, true) => {
                doc.detach(node);
                Position::new(parent, index)
            }
            (true, false) => {
                doc.set_text(node, rest);
                Position::new(parent, index)
            }
            (false, true) => {
                doc.set_text(node, head);
                Position::new(parent, index + 1)
            }
            (false, false) => {
                doc.set_text(node, head);
                let rest_node = doc.create_text(rest);
                doc.insert(parent, index + 1, rest_node);
                Position::new(parent, index + 1)
            }
        };
        return ExtractedContents { nodes: vec![extracted], at };
    }

    // Normalize both boundaries to element/child-index positions. The start
    // split runs first; if it inserted a sibling before an element-offset end
    // boundary in the same container, that offset shifts by one.
    let (start, start_inserted) = split_text_boundary(doc, range.start);
    let mut end_pos = range.end;
    if start_inserted
        && !doc.is_text(end_pos.node)
        && end_pos.node == start.node
        && end_pos.offset >= start.offset
    {
        end_pos.offset += 1;
    }
    let (end, _) = split_text_boundary(doc, end_pos);
    let (sp, si) = (start.node, start.offset);
    let (ep, ei) = (end.node, end.offset);

    let ca = match doc.common_ancestor(sp, ep) {
        Some(ca) => ca,
        None => {
            return ExtractedContents { nodes: Vec::new(), at: start };
        }
    };
    if sp == ep {
        let nodes = doc.detach_children(sp, si..ei.min(doc.child_count(sp)).max(si));
        return ExtractedContents { nodes, at: start };
    }

    // Start side: peel covered tails off each ancestor up to (not including)
    // the common ancestor, wrapping what came from deeper levels in shallow
    // clones so structure is preserved.
    let mut frag_start: Vec<NodeId> = Vec::new();
    let mut start_idx_in_ca = si;
    if sp != ca {
        let mut level = doc.detach_children(sp, si..doc.child_count(sp));
        let mut cur = sp;
        loop {
            // Every partially covered ancestor contributes a shallow clone
            // holding its covered slice.
            if !level.is_empty() {
                let shell = doc.clone_shallow(cur);
                for n in level.drain(..) {
                    doc.append(shell, n);
                }
                level.push(shell);
            }
            let p = match doc.parent(cur) {
                Some(p) => p,
                None => break,
            };
            if p == ca {
                break;
            }
            let i = doc.child_index(cur).unwrap_or(0);
            let tail = doc.detach_children(p, i + 1..doc.child_count(p));
            level.extend(tail);
            cur = p;
        }
        frag_start = level;
        start_idx_in_ca = doc.child_index(cur).unwrap_or(0) + 1;
    }

    // End side, mirrored: peel covered heads.
    let mut frag_end: Vec<NodeId> = Vec::new();
    let mut end_idx_in_ca = ei;
    if ep != ca {
        let mut level = doc.detach_children(ep, 0..ei.min(doc.child_count(ep)));
        let mut cur = ep;
        loop {
            if !level.is_empty() {
                let shell = doc.clone_shallow(cur);
                for n in level.drain(..) {
                    doc.append(shell, n);
                }
                level.push(shell);
            }
            let p = match doc.parent(cur) {
                Some(p) => p,
                None => break,
            };
            if p == ca {
                break;
            }
            let i = doc.child_index(cur).unwrap_or(0);
            let mut merged = doc.detach_children(p, 0..i);
            merged.extend(level.drain(..));
            level = merged;
            cur = p;
        }
        frag_end = level;
        end_idx_in_ca = doc.child_index(cur).unwrap_or(0);
    }
    // Start-side peeling never touches the common ancestor's child list, so
    // when ep == ca the original end index is still valid.

    let middle = if end_idx_in_ca > start_idx_in_ca {
        doc.detach_children(ca, start_idx_in_ca..end_idx_in_ca)
    } else {
        Vec::new()
    };

    let mut nodes = frag_start;
    nodes.extend(middle);
    nodes.extend(frag_end);
    let at = if sp == ca {
        start
    } else {
        Position::new(ca, start_idx_in_ca)
    };
    ExtractedContents { nodes, at }
}

/// Insert a detached node at a boundary position.
pub fn insert_node_at(doc: &mut Document, at: Position, node: NodeId) {
    let at = if doc.is_text(at.node) {
        split_text_boundary(doc, at).0
    } else {
        at
    };
    doc.insert(at.node, at.offset, node);
}

/// Insert several detached nodes at a boundary, preserving their order.
pub fn insert_nodes_at(doc: &mut Document, at: Position, nodes: Vec<NodeId>) {
    let at = if doc.is_text(at.node) {
        split_text_boundary(doc, at).0
    } else {
        at
    };
    for (offset, node) in nodes.into_iter().enumerate() {
        doc.insert(at.node, at.offset + offset, node);
    }
}

/// Nearest enclosing non-breakable annotation of a boundary, if any.
fn enclosing_bubble(doc: &Document, pos: &Position) -> Option<NodeId> {
    doc.closest(pos.node, |d, n| d.has_class(n, "writers-bubble"))
}

/// Wrap the selected contents in `wrapper` (a detached element).
///
/// Refused when the two endpoints sit in different writers-bubble contexts,
/// because the wrap would tear the annotation structure apart; in that case
/// nothing is mutated and `None` is returned. On success the wrapper is in
/// the tree holding the old contents, and its id is returned.
pub fn wrap_selection(doc: &mut Document, range: &DomRange, wrapper: NodeId) -> Option<NodeId> {
    let start_bubble = enclosing_bubble(doc, &range.start);
    let end_bubble = enclosing_bubble(doc, &range.end);
    if start_bubble != end_bubble {
        tracing::debug!("wrap refused, selection crosses an annotation boundary");
        return None;
    }
    let extracted = extract_contents(doc, range);
    for node in extracted.nodes {
        doc.append(wrapper, node);
    }
    insert_node_at(doc, extracted.at, wrapper);
    Some(wrapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;

    fn doc_of(input: &str) -> Document {
        html::parse(input).unwrap()
    }

    #[test]
    fn test_selected_text_within_one_run() {
        let doc = doc_of("hello world");
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 6), Position::new(t, 11));
        assert_eq!(selected_text(&doc, &range), "world");
    }

    #[test]
    fn test_selected_text_across_elements() {
        let doc = doc_of("ab<b>cd</b>ef");
        let root = doc.root();
        let t1 = doc.children(root)[0];
        let t3 = doc.children(root)[2];
        let range = DomRange::new(Position::new(t1, 1), Position::new(t3, 1));
        assert_eq!(selected_text(&doc, &range), "bcde");
    }

    #[test]
    fn test_extract_middle_of_text_run() {
        let mut doc = doc_of("hello world");
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 2), Position::new(t, 5));
        let out = extract_contents(&mut doc, &range);
        assert_eq!(out.nodes.len(), 1);
        assert_eq!(doc.text(out.nodes[0]), Some("llo"));
        assert_eq!(html::serialize(&doc), "he world");
    }

    #[test]
    fn test_extract_whole_text_run() {
        let mut doc = doc_of("word");
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 0), Position::new(t, 4));
        let out = extract_contents(&mut doc, &range);
        assert_eq!(doc.text(out.nodes[0]), Some("word"));
        assert_eq!(html::serialize(&doc), "");
    }

    #[test]
    fn test_extract_across_inline_element() {
        let mut doc = doc_of("ab<b>cd</b>ef");
        let root = doc.root();
        let t1 = doc.children(root)[0];
        let t3 = doc.children(root)[2];
        let range = DomRange::new(Position::new(t1, 1), Position::new(t3, 1));
        let out = extract_contents(&mut doc, &range);
        // b, full <b> element, e
        let mut s = String::new();
        for n in &out.nodes {
            html::serialize_node(&doc, *n, &mut s);
        }
        assert_eq!(s, "b<b>cd</b>e");
        assert_eq!(html::serialize(&doc), "af");
    }

    #[test]
    fn test_extract_partial_element_clones_shell() {
        let mut doc = doc_of("<b>bold</b> tail");
        let root = doc.root();
        let b = doc.children(root)[0];
        let bt = doc.children(b)[0];
        let tail = doc.children(root)[1];
        let range = DomRange::new(Position::new(bt, 2), Position::new(tail, 2));
        let out = extract_contents(&mut doc, &range);
        let mut s = String::new();
        for n in &out.nodes {
            html::serialize_node(&doc, *n, &mut s);
        }
        assert_eq!(s, "<b>ld</b> t");
        assert_eq!(html::serialize(&doc), "<b>bo</b>ail");
    }

    #[test]
    fn test_wrap_selection_preserves_content() {
        let mut doc = doc_of("make this bold now");
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 5), Position::new(t, 14));
        let b = doc.create_element("b");
        let wrapped = wrap_selection(&mut doc, &range, b);
        assert_eq!(wrapped, Some(b));
        assert_eq!(html::serialize(&doc), "make <b>this bold</b> now");
    }

    #[test]
    fn test_wrap_refused_across_bubble_boundary() {
        let mut doc = doc_of(concat!(
            "outside ",
            r#"<span class="writers-bubble stnote">inside</span>"#,
        ));
        let root = doc.root();
        let t_out = doc.children(root)[0];
        let bubble = doc.children(root)[1];
        let t_in = doc.children(bubble)[0];
        let before = html::serialize(&doc);

        let range = DomRange::new(Position::new(t_out, 3), Position::new(t_in, 3));
        let b = doc.create_element("b");
        assert_eq!(wrap_selection(&mut doc, &range, b), None);
        assert_eq!(html::serialize(&doc), before);
    }

    #[test]
    fn test_wrap_inside_one_bubble_allowed() {
        let mut doc = doc_of(r#"<span class="writers-bubble todo">fix the scene</span>"#);
        let bubble = doc.children(doc.root())[0];
        let t = doc.children(bubble)[0];
        let range = DomRange::new(Position::new(t, 4), Position::new(t, 7));
        let i = doc.create_element("i");
        assert!(wrap_selection(&mut doc, &range, i).is_some());
        assert_eq!(
            html::serialize(&doc),
            r#"<span class="writers-bubble todo">fix <i>the</i> scene</span>"#
        );
    }

    #[test]
    fn test_insert_nodes_at_text_boundary() {
        let mut doc = doc_of("ab");
        let t = doc.children(doc.root())[0];
        let node = doc.create_element("br");
        insert_node_at(&mut doc, Position::new(t, 1), node);
        assert_eq!(html::serialize(&doc), "a<br>b");
    }
}
