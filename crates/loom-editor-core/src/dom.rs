//! In-memory document tree.
//!
//! The editor's durable state is this tree of typed nodes, not a live DOM.
//! Nodes live in an arena owned by [`Document`] and are addressed by
//! [`NodeId`]; structural edits (append, detach, unwrap, replace) rewire
//! parent/child links without moving node data. Detached subtrees stay in
//! the arena until the document is dropped, which is fine for a
//! page-lifetime document.

use smol_str::SmolStr;

/// Handle to a node in a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Element data: tag name plus ordered attributes.
///
/// Attribute order is preserved so serialized output is stable; the wire
/// format carries annotation discriminators (`data-larp-action`) and the
/// gender attributes as plain attrs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: SmolStr,
    attrs: Vec<(SmolStr, String)>,
}

impl Element {
    pub fn new(tag: impl Into<SmolStr>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<SmolStr>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attrs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(n, _)| n == name)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&SmolStr, &str)> {
        self.attrs.iter().map(|(n, v)| (n, v.as_str()))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|t| t == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        match self.attr("class") {
            Some(existing) if !existing.is_empty() => {
                let joined = format!("{existing} {class}");
                self.set_attr("class", joined);
            }
            _ => self.set_attr("class", class),
        }
    }

    pub fn remove_class(&mut self, class: &str) {
        let Some(existing) = self.attr("class") else {
            return;
        };
        let remaining: Vec<&str> = existing
            .split_whitespace()
            .filter(|t| *t != class)
            .collect();
        if remaining.is_empty() {
            self.remove_attr("class");
        } else {
            self.set_attr("class", remaining.join(" "));
        }
    }
}

/// A node is either a text run or an element with children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Arena-backed document tree with a synthetic root element.
///
/// The root plays the role of the editor container; serializing a document
/// emits the root's children, not the root tag itself.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new("div")
    }
}

impl Document {
    /// Create an empty document whose root is an element with `root_tag`.
    pub fn new(root_tag: impl Into<SmolStr>) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = doc.alloc(NodeKind::Element(Element::new(root_tag)));
        doc.root = root;
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, tag: impl Into<SmolStr>) -> NodeId {
        self.alloc(NodeKind::Element(Element::new(tag)))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Text(_))
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        if let NodeKind::Text(t) = &mut self.nodes[node.0].kind {
            *t = text.into();
        }
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(e) => Some(e),
            NodeKind::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(e) => Some(e),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attr(name))
    }

    pub fn set_attr(&mut self, node: NodeId, name: impl Into<SmolStr>, value: impl Into<String>) {
        if let Some(e) = self.element_mut(node) {
            e.set_attr(name, value);
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(e) = self.element_mut(node) {
            e.remove_attr(name);
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node).map(|e| e.has_class(class)).unwrap_or(false)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(e) = self.element_mut(node) {
            e.add_class(class);
        }
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(e) = self.element_mut(node) {
            e.remove_class(class);
        }
    }

    // === Structure ===

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn child_count(&self, node: NodeId) -> usize {
        self.nodes[node.0].children.len()
    }

    /// Index of `node` within its parent's child list.
    pub fn child_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.nodes[parent.0].children.iter().position(|c| *c == node)
    }

    /// Append a (detached) child to a parent element.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Insert a (detached) child at `index` in the parent's child list.
    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let index = index.min(self.nodes[parent.0].children.len());
        self.nodes[parent.0].children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Insert a child as the first child of the parent.
    pub fn prepend(&mut self, parent: NodeId, child: NodeId) {
        self.insert(parent, 0, child);
    }

    /// Unlink a node from its parent. The subtree stays alive, detached.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    /// Replace a node with a list of (detached) nodes, in place.
    pub fn replace_with(&mut self, node: NodeId, replacements: Vec<NodeId>) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        let Some(index) = self.child_index(node) else {
            return;
        };
        self.detach(node);
        for (offset, repl) in replacements.into_iter().enumerate() {
            self.insert(parent, index + offset, repl);
        }
    }

    /// Replace an element with its own children ("remove the tag").
    pub fn unwrap_node(&mut self, node: NodeId) {
        let children: Vec<NodeId> = self.children(node).to_vec();
        // detach children first so replace_with sees them as free
        for child in &children {
            self.detach(*child);
        }
        self.replace_with(node, children);
    }

    /// Detach and return a contiguous range of children.
    pub fn detach_children(&mut self, parent: NodeId, range: std::ops::Range<usize>) -> Vec<NodeId> {
        let ids: Vec<NodeId> = self.nodes[parent.0].children[range].to_vec();
        for id in &ids {
            self.detach(*id);
        }
        ids
    }

    /// Deep-clone a subtree; the clone is detached.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let kind = self.nodes[node.0].kind.clone();
        let clone = self.alloc(kind);
        let children: Vec<NodeId> = self.children(node).to_vec();
        for child in children {
            let child_clone = self.clone_subtree(child);
            self.append(clone, child_clone);
        }
        clone
    }

    /// Shallow-clone a node (attributes but no children); detached.
    pub fn clone_shallow(&mut self, node: NodeId) -> NodeId {
        let kind = match &self.nodes[node.0].kind {
            NodeKind::Text(t) => NodeKind::Text(t.clone()),
            NodeKind::Element(e) => NodeKind::Element(Element {
                tag: e.tag.clone(),
                attrs: e.attrs.clone(),
            }),
        };
        self.alloc(kind)
    }

    // === Traversal ===

    /// Walk ancestors from the node's parent up to the root.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = self.parent(node);
        std::iter::from_fn(move || {
            let next = current?;
            current = self.parent(next);
            Some(next)
        })
    }

    /// Nearest ancestor-or-self element matching the predicate (jQuery `closest`).
    pub fn closest<F>(&self, node: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        if pred(self, node) {
            return Some(node);
        }
        self.ancestors(node).find(|n| pred(self, *n))
    }

    /// Pre-order (document order) traversal of a subtree, excluding the root.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            for child in self.children(n).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// First descendant (document order) matching the predicate.
    pub fn find_descendant<F>(&self, node: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.descendants(node).into_iter().find(|n| pred(self, *n))
    }

    /// All descendants matching the predicate, in document order.
    pub fn query_all<F>(&self, node: NodeId, pred: F) -> Vec<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        self.descendants(node)
            .into_iter()
            .filter(|n| pred(self, *n))
            .collect()
    }

    /// Whether `ancestor` contains `node` (strictly or as self).
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Lowest common ancestor of two nodes.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut chain = vec![a];
        chain.extend(self.ancestors(a));
        let mut candidate = b;
        loop {
            if chain.contains(&candidate) {
                return Some(candidate);
            }
            candidate = self.parent(candidate)?;
        }
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(t) = self.text(node) {
            out.push_str(t);
            return out;
        }
        for n in self.descendants(node) {
            if let Some(t) = self.text(n) {
                out.push_str(t);
            }
        }
        out
    }

    // === contenteditable ===

    /// Whether the element carries an explicit `contenteditable` attribute
    /// equal to the given value (case-insensitive).
    pub fn editable_attr_is(&self, node: NodeId, value: bool) -> bool {
        self.attr(node, "contenteditable")
            .map(|v| v.eq_ignore_ascii_case(if value { "true" } else { "false" }))
            .unwrap_or(false)
    }

    pub fn set_editable(&mut self, node: NodeId, editable: bool) {
        self.set_attr(node, "contenteditable", if editable { "true" } else { "false" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_doc() -> (Document, NodeId) {
        let doc = Document::new("div");
        let root = doc.root();
        (doc, root)
    }

    #[test]
    fn test_build_and_traverse() {
        let (mut doc, root) = make_doc();
        let b = doc.create_element("b");
        let t1 = doc.create_text("hello ");
        let t2 = doc.create_text("world");
        doc.append(root, t1);
        doc.append(root, b);
        doc.append(b, t2);

        assert_eq!(doc.children(root), &[t1, b]);
        assert_eq!(doc.parent(t2), Some(b));
        assert_eq!(doc.text_content(root), "hello world");
        assert_eq!(doc.descendants(root), vec![t1, b, t2]);
    }

    #[test]
    fn test_classes() {
        let (mut doc, _) = make_doc();
        let span = doc.create_element("span");
        doc.add_class(span, "writers-bubble");
        doc.add_class(span, "stnote");
        assert_eq!(doc.attr(span, "class"), Some("writers-bubble stnote"));
        assert!(doc.has_class(span, "stnote"));
        doc.remove_class(span, "writers-bubble");
        assert_eq!(doc.attr(span, "class"), Some("stnote"));
        doc.remove_class(span, "stnote");
        assert_eq!(doc.attr(span, "class"), None);
    }

    #[test]
    fn test_unwrap() {
        let (mut doc, root) = make_doc();
        let h1 = doc.create_element("h1");
        let t = doc.create_text("title");
        doc.append(root, h1);
        doc.append(h1, t);

        doc.unwrap_node(h1);
        assert_eq!(doc.children(root), &[t]);
        assert_eq!(doc.parent(t), Some(root));
    }

    #[test]
    fn test_replace_with() {
        let (mut doc, root) = make_doc();
        let old = doc.create_text("old");
        let tail = doc.create_text("tail");
        doc.append(root, old);
        doc.append(root, tail);

        let a = doc.create_text("a");
        let b = doc.create_text("b");
        doc.replace_with(old, vec![a, b]);
        assert_eq!(doc.children(root), &[a, b, tail]);
    }

    #[test]
    fn test_clone_subtree_is_detached() {
        let (mut doc, root) = make_doc();
        let b = doc.create_element("b");
        let t = doc.create_text("x");
        doc.append(root, b);
        doc.append(b, t);

        let clone = doc.clone_subtree(b);
        assert_ne!(clone, b);
        assert!(doc.parent(clone).is_none());
        assert_eq!(doc.text_content(clone), "x");
        // original untouched
        assert_eq!(doc.children(root), &[b]);
    }

    #[test]
    fn test_common_ancestor() {
        let (mut doc, root) = make_doc();
        let a = doc.create_element("span");
        let b = doc.create_element("span");
        let ta = doc.create_text("a");
        let tb = doc.create_text("b");
        doc.append(root, a);
        doc.append(root, b);
        doc.append(a, ta);
        doc.append(b, tb);

        assert_eq!(doc.common_ancestor(ta, tb), Some(root));
        assert_eq!(doc.common_ancestor(ta, a), Some(a));
    }

    #[test]
    fn test_closest() {
        let (mut doc, root) = make_doc();
        let bubble = doc.create_element("span");
        doc.add_class(bubble, "writers-bubble");
        let inner = doc.create_element("span");
        let t = doc.create_text("note");
        doc.append(root, bubble);
        doc.append(bubble, inner);
        doc.append(inner, t);

        let found = doc.closest(t, |d, n| d.has_class(n, "writers-bubble"));
        assert_eq!(found, Some(bubble));
        let none = doc.closest(root, |d, n| d.has_class(n, "writers-bubble"));
        assert_eq!(none, None);
    }
}
