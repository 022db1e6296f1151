//! Writers-bubble annotations.
//!
//! A writers-bubble is an inline annotation stored in the sheet itself: a
//! non-editable outer span holding the annotated text plus a hidden inner
//! table (the bubble) with the note body, an author stamp, and the controls
//! row. Four kinds exist; they differ in where a selection lands when the
//! bubble is created and in which controls the bubble offers.

use crate::dom::{Document, NodeId};
use crate::selection::{self, DomRange};
use web_time::Instant;

/// Attribute discriminating every piece of loom markup on the wire.
pub const ACTION_ATTR: &str = "data-larp-action";

/// Marker class on an open inner bubble.
pub const OPEN_CLASS: &str = "bubble-open";

/// Hover-to-show delay.
pub const SHOW_DELAY: std::time::Duration = std::time::Duration::from_millis(50);
/// Mouse-out grace period before the bubble hides.
pub const HIDE_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    StNote,
    ToDo,
    Hidden,
    Gender,
}

impl AnnotationKind {
    pub fn class_name(self) -> &'static str {
        match self {
            AnnotationKind::StNote => "stnote",
            AnnotationKind::ToDo => "todo",
            AnnotationKind::Hidden => "hidden",
            AnnotationKind::Gender => "gender",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AnnotationKind::StNote => "Storyteller Note",
            AnnotationKind::ToDo => "To Do",
            AnnotationKind::Hidden => "Hidden Text",
            AnnotationKind::Gender => "Complex Gender Switch",
        }
    }

    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "stnote" => Some(AnnotationKind::StNote),
            "todo" => Some(AnnotationKind::ToDo),
            "hidden" => Some(AnnotationKind::Hidden),
            "gender" => Some(AnnotationKind::Gender),
            _ => None,
        }
    }

    /// Whether a creating selection stays visible in the sheet text.
    fn selection_goes_in_outer(self) -> bool {
        !matches!(self, AnnotationKind::Hidden)
    }

    /// Whether a creating selection is copied into the bubble body.
    fn selection_goes_in_inner(self) -> bool {
        matches!(self, AnnotationKind::Hidden | AnnotationKind::Gender)
    }
}

/// Kind of an existing bubble, read off the outer span.
pub fn kind_of(doc: &Document, outer: NodeId) -> Option<AnnotationKind> {
    doc.attr(outer, ACTION_ATTR).and_then(AnnotationKind::from_class)
}

/// Author stamp for new bubbles, matching the stored footer row format.
pub fn date_stamp() -> String {
    chrono::Local::now().format("%a %b %d %Y").to_string()
}

/// Create a writers-bubble over the selection and splice it into the tree,
/// padded by non-breaking spaces. Refused (no mutation) when the selection
/// crosses a bubble boundary. Returns the outer span.
pub fn create_writers_bubble(
    doc: &mut Document,
    range: &DomRange,
    kind: AnnotationKind,
    username: &str,
    date: &str,
) -> Option<NodeId> {
    let cross = |pos: &crate::selection::Position| {
        doc.closest(pos.node, |d, n| d.has_class(n, "writers-bubble"))
    };
    if cross(&range.start) != cross(&range.end) {
        tracing::debug!("bubble creation refused, selection crosses an annotation boundary");
        return None;
    }

    let extracted = selection::extract_contents(doc, range);
    let has_selection = !extracted.nodes.is_empty();

    // Outer-visible text: the selection (or clones of it) or the kind title.
    let outer_nodes: Vec<NodeId>;
    let inner_nodes: Vec<NodeId>;
    match (kind.selection_goes_in_outer(), kind.selection_goes_in_inner()) {
        (true, true) if has_selection => {
            let clones = extracted
                .nodes
                .iter()
                .map(|n| doc.clone_subtree(*n))
                .collect();
            outer_nodes = extracted.nodes;
            inner_nodes = clones;
        }
        (true, _) if has_selection => {
            outer_nodes = extracted.nodes;
            inner_nodes = Vec::new();
        }
        (_, true) if has_selection => {
            outer_nodes = Vec::new();
            inner_nodes = extracted.nodes;
        }
        _ => {
            outer_nodes = Vec::new();
            inner_nodes = Vec::new();
        }
    }

    let outer = doc.create_element("span");
    doc.set_attr(outer, ACTION_ATTR, kind.class_name());
    doc.set_attr(outer, "class", format!("writers-bubble {}", kind.class_name()));
    doc.set_editable(outer, false);

    let outer_text = doc.create_element("span");
    doc.set_editable(outer_text, true);
    if outer_nodes.is_empty() {
        let t = doc.create_text(kind.title().to_string());
        doc.append(outer_text, t);
    } else {
        for n in outer_nodes {
            doc.append(outer_text, n);
        }
    }
    doc.append(outer, outer_text);

    let inner = build_inner(doc, kind, inner_nodes, username, date);
    doc.append(outer, inner);

    let pad_before = doc.create_text("\u{a0}");
    let pad_after = doc.create_text("\u{a0}");
    selection::insert_nodes_at(doc, extracted.at, vec![pad_before, outer, pad_after]);
    Some(outer)
}

fn build_inner(
    doc: &mut Document,
    kind: AnnotationKind,
    content: Vec<NodeId>,
    username: &str,
    date: &str,
) -> NodeId {
    let inner = doc.create_element("span");
    doc.set_attr(inner, ACTION_ATTR, "writers-bubble-inner");
    doc.set_attr(inner, "class", "writers-bubble-inner");

    let table = doc.create_element("table");
    doc.set_attr(table, "class", format!("{} triangle-pointer", kind.class_name()));
    // The gender bubble body is only editable through its alt-gender span.
    doc.set_editable(table, kind != AnnotationKind::Gender);

    let header = doc.create_element("tr");
    let title_cell = doc.create_element("th");
    doc.set_attr(title_cell, "colspan", "2");
    let title = doc.create_text(kind.title().to_string());
    doc.append(title_cell, title);
    doc.append(header, title_cell);
    let button_cell = doc.create_element("th");
    doc.set_attr(button_cell, "class", "button-cell");
    doc.set_attr(button_cell, "style", "text-align:right");
    doc.append(header, button_cell);
    doc.append(table, header);

    let body = doc.create_element("tr");
    let content_cell = doc.create_element("td");
    doc.set_attr(content_cell, "colspan", "3");
    doc.set_attr(content_cell, "class", "writers-bubble-content");
    let content_target = if kind == AnnotationKind::Gender {
        let editable = doc.create_element("span");
        doc.set_attr(editable, ACTION_ATTR, "alt-gender");
        doc.set_editable(editable, true);
        doc.append(content_cell, editable);
        editable
    } else {
        content_cell
    };
    if content.is_empty() {
        let t = doc.create_text(format!("I am a new {}", kind.title()));
        doc.append(content_target, t);
    } else {
        for n in content {
            doc.append(content_target, n);
        }
    }
    doc.append(body, content_cell);
    doc.append(table, body);

    let footer = doc.create_element("tr");
    let author = doc.create_element("th");
    let author_text = doc.create_text(username.to_string());
    doc.append(author, author_text);
    doc.append(footer, author);
    let spacer = doc.create_element("th");
    doc.set_attr(spacer, "width", "40");
    doc.append(footer, spacer);
    let when = doc.create_element("th");
    doc.set_attr(when, "style", "text-align:right");
    let when_text = doc.create_text(date.to_string());
    doc.append(when, when_text);
    doc.append(footer, when);
    doc.append(table, footer);

    doc.append(inner, table);
    inner
}

/// The inner bubble span of an outer annotation span.
pub fn inner_of(doc: &Document, outer: NodeId) -> Option<NodeId> {
    doc.children(outer)
        .iter()
        .copied()
        .find(|n| doc.attr(*n, ACTION_ATTR) == Some("writers-bubble-inner"))
}

/// The editable outer-text span of an annotation.
pub fn outer_text_of(doc: &Document, outer: NodeId) -> Option<NodeId> {
    doc.children(outer)
        .iter()
        .copied()
        .find(|n| doc.editable_attr_is(*n, true))
}

/// Delete an annotation, keeping its visible sheet text in place.
pub fn delete_bubble(doc: &mut Document, outer: NodeId) {
    if let Some(inner) = inner_of(doc, outer) {
        doc.detach(inner);
    }
    let kept: Vec<NodeId> = match outer_text_of(doc, outer) {
        Some(text_span) => {
            let children = doc.children(text_span).to_vec();
            for c in &children {
                doc.detach(*c);
            }
            children
        }
        None => Vec::new(),
    };
    doc.replace_with(outer, kept);
}

/// Reveal hidden text: the whole annotation is replaced by the bubble body.
pub fn unhide(doc: &mut Document, outer: NodeId) -> bool {
    let Some(inner) = inner_of(doc, outer) else {
        return false;
    };
    let Some(content) = doc.find_descendant(inner, |d, n| d.has_class(n, "writers-bubble-content"))
    else {
        return false;
    };
    let children: Vec<NodeId> = doc.children(content).to_vec();
    for c in &children {
        doc.detach(*c);
    }
    doc.replace_with(outer, children);
    true
}

/// Mark a bubble open and install the edit-mode control in its button cell.
pub fn show_inner(doc: &mut Document, outer: NodeId, edit_mode: bool) {
    let Some(inner) = inner_of(doc, outer) else {
        return;
    };
    doc.add_class(inner, OPEN_CLASS);
    if !edit_mode {
        return;
    }
    let Some(cell) = doc.find_descendant(inner, |d, n| d.has_class(n, "button-cell")) else {
        return;
    };
    if doc.child_count(cell) > 0 {
        return;
    }
    let control = doc.create_element("span");
    let class = match kind_of(doc, outer) {
        Some(AnnotationKind::Hidden) => "bubble-unhide",
        _ => "bubble-delete",
    };
    doc.set_attr(control, "class", class);
    doc.append(cell, control);
}

/// Close a bubble and drop its control.
pub fn hide_inner(doc: &mut Document, outer: NodeId) {
    let Some(inner) = inner_of(doc, outer) else {
        return;
    };
    doc.remove_class(inner, OPEN_CLASS);
    if let Some(cell) = doc.find_descendant(inner, |d, n| d.has_class(n, "button-cell")) {
        let children = doc.children(cell).to_vec();
        for c in children {
            doc.detach(c);
        }
    }
}

pub fn is_open(doc: &Document, outer: NodeId) -> bool {
    inner_of(doc, outer)
        .map(|inner| doc.has_class(inner, OPEN_CLASS))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverAction {
    Show,
    Hide,
}

#[derive(Debug)]
struct PendingHover {
    bubble: NodeId,
    action: HoverAction,
    due: Instant,
}

/// Deferred show/hide of bubbles under the mouse. At most one pending entry
/// exists per bubble; scheduling replaces it, so a quick leave-and-return
/// cancels the hide instead of racing it.
#[derive(Debug, Default)]
pub struct HoverScheduler {
    pending: Vec<PendingHover>,
}

impl HoverScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, bubble: NodeId, action: HoverAction, now: Instant) {
        self.pending.retain(|p| p.bubble != bubble);
        let delay = match action {
            HoverAction::Show => SHOW_DELAY,
            HoverAction::Hide => HIDE_DELAY,
        };
        self.pending.push(PendingHover {
            bubble,
            action,
            due: now + delay,
        });
    }

    pub fn cancel(&mut self, bubble: NodeId) {
        self.pending.retain(|p| p.bubble != bubble);
    }

    pub fn is_pending(&self, bubble: NodeId) -> bool {
        self.pending.iter().any(|p| p.bubble == bubble)
    }

    /// Entries whose delay has elapsed, in scheduling order.
    pub fn take_due(&mut self, now: Instant) -> Vec<(NodeId, HoverAction)> {
        let mut due = Vec::new();
        self.pending.retain(|p| {
            if p.due <= now {
                due.push((p.bubble, p.action));
                false
            } else {
                true
            }
        });
        due
    }
}

/// Mouse moved onto an annotation. Ignored while some bubble body is being
/// actively edited; re-entering an open bubble cancels its pending hide.
pub fn hover_enter(
    doc: &Document,
    sched: &mut HoverScheduler,
    outer: NodeId,
    editing_active: bool,
    now: Instant,
) {
    if editing_active {
        return;
    }
    if is_open(doc, outer) {
        sched.cancel(outer);
        return;
    }
    sched.schedule(outer, HoverAction::Show, now);
}

/// Mouse left an annotation.
pub fn hover_leave(sched: &mut HoverScheduler, outer: NodeId, now: Instant) {
    sched.schedule(outer, HoverAction::Hide, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;
    use crate::selection::{DomRange, Position};

    fn stamp() -> &'static str {
        "Mon Aug 24 2026"
    }

    #[test]
    fn test_stnote_keeps_selection_visible() {
        let mut doc = html::parse("the baron arrives at dusk").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 4), Position::new(t, 9));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::StNote, "sasha", stamp())
                .unwrap();

        let outer_text = outer_text_of(&doc, outer).unwrap();
        assert_eq!(doc.text_content(outer_text), "baron");
        assert_eq!(doc.attr(outer, ACTION_ATTR), Some("stnote"));
        assert_eq!(doc.attr(outer, "class"), Some("writers-bubble stnote"));
        assert_eq!(doc.attr(outer, "contenteditable"), Some("false"));
        // sheet text around the annotation is unchanged
        let text = doc.text_content(doc.root());
        assert!(text.starts_with("the \u{a0}baron"));
        assert!(text.ends_with(" arrives at dusk"));
        let inner = inner_of(&doc, outer).unwrap();
        let content = doc
            .find_descendant(inner, |d, n| d.has_class(n, "writers-bubble-content"))
            .unwrap();
        assert_eq!(doc.text_content(content), "I am a new Storyteller Note");
    }

    #[test]
    fn test_empty_selection_gets_default_texts() {
        let mut doc = html::parse("x").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::collapsed(Position::new(t, 1));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::ToDo, "sasha", stamp())
                .unwrap();
        let outer_text = outer_text_of(&doc, outer).unwrap();
        assert_eq!(doc.text_content(outer_text), "To Do");
        let inner = inner_of(&doc, outer).unwrap();
        let content = doc
            .find_descendant(inner, |d, n| d.has_class(n, "writers-bubble-content"))
            .unwrap();
        assert_eq!(doc.text_content(content), "I am a new To Do");
    }

    #[test]
    fn test_hidden_moves_selection_into_bubble() {
        let mut doc = html::parse("public secret public").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 7), Position::new(t, 13));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::Hidden, "sasha", stamp())
                .unwrap();

        let outer_text = outer_text_of(&doc, outer).unwrap();
        assert_eq!(doc.text_content(outer_text), "Hidden Text");
        let inner = inner_of(&doc, outer).unwrap();
        let content = doc
            .find_descendant(inner, |d, n| d.has_class(n, "writers-bubble-content"))
            .unwrap();
        assert_eq!(doc.text_content(content), "secret");
    }

    #[test]
    fn test_gender_bubble_copies_selection_both_places() {
        let mut doc = html::parse("the duchess spoke").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 4), Position::new(t, 11));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::Gender, "sasha", stamp())
                .unwrap();

        let outer_text = outer_text_of(&doc, outer).unwrap();
        assert_eq!(doc.text_content(outer_text), "duchess");
        let inner = inner_of(&doc, outer).unwrap();
        let table = doc.children(inner)[0];
        assert_eq!(doc.attr(table, "contenteditable"), Some("false"));
        let editable = doc
            .find_descendant(inner, |d, n| {
                d.attr(n, ACTION_ATTR) == Some("alt-gender")
            })
            .unwrap();
        assert_eq!(doc.text_content(editable), "duchess");
    }

    #[test]
    fn test_creation_refused_across_bubble_boundary() {
        let mut doc = html::parse(concat!(
            "before ",
            r#"<span class="writers-bubble stnote"><span contenteditable="true">note</span></span>"#,
        ))
        .unwrap();
        let root = doc.root();
        let t_out = doc.children(root)[0];
        let bubble = doc.children(root)[1];
        let t_in = doc.children(doc.children(bubble)[0])[0];
        let before = html::serialize(&doc);

        let range = DomRange::new(Position::new(t_out, 2), Position::new(t_in, 2));
        let made =
            create_writers_bubble(&mut doc, &range, AnnotationKind::StNote, "sasha", stamp());
        assert!(made.is_none());
        assert_eq!(html::serialize(&doc), before);
    }

    #[test]
    fn test_nbsp_padding_around_bubble() {
        let mut doc = html::parse("ab").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 0), Position::new(t, 1));
        create_writers_bubble(&mut doc, &range, AnnotationKind::StNote, "s", stamp()).unwrap();
        let wire = html::serialize(&doc);
        assert!(wire.starts_with("&nbsp;<span"));
        assert!(wire.contains("</span>&nbsp;b"));
    }

    #[test]
    fn test_delete_keeps_outer_text() {
        let mut doc = html::parse("keep this part safe").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 5), Position::new(t, 9));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::StNote, "sasha", stamp())
                .unwrap();
        delete_bubble(&mut doc, outer);
        assert_eq!(
            doc.text_content(doc.root()).replace('\u{a0}', " "),
            "keep  this  part safe"
        );
        assert!(!html::serialize(&doc).contains("writers-bubble"));
    }

    #[test]
    fn test_unhide_restores_hidden_text() {
        let mut doc = html::parse("a secret b").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 2), Position::new(t, 8));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::Hidden, "sasha", stamp())
                .unwrap();
        assert!(unhide(&mut doc, outer));
        assert_eq!(doc.text_content(doc.root()).replace('\u{a0}', ""), "a secret b");
        assert!(!html::serialize(&doc).contains("writers-bubble"));
    }

    #[test]
    fn test_show_and_hide_inner_controls() {
        let mut doc = html::parse("x y z").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 2), Position::new(t, 3));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::Hidden, "s", stamp()).unwrap();

        show_inner(&mut doc, outer, true);
        assert!(is_open(&doc, outer));
        let cell = doc
            .find_descendant(outer, |d, n| d.has_class(n, "button-cell"))
            .unwrap();
        assert!(doc.has_class(doc.children(cell)[0], "bubble-unhide"));

        hide_inner(&mut doc, outer);
        assert!(!is_open(&doc, outer));
        assert_eq!(doc.child_count(cell), 0);
    }

    #[test]
    fn test_hover_schedule_replaces_and_fires() {
        let mut doc = html::parse("w").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 0), Position::new(t, 1));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::StNote, "s", stamp()).unwrap();

        let mut sched = HoverScheduler::new();
        let t0 = Instant::now();
        hover_enter(&doc, &mut sched, outer, false, t0);
        assert!(sched.is_pending(outer));
        // leaving before the show fires replaces it with a hide
        hover_leave(&mut sched, outer, t0);
        let due = sched.take_due(t0 + HIDE_DELAY);
        assert_eq!(due, vec![(outer, HoverAction::Hide)]);
        assert!(!sched.is_pending(outer));
    }

    #[test]
    fn test_hover_ignored_while_editing() {
        let mut doc = html::parse("w").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 0), Position::new(t, 1));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::StNote, "s", stamp()).unwrap();

        let mut sched = HoverScheduler::new();
        hover_enter(&doc, &mut sched, outer, true, Instant::now());
        assert!(!sched.is_pending(outer));
    }

    #[test]
    fn test_reenter_open_bubble_cancels_hide() {
        let mut doc = html::parse("w").unwrap();
        let t = doc.children(doc.root())[0];
        let range = DomRange::new(Position::new(t, 0), Position::new(t, 1));
        let outer =
            create_writers_bubble(&mut doc, &range, AnnotationKind::StNote, "s", stamp()).unwrap();
        show_inner(&mut doc, outer, false);

        let mut sched = HoverScheduler::new();
        let t0 = Instant::now();
        hover_leave(&mut sched, outer, t0);
        hover_enter(&doc, &mut sched, outer, false, t0);
        assert!(sched.take_due(t0 + HIDE_DELAY).is_empty());
    }
}
