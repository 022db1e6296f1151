//! Image embedding.
//!
//! Images are inserted as placeholder `img` tags and filled in through a
//! picker popup; the popup reports back a url and image id, optionally
//! retargeting every placeholder that shares the old source. Alignment is
//! expressed through the inline style, which is what the stored HTML keeps.

use crate::dom::{Document, NodeId};
use crate::selection::{self, Position};

/// Source newly inserted placeholders point at until the picker fills them.
pub const BLANK_SRC: &str = "/static/storyloom/blank_photo.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
    Center,
    Inline,
}

impl Alignment {
    fn style(self) -> &'static str {
        match self {
            Alignment::Left => "float:left",
            Alignment::Right => "float:right",
            Alignment::Center => "display:block;margin:auto",
            Alignment::Inline => "",
        }
    }
}

/// Insert a blank right-floated placeholder at the caret.
pub fn insert_image(doc: &mut Document, at: Position) -> NodeId {
    let img = doc.create_element("img");
    doc.set_attr(img, "style", Alignment::Right.style());
    doc.set_attr(img, "data-id", "");
    doc.set_attr(img, "src", BLANK_SRC);
    selection::insert_node_at(doc, at, img);
    img
}

pub fn align_image(doc: &mut Document, img: NodeId, alignment: Alignment) {
    match alignment {
        Alignment::Inline => doc.remove_attr(img, "style"),
        other => doc.set_attr(img, "style", other.style()),
    }
}

pub fn alignment_of(doc: &Document, img: NodeId) -> Alignment {
    match doc.attr(img, "style") {
        Some(s) if s.contains("float:left") => Alignment::Left,
        Some(s) if s.contains("float:right") => Alignment::Right,
        Some(s) if s.contains("display:block") => Alignment::Center,
        _ => Alignment::Inline,
    }
}

pub fn delete_image(doc: &mut Document, img: NodeId) {
    doc.detach(img);
}

/// Picker popup the embedder should open for the highlighted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub href: String,
    pub width: u32,
    pub height: u32,
}

/// `replacing` when the image already has a source; the picker preselects it.
pub fn popup_request(replacing: bool) -> PopupRequest {
    PopupRequest {
        href: if replacing {
            "new_image/replace".to_string()
        } else {
            "new_image/new".to_string()
        },
        width: 600,
        height: 500,
    }
}

/// Apply the picker's answer. With `change_all`, every image sharing the
/// highlighted image's current source is retargeted, which is how a
/// placeholder used in several spots gets filled in one step. Returns how
/// many images changed.
pub fn apply_popup_result(
    doc: &mut Document,
    highlighted: NodeId,
    url: &str,
    id: &str,
    change_all: bool,
) -> usize {
    if !change_all {
        doc.set_attr(highlighted, "src", url.to_string());
        doc.set_attr(highlighted, "data-id", id.to_string());
        return 1;
    }
    let Some(old_src) = doc.attr(highlighted, "src").map(str::to_owned) else {
        return 0;
    };
    let root = doc.root();
    let targets = doc.query_all(root, |d, n| {
        d.tag(n) == Some("img") && d.attr(n, "src") == Some(old_src.as_str())
    });
    let count = targets.len();
    for img in targets {
        doc.set_attr(img, "src", url.to_string());
        doc.set_attr(img, "data-id", id.to_string());
    }
    count
}
