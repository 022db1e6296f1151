//! Floating toolbar state.
//!
//! One toolbar bubble exists at a time, anchored above the current selection
//! or a highlighted image. The session owns the single instance; this module
//! holds the pure pieces: which formats are active at the caret, the
//! geometry math that places the bubble, and the state backing the gender
//! fix panel.

use crate::dom::{Document, NodeId};
use crate::gender::{self, CharacterRoster, Gender, SpanState};
use smol_str::SmolStr;

/// Gap between the selection box and the bubble's bottom edge.
const ANCHOR_GAP: f64 = 8.0;

/// Formats the toolbar can mark active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Bold,
    Italic,
    Underline,
    H1,
    H2,
    H3,
    OrderedList,
    UnorderedList,
    ListItem,
    Anchor,
}

impl FormatTag {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "b" => FormatTag::Bold,
            "i" => FormatTag::Italic,
            "u" => FormatTag::Underline,
            "h1" => FormatTag::H1,
            "h2" => FormatTag::H2,
            "h3" => FormatTag::H3,
            "ol" => FormatTag::OrderedList,
            "ul" => FormatTag::UnorderedList,
            "li" => FormatTag::ListItem,
            "a" => FormatTag::Anchor,
            _ => return None,
        })
    }

    pub fn tag(self) -> &'static str {
        match self {
            FormatTag::Bold => "b",
            FormatTag::Italic => "i",
            FormatTag::Underline => "u",
            FormatTag::H1 => "h1",
            FormatTag::H2 => "h2",
            FormatTag::H3 => "h3",
            FormatTag::OrderedList => "ol",
            FormatTag::UnorderedList => "ul",
            FormatTag::ListItem => "li",
            FormatTag::Anchor => "a",
        }
    }
}

/// Formats wrapping the focus node. The walk climbs only through text runs
/// and recognized format elements; the first foreign element stops it, so a
/// bold run inside an annotation reports bold but not the annotation's own
/// wrappers.
pub fn active_formats(doc: &Document, node: NodeId) -> Vec<FormatTag> {
    let mut out = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        if doc.is_text(n) {
            current = doc.parent(n);
            continue;
        }
        match doc.tag(n).and_then(FormatTag::from_tag) {
            Some(tag) => {
                out.push(tag);
                current = doc.parent(n);
            }
            None => break,
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }
}

/// Viewport facts the placement math needs from the embedder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub scroll_top: f64,
    /// Offset of the positioning parent in page coordinates.
    pub parent_offset: (f64, f64),
}

/// Place a bubble of the given size above a target rect, centered on it and
/// clamped so it never leaves the viewport horizontally.
pub fn position_above(target: Rect, size: (f64, f64), vp: Viewport) -> (f64, f64) {
    let (width, height) = size;
    let (px, py) = vp.parent_offset;
    let ideal_x = target.center_x() - width / 2.0 - px;
    let min_x = -px;
    let max_x = vp.width - width - px;
    let x = ideal_x.clamp(min_x, max_x.max(min_x));
    let y = target.y - height - ANCHOR_GAP + vp.scroll_top - py;
    (x, y)
}

/// Which face the bubble is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubblePanel {
    Formatting,
    Gender,
    Image,
}

/// The one toolbar instance. Creating a new one replaces the old; the
/// session enforces that by storing at most one.
#[derive(Debug, Clone)]
pub struct Bubble {
    pub panel: BubblePanel,
    pub active: Vec<FormatTag>,
    pub position: (f64, f64),
    pub gender: Option<GenderPanel>,
}

impl Bubble {
    pub fn formatting(active: Vec<FormatTag>, position: (f64, f64)) -> Self {
        Self {
            panel: BubblePanel::Formatting,
            active,
            position,
            gender: None,
        }
    }

    pub fn image(position: (f64, f64)) -> Self {
        Self {
            panel: BubblePanel::Image,
            active: Vec::new(),
            position,
            gender: None,
        }
    }

    pub fn gender(panel: GenderPanel, position: (f64, f64)) -> Self {
        Self {
            panel: BubblePanel::Gender,
            active: Vec::new(),
            position,
            gender: Some(panel),
        }
    }
}

/// State behind the gender face of the bubble: the character dropdown, the
/// pronoun dropdown (with its unselected placeholder), the reverse checkbox
/// and the clear-dialog affordances.
#[derive(Debug, Clone)]
pub struct GenderPanel {
    pub span: NodeId,
    /// Character ids offered, roster order, allow-list applied.
    pub character_choices: Vec<SmolStr>,
    pub selected_character: Option<SmolStr>,
    /// (keyword id, alternative word) options; empty on resolved spans.
    pub pronoun_options: Vec<(SmolStr, String)>,
    /// None renders the "???" placeholder that blocks submission.
    pub selected_keyword: Option<SmolStr>,
    /// The word as currently displayed in the sheet.
    pub current_word: String,
    pub reversed: bool,
    /// Resolved spans offer CLEAR and STATIC instead of the fix form.
    pub resolved: bool,
}

impl GenderPanel {
    /// Build the panel for a switch span, broken or resolved.
    pub fn for_span(doc: &Document, span: NodeId, roster: &CharacterRoster) -> Option<Self> {
        let state = gender::span_state(doc, span)?;
        let resolved = match state {
            SpanState::Switch | SpanState::Static => true,
            SpanState::Broken | SpanState::TemporaryIgnore => false,
            SpanState::AltGender | SpanState::AltPossibility => return None,
        };
        let allow: Option<Vec<SmolStr>> = doc.attr(span, "data-names").map(|raw| {
            gender::parse_names_attr(raw)
                .into_iter()
                .map(|(character, _)| character)
                .collect()
        });
        let reversed = doc.attr(span, "data-gender-reversed") == Some("true");
        // Only characters who would actually read as this word are offered;
        // the reverse checkbox flips who that is.
        let offered_gender = doc
            .attr(span, "data-default-gender")
            .and_then(Gender::parse)
            .map(|g| if reversed { g.opposite() } else { g });
        let character_choices = roster
            .choices(offered_gender, allow.as_deref())
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        let pronoun_options = gender::alt_possibilities(doc, span);
        let selected_keyword = doc.attr(span, "data-keyword").map(SmolStr::new).or_else(|| {
            match pronoun_options.as_slice() {
                [(kw, _)] => Some(kw.clone()),
                _ => None,
            }
        });
        Some(Self {
            span,
            character_choices,
            selected_character: doc.attr(span, "data-character").map(SmolStr::new),
            pronoun_options,
            selected_keyword,
            current_word: gender::current_word(doc, span),
            reversed,
            resolved,
        })
    }

    /// Whether the submit affordance is enabled. The placeholder pronoun is
    /// the one hard gate; everything else is recoverable later.
    pub fn can_submit(&self) -> bool {
        self.selected_keyword.is_some() || self.pronoun_options.len() <= 1
    }

    /// The fix the panel would submit for a picked character.
    pub fn choice_for(&self, character_id: &str) -> gender::FixChoice {
        match character_id {
            "SM" => gender::FixChoice::Static(Gender::M),
            "SF" => gender::FixChoice::Static(Gender::F),
            "IM" => gender::FixChoice::Ignore(Gender::M),
            "IF" => gender::FixChoice::Ignore(Gender::F),
            id => gender::FixChoice::Character {
                id: SmolStr::new(id),
                keyword: self.selected_keyword.clone(),
                reversed: self.reversed,
            },
        }
    }
}
