//! The editor session.
//!
//! [`EditorSession`] owns everything a live editor instance holds: the
//! document tree, the selection, the single toolbar bubble, the hover
//! scheduler, the character roster and keyword table, the undo stack and the
//! raw-HTML shadow used by the mode flip. Embedders feed it keystrokes and
//! commands and render from its state; nothing here touches a real DOM.

use crate::annotation::{self, AnnotationKind, HoverScheduler};
use crate::bubble::{self, Bubble, FormatTag, GenderPanel, Rect, Viewport};
use crate::commands::{self, Command, Key, Modifiers};
use crate::dom::{Document, NodeId};
use crate::error::EditorError;
use crate::gender::{self, Character, CharacterRoster, FixChoice, FixOutcome, GenderedKeyword, KeywordTable};
use crate::html;
use crate::images::{self, PopupRequest};
use crate::selection::{self, DomRange, SavedSelection};
use serde::Deserialize;
use smol_str::SmolStr;
use web_time::Instant;

/// Inline fields (a name box) suppress paragraph breaks; multiline fields
/// (sheet bodies) get them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    Multiline,
    Inline,
}

/// Which face of the editor is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Rendered,
    Raw,
}

fn default_modifiers() -> Vec<SmolStr> {
    commands::DEFAULT_MODIFIERS
        .iter()
        .copied()
        .map(SmolStr::new_static)
        .collect()
}

fn default_mode() -> EditorMode {
    EditorMode::Multiline
}

fn default_edit_mode() -> bool {
    true
}

/// Per-field configuration, deserializable from the embedding page's JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorOptions {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    /// Empty means the built-in pronoun table.
    #[serde(default)]
    pub keywords: Vec<GenderedKeyword>,
    #[serde(default = "default_modifiers")]
    pub modifiers: Vec<SmolStr>,
    #[serde(default = "default_mode")]
    pub mode: EditorMode,
    #[serde(default)]
    pub auto_focus: bool,
    #[serde(default)]
    pub has_control_panel: bool,
    /// Readers get bubbles without delete or unhide controls.
    #[serde(default = "default_edit_mode")]
    pub edit_mode: bool,
    #[serde(default)]
    pub is_mac: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            username: String::new(),
            characters: Vec::new(),
            keywords: Vec::new(),
            modifiers: default_modifiers(),
            mode: default_mode(),
            auto_focus: false,
            has_control_panel: false,
            edit_mode: true,
            is_mac: false,
        }
    }
}

/// What the embedder must do after a command ran.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Done,
    /// Nothing happened (no selection, rejected wrap, unknown state).
    Ignored,
    /// Open the image picker popup and report back through
    /// [`EditorSession::apply_image_popup`].
    OpenPopup(PopupRequest),
    /// Serialize and submit; the shadow field is current.
    SaveRequested,
    ScrollToTop,
}

const MAX_UNDO_STEPS: usize = 64;

/// Bounded undo over serialized document snapshots. Tree edits are
/// structural, so whole-document snapshots are the reliable unit here.
#[derive(Debug, Default)]
struct UndoStack {
    undo: Vec<String>,
    redo: Vec<String>,
}

impl UndoStack {
    /// Push a pre-command snapshot. Returns whether an entry was added;
    /// the redo stack is untouched until [`UndoStack::commit`], so a
    /// command that turns out to be a no-op costs nothing.
    fn record(&mut self, snapshot: String) -> bool {
        if self.undo.last() == Some(&snapshot) {
            return false;
        }
        self.undo.push(snapshot);
        if self.undo.len() > MAX_UNDO_STEPS {
            self.undo.remove(0);
        }
        true
    }

    /// The command mutated the document; forward history is now stale.
    fn commit(&mut self) {
        self.redo.clear();
    }

    /// The command did nothing; drop the snapshot if one was recorded.
    fn rollback(&mut self, recorded: bool) {
        if recorded {
            self.undo.pop();
        }
    }

    fn undo(&mut self, current: String) -> Option<String> {
        let prev = self.undo.pop()?;
        self.redo.push(current);
        Some(prev)
    }

    fn redo(&mut self, current: String) -> Option<String> {
        let next = self.redo.pop()?;
        self.undo.push(current);
        Some(next)
    }
}

pub struct EditorSession {
    doc: Document,
    options: EditorOptions,
    roster: CharacterRoster,
    keywords: KeywordTable,
    selection: Option<DomRange>,
    saved_selection: Option<SavedSelection>,
    bubble: Option<Bubble>,
    hover: HoverScheduler,
    highlighted_image: Option<NodeId>,
    view: ViewState,
    shadow: String,
    undo: UndoStack,
    /// Whether the "fix next" affordance is visible.
    fix_affordance: bool,
}

impl EditorSession {
    pub fn new(initial_html: &str, options: EditorOptions) -> Result<Self, EditorError> {
        let doc = html::parse(initial_html)?;
        let roster = CharacterRoster::with_specials(options.characters.clone());
        let keywords = if options.keywords.is_empty() {
            KeywordTable::pronouns()
        } else {
            KeywordTable::new(options.keywords.clone())
        };
        let fix_affordance = gender::next_broken(&doc, doc.root()).is_some();
        Ok(Self {
            doc,
            options,
            roster,
            keywords,
            selection: None,
            saved_selection: None,
            bubble: None,
            hover: HoverScheduler::new(),
            highlighted_image: None,
            view: ViewState::Rendered,
            shadow: String::new(),
            undo: UndoStack::default(),
            fix_affordance,
        })
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub fn roster(&self) -> &CharacterRoster {
        &self.roster
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn fix_affordance_visible(&self) -> bool {
        self.fix_affordance
    }

    /// Current content on the wire: the raw shadow while flipped, the
    /// serialized tree otherwise.
    pub fn content(&self) -> String {
        match self.view {
            ViewState::Rendered => html::serialize(&self.doc),
            ViewState::Raw => self.shadow.clone(),
        }
    }

    // === Selection ===

    pub fn set_selection(&mut self, range: DomRange) {
        self.selection = Some(range);
    }

    pub fn selection(&self) -> Option<&DomRange> {
        self.selection.as_ref()
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Stash the selection before a popup or flip steals focus.
    pub fn save_selection(&mut self) {
        self.saved_selection = self.selection.map(SavedSelection);
    }

    pub fn restore_selection(&mut self) {
        if let Some(SavedSelection(range)) = self.saved_selection.take() {
            self.selection = Some(range);
        }
    }

    pub fn selected_text(&self) -> String {
        self.selection
            .as_ref()
            .map(|r| selection::selected_text(&self.doc, r))
            .unwrap_or_default()
    }

    // === Bubble ===

    pub fn bubble(&self) -> Option<&Bubble> {
        self.bubble.as_ref()
    }

    /// Show the formatting bubble above the selection rect. Any previous
    /// bubble of any face is replaced; there is only ever one.
    pub fn show_bubble(&mut self, target: Rect, size: (f64, f64), vp: Viewport) {
        let active = self
            .selection
            .as_ref()
            .map(|r| bubble::active_formats(&self.doc, r.end.node))
            .unwrap_or_default();
        let position = bubble::position_above(target, size, vp);
        self.clear_active_marks();
        if let Some(range) = self.selection {
            self.mark_active_region(range.start.node);
        }
        self.bubble = Some(Bubble::formatting(active, position));
    }

    /// Annotations containing the toolbar's anchor stay styled open while
    /// the toolbar is up.
    fn mark_active_region(&mut self, node: NodeId) {
        if let Some(outer) = self
            .doc
            .closest(node, |d, n| d.has_class(n, "writers-bubble"))
        {
            self.doc.add_class(outer, "has-active-bubble");
        }
    }

    fn clear_active_marks(&mut self) {
        let root = self.doc.root();
        let marked = self
            .doc
            .query_all(root, |d, n| d.has_class(n, "has-active-bubble"));
        for n in marked {
            self.doc.remove_class(n, "has-active-bubble");
        }
    }

    /// Show image alignment controls for a clicked image.
    pub fn show_image_bubble(&mut self, img: NodeId, target: Rect, size: (f64, f64), vp: Viewport) {
        self.highlighted_image = Some(img);
        let position = bubble::position_above(target, size, vp);
        self.bubble = Some(Bubble::image(position));
    }

    /// Show the gender fix panel for a switch span.
    pub fn show_gender_fix(&mut self, span: NodeId, target: Rect, size: (f64, f64), vp: Viewport) -> bool {
        let Some(panel) = GenderPanel::for_span(&self.doc, span, &self.roster) else {
            return false;
        };
        let position = bubble::position_above(target, size, vp);
        self.clear_active_marks();
        self.mark_active_region(span);
        self.bubble = Some(Bubble::gender(panel, position));
        true
    }

    pub fn clear_bubble(&mut self) {
        self.bubble = None;
        self.highlighted_image = None;
        self.clear_active_marks();
    }

    // === Hover ===

    pub fn hover_enter(&mut self, outer: NodeId, now: Instant) {
        let editing = self.bubble.is_some();
        annotation::hover_enter(&self.doc, &mut self.hover, outer, editing, now);
    }

    pub fn hover_leave(&mut self, outer: NodeId, now: Instant) {
        annotation::hover_leave(&mut self.hover, outer, now);
    }

    /// Fire due hover timers, opening and closing bubbles.
    pub fn tick(&mut self, now: Instant) {
        let edit_mode = self.options.edit_mode;
        for (outer, action) in self.hover.take_due(now) {
            match action {
                annotation::HoverAction::Show => annotation::show_inner(&mut self.doc, outer, edit_mode),
                annotation::HoverAction::Hide => annotation::hide_inner(&mut self.doc, outer),
            }
        }
    }

    // === Keys and commands ===

    /// Feed a keystroke; runs the bound command if there is one.
    pub fn handle_key(&mut self, key: &Key, mods: &Modifiers) -> Option<CommandOutcome> {
        let raw = self.view == ViewState::Raw;
        if let Some(cmd) = commands::lookup(key, mods, self.options.is_mac, raw) {
            return Some(self.run_command(cmd));
        }
        if *key == Key::Enter && !raw && !mods.primary(self.options.is_mac) {
            return Some(self.insert_line_break());
        }
        None
    }

    pub fn run_command(&mut self, cmd: Command) -> CommandOutcome {
        if self.view == ViewState::Raw && cmd != Command::Flip {
            return CommandOutcome::Ignored;
        }
        let recorded = cmd.is_mutating() && self.undo.record(html::serialize(&self.doc));
        let outcome = match cmd {
            Command::Bold => self.toggle_format(FormatTag::Bold),
            Command::Italic => self.toggle_format(FormatTag::Italic),
            Command::Underline => self.toggle_format(FormatTag::Underline),
            Command::H1 => self.toggle_format(FormatTag::H1),
            Command::H2 => self.toggle_format(FormatTag::H2),
            Command::H3 => self.toggle_format(FormatTag::H3),
            Command::RemoveFormat => self.remove_format(),
            Command::StNote => self.create_annotation(AnnotationKind::StNote),
            Command::ToDo => self.create_annotation(AnnotationKind::ToDo),
            Command::Hidden => self.create_annotation(AnnotationKind::Hidden),
            Command::Gender => self.create_annotation(AnnotationKind::Gender),
            Command::Image => self.insert_image(),
            Command::SectionBreak => self.insert_markup("<br><br><center>* * *</center><br>"),
            Command::PageBreak => self.insert_markup(r#"<div class="pagebreak"></div>"#),
            Command::Dash => self.insert_markup("\u{2014}"),
            Command::Flip => {
                self.flip();
                CommandOutcome::Done
            }
            Command::Undo => {
                if self.apply_undo() {
                    CommandOutcome::Done
                } else {
                    CommandOutcome::Ignored
                }
            }
            Command::Save => {
                self.sync_for_submit();
                CommandOutcome::SaveRequested
            }
            Command::ScrollToTop => CommandOutcome::ScrollToTop,
        };
        if cmd.is_mutating() {
            if outcome == CommandOutcome::Ignored {
                self.undo.rollback(recorded);
            } else {
                self.undo.commit();
            }
        }
        outcome
    }

    fn toggle_format(&mut self, tag: FormatTag) -> CommandOutcome {
        let Some(range) = self.selection else {
            return CommandOutcome::Ignored;
        };
        // Active format at the caret means toggle off: unwrap the ancestor.
        let wrapper = self
            .doc
            .closest(range.start.node, |d, n| d.tag(n) == Some(tag.tag()));
        if let Some(wrapper) = wrapper {
            self.doc.unwrap_node(wrapper);
            self.selection = None;
            return CommandOutcome::Done;
        }
        let element = self.doc.create_element(tag.tag());
        match selection::wrap_selection(&mut self.doc, &range, element) {
            Some(_) => {
                self.selection = None;
                CommandOutcome::Done
            }
            None => CommandOutcome::Ignored,
        }
    }

    fn remove_format(&mut self) -> CommandOutcome {
        let Some(range) = self.selection else {
            return CommandOutcome::Ignored;
        };
        // Extracting into a scratch wrapper splits partially-covered runs
        // for free; then every format element inside it gets unwrapped.
        let scratch = self.doc.create_element("span");
        if selection::wrap_selection(&mut self.doc, &range, scratch).is_none() {
            return CommandOutcome::Ignored;
        }
        loop {
            let formatted = self.doc.find_descendant(scratch, |d, n| {
                d.tag(n).and_then(FormatTag::from_tag).is_some()
            });
            match formatted {
                Some(n) => self.doc.unwrap_node(n),
                None => break,
            }
        }
        self.doc.unwrap_node(scratch);
        self.selection = None;
        CommandOutcome::Done
    }

    fn create_annotation(&mut self, kind: AnnotationKind) -> CommandOutcome {
        let Some(range) = self.selection else {
            return CommandOutcome::Ignored;
        };
        let date = annotation::date_stamp();
        let made = annotation::create_writers_bubble(
            &mut self.doc,
            &range,
            kind,
            &self.options.username,
            &date,
        );
        match made {
            Some(_) => {
                self.selection = None;
                CommandOutcome::Done
            }
            None => CommandOutcome::Ignored,
        }
    }

    fn insert_image(&mut self) -> CommandOutcome {
        let Some(range) = self.selection else {
            return CommandOutcome::Ignored;
        };
        let img = images::insert_image(&mut self.doc, range.start);
        self.highlighted_image = Some(img);
        self.selection = None;
        CommandOutcome::Done
    }

    fn insert_markup(&mut self, markup: &str) -> CommandOutcome {
        let Some(range) = self.selection else {
            return CommandOutcome::Ignored;
        };
        let collapsed = selection::extract_contents(&mut self.doc, &range);
        let mut scratch = Document::new("div");
        let scratch_root = scratch.root();
        if html::parse_into(&mut scratch, scratch_root, markup).is_err() {
            return CommandOutcome::Ignored;
        }
        // Re-create the parsed nodes inside the session document.
        let mut nodes = Vec::new();
        for child in scratch.children(scratch.root()).to_vec() {
            nodes.push(import_subtree(&scratch, child, &mut self.doc));
        }
        selection::insert_nodes_at(&mut self.doc, collapsed.at, nodes);
        self.selection = None;
        CommandOutcome::Done
    }

    /// Enter key: paragraph break in multiline fields, suppressed inline.
    pub fn insert_line_break(&mut self) -> CommandOutcome {
        if self.options.mode == EditorMode::Inline {
            return CommandOutcome::Ignored;
        }
        let recorded = self.undo.record(html::serialize(&self.doc));
        let outcome = self.insert_markup("<br><br>");
        if outcome == CommandOutcome::Ignored {
            self.undo.rollback(recorded);
        } else {
            self.undo.commit();
        }
        outcome
    }

    /// Insert arbitrary markup at the selection (paste path).
    pub fn insert_html(&mut self, markup: &str) -> CommandOutcome {
        let recorded = self.undo.record(html::serialize(&self.doc));
        let outcome = self.insert_markup(markup);
        if outcome == CommandOutcome::Ignored {
            self.undo.rollback(recorded);
        } else {
            self.undo.commit();
        }
        outcome
    }

    fn apply_undo(&mut self) -> bool {
        let current = html::serialize(&self.doc);
        let Some(snapshot) = self.undo.undo(current) else {
            return false;
        };
        self.replace_doc(&snapshot)
    }

    pub fn apply_redo(&mut self) -> bool {
        let current = html::serialize(&self.doc);
        let Some(snapshot) = self.undo.redo(current) else {
            return false;
        };
        self.replace_doc(&snapshot)
    }

    fn replace_doc(&mut self, wire: &str) -> bool {
        match html::parse(wire) {
            Ok(doc) => {
                self.doc = doc;
                self.selection = None;
                self.saved_selection = None;
                self.bubble = None;
                self.highlighted_image = None;
                self.fix_affordance = gender::next_broken(&self.doc, self.doc.root()).is_some();
                true
            }
            Err(err) => {
                tracing::warn!(%err, "snapshot failed to parse back");
                false
            }
        }
    }

    // === Mode flip ===

    /// Toggle between the rendered editor and the raw-HTML textarea.
    pub fn flip(&mut self) {
        match self.view {
            ViewState::Rendered => self.flip_to_raw(),
            ViewState::Raw => {
                if let Err(err) = self.flip_to_editor() {
                    tracing::warn!(%err, "raw HTML did not parse, staying flipped");
                }
            }
        }
    }

    pub fn flip_to_raw(&mut self) {
        self.clear_active_marks();
        self.shadow = html::serialize(&self.doc).trim().to_string();
        self.bubble = None;
        self.highlighted_image = None;
        self.selection = None;
        self.view = ViewState::Raw;
    }

    pub fn flip_to_editor(&mut self) -> Result<(), EditorError> {
        let doc = html::parse(&self.shadow)?;
        self.doc = doc;
        self.view = ViewState::Rendered;
        self.fix_affordance = gender::next_broken(&self.doc, self.doc.root()).is_some();
        Ok(())
    }

    /// The raw textarea contents, editable while flipped.
    pub fn shadow(&self) -> &str {
        &self.shadow
    }

    pub fn set_shadow(&mut self, raw: impl Into<String>) {
        if self.view == ViewState::Raw {
            self.shadow = raw.into();
        }
    }

    /// Prepare the shadow field for form submission: close the bubble,
    /// strip deferred-ignore spans, serialize.
    pub fn sync_for_submit(&mut self) -> &str {
        self.bubble = None;
        self.clear_active_marks();
        if self.view == ViewState::Rendered {
            let root = self.doc.root();
            gender::strip_ignored(&mut self.doc, root);
            self.shadow = html::serialize(&self.doc).trim().to_string();
        }
        &self.shadow
    }

    // === Gender workflow ===

    /// Next broken switch in document order; hides the fix affordance when
    /// none remain.
    pub fn next_fix_gender(&mut self) -> Option<NodeId> {
        let next = gender::next_broken(&self.doc, self.doc.root());
        self.fix_affordance = next.is_some();
        if next.is_none() {
            self.bubble = None;
        }
        next
    }

    pub fn apply_gender_fix(&mut self, span: NodeId, choice: &FixChoice) -> FixOutcome {
        let recorded = self.undo.record(html::serialize(&self.doc));
        let outcome = gender::apply_fix(&mut self.doc, span, choice, &mut self.roster, &self.keywords);
        match outcome {
            FixOutcome::Resolved | FixOutcome::MadeStatic | FixOutcome::Ignored => {
                self.undo.commit();
                self.bubble = None;
            }
            FixOutcome::AmbiguousPronoun | FixOutcome::UnknownCharacter => {
                self.undo.rollback(recorded);
            }
        }
        outcome
    }

    /// Tab in the fix panel: defer the span without reading the form.
    pub fn auto_ignore(&mut self, span: NodeId) -> FixOutcome {
        let gender = gender::span_state(&self.doc, span)
            .and_then(|_| self.doc.attr(span, "data-default-gender"))
            .and_then(gender::Gender::parse)
            .unwrap_or(gender::Gender::M);
        self.apply_gender_fix(span, &FixChoice::Ignore(gender))
    }

    /// CLEAR in the resolved-span dialog: back to plain text.
    pub fn clear_gender_span(&mut self, span: NodeId) {
        self.undo.record(html::serialize(&self.doc));
        self.undo.commit();
        gender::clear_span(&mut self.doc, span);
        self.bubble = None;
    }

    /// STATIC in the resolved-span dialog.
    pub fn make_gender_static(&mut self, span: NodeId) {
        self.undo.record(html::serialize(&self.doc));
        self.undo.commit();
        gender::make_static(&mut self.doc, span);
        self.bubble = None;
    }

    /// Scan prose for new keyword hits; returns how many spans appeared.
    pub fn scan_keywords(&mut self) -> usize {
        let root = self.doc.root();
        let created = gender::mark_unresolved_keywords(&mut self.doc, root, &self.keywords);
        if created > 0 {
            self.fix_affordance = true;
        }
        created
    }

    // === Images ===

    pub fn highlighted_image(&self) -> Option<NodeId> {
        self.highlighted_image
    }

    /// Open the picker for the highlighted image.
    pub fn request_image_popup(&mut self) -> Option<CommandOutcome> {
        let img = self.highlighted_image?;
        let replacing = self.doc.attr(img, "src").is_some_and(|s| s != images::BLANK_SRC);
        self.save_selection();
        Some(CommandOutcome::OpenPopup(images::popup_request(replacing)))
    }

    /// The popup's answer. `change_all` retargets every image sharing the
    /// highlighted one's source.
    pub fn apply_image_popup(&mut self, url: &str, id: &str, change_all: bool) -> usize {
        let Some(img) = self.highlighted_image else {
            return 0;
        };
        self.undo.record(html::serialize(&self.doc));
        self.undo.commit();
        let n = images::apply_popup_result(&mut self.doc, img, url, id, change_all);
        self.restore_selection();
        n
    }

    pub fn align_highlighted_image(&mut self, alignment: images::Alignment) -> CommandOutcome {
        let Some(img) = self.highlighted_image else {
            return CommandOutcome::Ignored;
        };
        self.undo.record(html::serialize(&self.doc));
        self.undo.commit();
        images::align_image(&mut self.doc, img, alignment);
        CommandOutcome::Done
    }

    pub fn delete_highlighted_image(&mut self) -> CommandOutcome {
        let Some(img) = self.highlighted_image.take() else {
            return CommandOutcome::Ignored;
        };
        self.undo.record(html::serialize(&self.doc));
        self.undo.commit();
        images::delete_image(&mut self.doc, img);
        self.bubble = None;
        CommandOutcome::Done
    }

    // === Annotations ===

    pub fn delete_annotation(&mut self, outer: NodeId) {
        self.undo.record(html::serialize(&self.doc));
        self.undo.commit();
        annotation::delete_bubble(&mut self.doc, outer);
        self.bubble = None;
    }

    pub fn unhide_annotation(&mut self, outer: NodeId) -> bool {
        let recorded = self.undo.record(html::serialize(&self.doc));
        let done = annotation::unhide(&mut self.doc, outer);
        if done {
            self.undo.commit();
        } else {
            self.undo.rollback(recorded);
        }
        done
    }
}

/// Copy a subtree from one document into another, returning the detached
/// clone in the target arena.
fn import_subtree(src: &Document, node: NodeId, dst: &mut Document) -> NodeId {
    match src.kind(node) {
        crate::dom::NodeKind::Text(t) => dst.create_text(t.clone()),
        crate::dom::NodeKind::Element(e) => {
            let clone = dst.create_element(e.tag.clone());
            for (name, value) in e.attrs() {
                dst.set_attr(clone, name.clone(), value.to_string());
            }
            for child in src.children(node) {
                let c = import_subtree(src, *child, dst);
                dst.append(clone, c);
            }
            clone
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Position;

    fn make_session(content: &str) -> EditorSession {
        let options = EditorOptions {
            username: "sasha".to_string(),
            characters: vec![
                Character::new("1", "Tamas Kazka", gender::Gender::M),
                Character::new("3", "Anika Yenis", gender::Gender::F),
            ],
            ..EditorOptions::default()
        };
        EditorSession::new(content, options).unwrap()
    }

    fn select_chars(session: &mut EditorSession, from: usize, to: usize) {
        let t = session.doc().children(session.doc().root())[0];
        session.set_selection(DomRange::new(Position::new(t, from), Position::new(t, to)));
    }

    #[test]
    fn test_bold_toggle_roundtrip() {
        let mut session = make_session("plain words here");
        select_chars(&mut session, 6, 11);
        assert_eq!(session.run_command(Command::Bold), CommandOutcome::Done);
        assert_eq!(session.content(), "plain <b>words</b> here");

        // toggle back off from inside the bold run
        let root = session.doc().root();
        let b = session.doc().children(root)[1];
        let inner = session.doc().children(b)[0];
        session.set_selection(DomRange::collapsed(Position::new(inner, 2)));
        assert_eq!(session.run_command(Command::Bold), CommandOutcome::Done);
        assert_eq!(session.content(), "plain words here");
    }

    #[test]
    fn test_heading_toggle() {
        let mut session = make_session("Chapter One");
        select_chars(&mut session, 0, 11);
        session.run_command(Command::H2);
        assert_eq!(session.content(), "<h2>Chapter One</h2>");

        let root = session.doc().root();
        let h2 = session.doc().children(root)[0];
        let t = session.doc().children(h2)[0];
        session.set_selection(DomRange::collapsed(Position::new(t, 0)));
        session.run_command(Command::H2);
        assert_eq!(session.content(), "Chapter One");
    }

    #[test]
    fn test_remove_format_strips_partial_overlap() {
        let mut session = make_session("a<b>bold</b>c");
        let root = session.doc().root();
        let b = session.doc().children(root)[1];
        let bt = session.doc().children(b)[0];
        let tail = session.doc().children(root)[2];
        session.set_selection(DomRange::new(Position::new(bt, 2), Position::new(tail, 1)));
        assert_eq!(session.run_command(Command::RemoveFormat), CommandOutcome::Done);
        assert_eq!(session.content(), "a<b>bo</b>ldc");
    }

    #[test]
    fn test_command_without_selection_is_ignored() {
        let mut session = make_session("text");
        assert_eq!(session.run_command(Command::Bold), CommandOutcome::Ignored);
        assert_eq!(session.run_command(Command::StNote), CommandOutcome::Ignored);
        assert_eq!(session.content(), "text");
    }

    #[test]
    fn test_annotation_command_builds_bubble() {
        let mut session = make_session("watch the baron closely");
        select_chars(&mut session, 10, 15);
        assert_eq!(session.run_command(Command::StNote), CommandOutcome::Done);
        let wire = session.content();
        assert!(wire.contains(r#"data-larp-action="stnote""#));
        assert!(wire.contains("sasha"));
    }

    #[test]
    fn test_section_break_and_dash() {
        let mut session = make_session("ab");
        select_chars(&mut session, 1, 1);
        session.run_command(Command::SectionBreak);
        assert_eq!(session.content(), "a<br><br><center>* * *</center><br>b");

        let mut session = make_session("ab");
        select_chars(&mut session, 1, 1);
        session.run_command(Command::Dash);
        assert_eq!(session.content(), "a\u{2014}b");
    }

    #[test]
    fn test_enter_suppressed_in_inline_mode() {
        let options = EditorOptions {
            mode: EditorMode::Inline,
            ..EditorOptions::default()
        };
        let mut session = EditorSession::new("name", options).unwrap();
        select_chars(&mut session, 2, 2);
        assert_eq!(session.insert_line_break(), CommandOutcome::Ignored);
        assert_eq!(session.content(), "name");

        let mut session = make_session("para");
        select_chars(&mut session, 4, 4);
        assert_eq!(session.insert_line_break(), CommandOutcome::Done);
        assert_eq!(session.content(), "para<br><br>");
    }

    #[test]
    fn test_undo_restores_snapshot() {
        let mut session = make_session("some text");
        select_chars(&mut session, 0, 4);
        session.run_command(Command::Bold);
        assert_eq!(session.content(), "<b>some</b> text");
        assert_eq!(session.run_command(Command::Undo), CommandOutcome::Done);
        assert_eq!(session.content(), "some text");
        assert!(session.apply_redo());
        assert_eq!(session.content(), "<b>some</b> text");
    }

    #[test]
    fn test_ignored_command_leaves_no_undo_entry() {
        let mut session = make_session("text");
        assert_eq!(session.run_command(Command::Bold), CommandOutcome::Ignored);
        assert_eq!(session.run_command(Command::Undo), CommandOutcome::Ignored);
    }

    #[test]
    fn test_ignored_command_keeps_redo_history() {
        let mut session = make_session("some text");
        select_chars(&mut session, 0, 4);
        session.run_command(Command::Bold);
        assert_eq!(session.run_command(Command::Undo), CommandOutcome::Done);
        assert_eq!(session.content(), "some text");

        // selection was reset by the undo, so Bold is a no-op;
        // the redo entry must survive it
        assert_eq!(session.run_command(Command::Bold), CommandOutcome::Ignored);
        assert!(session.apply_redo());
        assert_eq!(session.content(), "<b>some</b> text");
    }

    #[test]
    fn test_flip_roundtrip_preserves_content() {
        let html = r#"pre <b>bold</b><img src="x.png"> post"#;
        let mut session = make_session(html);
        session.run_command(Command::Flip);
        assert_eq!(session.view(), ViewState::Raw);
        assert_eq!(session.shadow(), html);
        session.run_command(Command::Flip);
        assert_eq!(session.view(), ViewState::Rendered);
        assert_eq!(session.content(), html);
    }

    #[test]
    fn test_raw_view_edits_take_effect_on_flip_back() {
        let mut session = make_session("old");
        session.run_command(Command::Flip);
        session.set_shadow("<i>new</i>");
        session.run_command(Command::Flip);
        assert_eq!(session.content(), "<i>new</i>");
    }

    #[test]
    fn test_raw_view_ignores_other_commands() {
        let mut session = make_session("text");
        session.run_command(Command::Flip);
        assert_eq!(session.run_command(Command::Bold), CommandOutcome::Ignored);
    }

    #[test]
    fn test_keystroke_dispatch() {
        let mut session = make_session("words");
        select_chars(&mut session, 0, 5);
        let out = session.handle_key(&Key::char('b'), &Modifiers::CTRL);
        assert_eq!(out, Some(CommandOutcome::Done));
        assert_eq!(session.content(), "<b>words</b>");
        // unbound key
        assert_eq!(session.handle_key(&Key::char('q'), &Modifiers::CTRL), None);
    }

    #[test]
    fn test_image_command_then_popup_change_all() {
        let mut session = make_session("one two");
        select_chars(&mut session, 3, 3);
        session.run_command(Command::Image);
        let img = session.highlighted_image().unwrap();
        assert_eq!(session.doc().attr(img, "src"), Some(images::BLANK_SRC));

        match session.request_image_popup() {
            Some(CommandOutcome::OpenPopup(req)) => assert_eq!(req.href, "new_image/new"),
            other => panic!("expected popup request, got {other:?}"),
        }
        assert_eq!(session.apply_image_popup("portrait.png", "9", false), 1);
        assert_eq!(session.doc().attr(img, "src"), Some("portrait.png"));
    }

    #[test]
    fn test_save_syncs_shadow_and_strips_ignored() {
        let mut session = make_session(concat!(
            "go ",
            r#"<span data-larp-action="temporary-ignore" class="temporary-ignore">her</span>"#,
            " way",
        ));
        let out = session.run_command(Command::Save);
        assert_eq!(out, CommandOutcome::SaveRequested);
        assert_eq!(session.shadow(), "go her way");
    }

    #[test]
    fn test_fix_affordance_follows_broken_spans() {
        let mut session = make_session("he waited");
        assert!(!session.fix_affordance_visible());
        assert_eq!(session.scan_keywords(), 1);
        assert!(session.fix_affordance_visible());

        let span = session.next_fix_gender().unwrap();
        let outcome = session.apply_gender_fix(
            span,
            &FixChoice::Character {
                id: SmolStr::new("1"),
                keyword: Some(SmolStr::new("sub")),
                reversed: false,
            },
        );
        assert_eq!(outcome, FixOutcome::Resolved);
        assert!(session.next_fix_gender().is_none());
        assert!(!session.fix_affordance_visible());
    }

    #[test]
    fn test_toolbar_marks_enclosing_annotation() {
        let mut session = make_session(concat!(
            r#"<span class="writers-bubble stnote">"#,
            r#"<span contenteditable="true">note text</span></span>"#,
        ));
        let root = session.doc().root();
        let outer = session.doc().children(root)[0];
        let inner = session.doc().children(outer)[0];
        let t = session.doc().children(inner)[0];
        session.set_selection(DomRange::new(Position::new(t, 0), Position::new(t, 4)));

        let vp = Viewport {
            width: 800.0,
            scroll_top: 0.0,
            parent_offset: (0.0, 0.0),
        };
        session.show_bubble(Rect::new(0.0, 0.0, 40.0, 12.0), (60.0, 24.0), vp);
        assert!(session.doc().has_class(outer, "has-active-bubble"));
        // the styling mark never reaches the wire
        session.sync_for_submit();
        assert!(!session.shadow().contains("has-active-bubble"));
        session.clear_bubble();
        assert!(!session.doc().has_class(outer, "has-active-bubble"));
    }

    #[test]
    fn test_options_from_page_json() {
        let raw = r#"{
            "username": "sasha",
            "characters": [
                {"id": "1", "name": "Tamas Kazka", "gender": "M"},
                {"id": "3", "name": "Anika Yenis", "gender": "F"}
            ],
            "mode": "inline"
        }"#;
        let options: EditorOptions = serde_json::from_str(raw).unwrap();
        assert_eq!(options.mode, EditorMode::Inline);
        assert_eq!(options.characters.len(), 2);
        assert!(!options.characters[0].special);
        // unconfigured fields fall back to the defaults
        assert!(options.edit_mode);
        assert_eq!(options.modifiers.len(), commands::DEFAULT_MODIFIERS.len());
        assert!(!options.auto_focus);
    }

    #[test]
    fn test_hover_tick_opens_bubble() {
        let mut session = make_session("note this well");
        select_chars(&mut session, 5, 9);
        session.run_command(Command::StNote);
        let root = session.doc().root();
        let outer = session
            .doc()
            .find_descendant(root, |d, n| d.has_class(n, "writers-bubble"))
            .unwrap();

        let t0 = Instant::now();
        session.hover_enter(outer, t0);
        session.tick(t0 + annotation::SHOW_DELAY);
        assert!(annotation::is_open(session.doc(), outer));
        session.hover_leave(outer, t0);
        session.tick(t0 + annotation::HIDE_DELAY);
        assert!(!annotation::is_open(session.doc(), outer));
    }
}
