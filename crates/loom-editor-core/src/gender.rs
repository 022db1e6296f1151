//! Gendered-keyword markup.
//!
//! Sheet prose refers to characters whose gender can change between runs, so
//! pronouns and titles are stored as switch spans carrying both forms: the
//! visible word plus an `alt-gender` child holding the other-gender form.
//! Spans bound to a character resolve automatically; spans the scanner
//! produced but nobody has bound yet are "broken" and carry the candidate
//! keyword alternatives until a writer fixes them.

use crate::annotation::ACTION_ATTR;
use crate::dom::{Document, NodeId};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
}

impl Gender {
    pub fn opposite(self) -> Self {
        match self {
            Gender::M => Gender::F,
            Gender::F => Gender::M,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M" => Some(Gender::M),
            "F" => Some(Gender::F),
            _ => None,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: SmolStr,
    pub name: String,
    pub gender: Gender,
    #[serde(default)]
    pub special: bool,
}

impl Character {
    pub fn new(id: impl Into<SmolStr>, name: impl Into<String>, gender: Gender) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            gender,
            special: false,
        }
    }

    /// The STATIC pseudo-character for a gender; picking it freezes a span.
    pub fn static_for(gender: Gender) -> Self {
        let (id, name) = match gender {
            Gender::M => ("SM", "STATIC MALE"),
            Gender::F => ("SF", "STATIC FEMALE"),
        };
        Self {
            id: SmolStr::new_static(id),
            name: name.to_string(),
            gender,
            special: true,
        }
    }

    /// The IGNORE pseudo-character; picking it defers the decision.
    pub fn ignore_for(gender: Gender) -> Self {
        let id = match gender {
            Gender::M => "IM",
            Gender::F => "IF",
        };
        Self {
            id: SmolStr::new_static(id),
            name: "IGNORE FOR NOW".to_string(),
            gender,
            special: true,
        }
    }
}

/// Character list in most-recently-used order, with the four pseudo
/// characters appended at the end.
#[derive(Debug, Clone, Default)]
pub struct CharacterRoster {
    characters: Vec<Character>,
}

impl CharacterRoster {
    pub fn new(characters: Vec<Character>) -> Self {
        Self { characters }
    }

    /// Roster with the STATIC and IGNORE pseudo-characters appended.
    pub fn with_specials(mut characters: Vec<Character>) -> Self {
        characters.push(Character::static_for(Gender::M));
        characters.push(Character::static_for(Gender::F));
        characters.push(Character::ignore_for(Gender::M));
        characters.push(Character::ignore_for(Gender::F));
        Self { characters }
    }

    pub fn find(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Move a character to the front so recent picks lead the dropdown.
    /// Pseudo-characters stay put.
    pub fn promote_front(&mut self, id: &str) {
        let Some(idx) = self.characters.iter().position(|c| c.id == id) else {
            return;
        };
        if self.characters[idx].special {
            return;
        }
        let c = self.characters.remove(idx);
        self.characters.insert(0, c);
    }

    /// Dropdown contents. A gender restricts the list to characters of that
    /// gender; an allow-list restricts it to the listed ids.
    /// Pseudo-characters are always offered.
    pub fn choices(&self, gender: Option<Gender>, allow: Option<&[SmolStr]>) -> Vec<&Character> {
        self.characters
            .iter()
            .filter(|c| {
                if c.special {
                    return true;
                }
                let gender_ok = match gender {
                    Some(g) => c.gender == g,
                    None => true,
                };
                let allowed = match allow {
                    Some(ids) => ids.iter().any(|id| *id == c.id),
                    None => true,
                };
                gender_ok && allowed
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordCategory {
    Pronoun,
    Title,
    Name,
}

/// A word with male and female forms, keyed by id on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderedKeyword {
    pub id: SmolStr,
    pub male: String,
    pub female: String,
    pub category: KeywordCategory,
}

impl GenderedKeyword {
    pub fn pronoun(id: impl Into<SmolStr>, male: impl Into<String>, female: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            male: male.into(),
            female: female.into(),
            category: KeywordCategory::Pronoun,
        }
    }

    pub fn resolve(&self, gender: Gender) -> &str {
        match gender {
            Gender::M => &self.male,
            Gender::F => &self.female,
        }
    }

    /// If `word` is one of this keyword's forms (case-insensitive), the
    /// gender it reads as plus the other form with the word's casing.
    pub fn match_word(&self, word: &str) -> Option<(Gender, String)> {
        if word.eq_ignore_ascii_case(&self.male) {
            Some((Gender::M, match_case(word, &self.female)))
        } else if word.eq_ignore_ascii_case(&self.female) {
            Some((Gender::F, match_case(word, &self.male)))
        } else {
            None
        }
    }
}

/// Carry the casing of `source` over to `target`: ALLCAPS stays allcaps,
/// Capitalized stays capitalized, anything else is left as stored.
pub fn match_case(source: &str, target: &str) -> String {
    let mut chars = source.chars();
    let first_upper = chars.next().map(|c| c.is_uppercase()).unwrap_or(false);
    if source.len() > 1 && source.chars().all(|c| !c.is_lowercase()) && first_upper {
        return target.to_uppercase();
    }
    if first_upper {
        let mut out = String::with_capacity(target.len());
        let mut t = target.chars();
        if let Some(c) = t.next() {
            out.extend(c.to_uppercase());
        }
        out.extend(t);
        return out;
    }
    target.to_string()
}

#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    keywords: Vec<GenderedKeyword>,
}

impl KeywordTable {
    pub fn new(keywords: Vec<GenderedKeyword>) -> Self {
        Self { keywords }
    }

    /// The five core pronoun rows every game starts from.
    pub fn pronouns() -> Self {
        Self::new(vec![
            GenderedKeyword::pronoun("sub", "he", "she"),
            GenderedKeyword::pronoun("obj", "him", "her"),
            GenderedKeyword::pronoun("pos", "his", "her"),
            GenderedKeyword::pronoun("posn", "his", "hers"),
            GenderedKeyword::pronoun("refl", "himself", "herself"),
        ])
    }

    pub fn find(&self, id: &str) -> Option<&GenderedKeyword> {
        self.keywords.iter().find(|k| k.id == id)
    }

    /// Every keyword one word could be, with read-gender and alternative.
    pub fn matches(&self, word: &str) -> Vec<KeywordMatch> {
        self.keywords
            .iter()
            .filter_map(|k| {
                k.match_word(word).map(|(gender, alternative)| KeywordMatch {
                    keyword: k.id.clone(),
                    gender,
                    alternative,
                })
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenderedKeyword> {
        self.keywords.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    pub keyword: SmolStr,
    pub gender: Gender,
    pub alternative: String,
}

/// Wire discriminators for the gender span family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    Switch,
    Static,
    TemporaryIgnore,
    Broken,
    AltGender,
    AltPossibility,
}

impl SpanState {
    pub fn action(self) -> &'static str {
        match self {
            SpanState::Switch => "gender-switch",
            SpanState::Static => "gender-static",
            SpanState::TemporaryIgnore => "temporary-ignore",
            SpanState::Broken => "broken-gender-switch",
            SpanState::AltGender => "alt-gender",
            SpanState::AltPossibility => "alt-possibility",
        }
    }

    pub fn from_action(action: &str) -> Option<Self> {
        Some(match action {
            "gender-switch" => SpanState::Switch,
            "gender-static" => SpanState::Static,
            "temporary-ignore" => SpanState::TemporaryIgnore,
            "broken-gender-switch" => SpanState::Broken,
            "alt-gender" => SpanState::AltGender,
            "alt-possibility" => SpanState::AltPossibility,
            _ => return None,
        })
    }
}

pub fn span_state(doc: &Document, node: NodeId) -> Option<SpanState> {
    doc.attr(node, ACTION_ATTR).and_then(SpanState::from_action)
}

/// Build a resolved switch span bound to a character. Detached.
pub fn new_gender_switch(
    doc: &mut Document,
    character: &Character,
    keyword: &GenderedKeyword,
    reversed: bool,
) -> NodeId {
    let display = if reversed {
        character.gender.opposite()
    } else {
        character.gender
    };
    let span = doc.create_element("span");
    doc.set_attr(span, "class", "gender-switch");
    doc.set_attr(span, ACTION_ATTR, SpanState::Switch.action());
    doc.set_attr(span, "contenteditable", "false");
    doc.set_attr(span, "data-character", character.id.to_string());
    doc.set_attr(span, "data-keyword", keyword.id.to_string());
    doc.set_attr(span, "data-default-gender", display.as_str());
    if reversed {
        doc.set_attr(span, "data-gender-reversed", "true");
    }
    let main = doc.create_text(keyword.resolve(display).to_string());
    doc.append(span, main);
    let alt = doc.create_element("span");
    doc.set_attr(alt, "class", "alt-gender");
    doc.set_attr(alt, ACTION_ATTR, SpanState::AltGender.action());
    let alt_text = doc.create_text(keyword.resolve(display.opposite()).to_string());
    doc.append(alt, alt_text);
    doc.append(span, alt);
    span
}

/// Build a broken span for a scanned word. Detached. The alt child carries
/// one possibility per matching keyword; an allow-list (character id /
/// keyword id pairs) constrains the later fix.
pub fn new_broken_switch(
    doc: &mut Document,
    word: &str,
    matches: &[KeywordMatch],
    names: Option<&str>,
) -> NodeId {
    let span = doc.create_element("span");
    doc.set_attr(span, "class", "broken-gender-switch");
    doc.set_attr(span, ACTION_ATTR, SpanState::Broken.action());
    doc.set_attr(span, "contenteditable", "false");
    if let Some(first) = matches.first() {
        doc.set_attr(span, "data-default-gender", first.gender.as_str());
    }
    if let Some(names) = names {
        doc.set_attr(span, "data-names", names.to_string());
    }
    let main = doc.create_text(word.to_string());
    doc.append(span, main);
    let alt = doc.create_element("span");
    doc.set_attr(alt, "class", "alt-gender");
    doc.set_attr(alt, ACTION_ATTR, SpanState::AltGender.action());
    for m in matches {
        let poss = doc.create_element("span");
        doc.set_attr(poss, "data-keyword", m.keyword.to_string());
        doc.set_attr(poss, ACTION_ATTR, SpanState::AltPossibility.action());
        let t = doc.create_text(m.alternative.clone());
        doc.append(poss, t);
        doc.append(alt, poss);
    }
    doc.append(span, alt);
    span
}

/// The alt-gender child of a switch span.
pub fn alt_child(doc: &Document, span: NodeId) -> Option<NodeId> {
    doc.children(span)
        .iter()
        .copied()
        .find(|n| span_state(doc, *n) == Some(SpanState::AltGender))
}

/// The visible word of a switch span (text outside the alt child).
pub fn current_word(doc: &Document, span: NodeId) -> String {
    doc.children(span)
        .iter()
        .filter_map(|n| doc.text(*n))
        .collect()
}

/// Candidate (keyword id, alternative word) pairs on a broken span.
pub fn alt_possibilities(doc: &Document, span: NodeId) -> Vec<(SmolStr, String)> {
    let Some(alt) = alt_child(doc, span) else {
        return Vec::new();
    };
    doc.children(alt)
        .iter()
        .filter(|n| span_state(doc, **n) == Some(SpanState::AltPossibility))
        .filter_map(|n| {
            let kw = doc.attr(*n, "data-keyword")?;
            Some((SmolStr::new(kw), doc.text_content(*n)))
        })
        .collect()
}

/// Parse a `data-names` allow-list: '-'-separated `character.keyword` pairs.
pub fn parse_names_attr(raw: &str) -> Vec<(SmolStr, SmolStr)> {
    raw.split('-')
        .filter_map(|pair| {
            let (character, keyword) = pair.split_once('.')?;
            if character.is_empty() || keyword.is_empty() {
                return None;
            }
            Some((SmolStr::new(character), SmolStr::new(keyword)))
        })
        .collect()
}

/// What the writer picked in the fix panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixChoice {
    /// Bind to a real character, optionally naming the keyword when the word
    /// is ambiguous, optionally reading against the character's gender.
    Character {
        id: SmolStr,
        keyword: Option<SmolStr>,
        reversed: bool,
    },
    /// Freeze the span as literal text of the given gender.
    Static(Gender),
    /// Defer: keep the text, strip the markup on the next save.
    Ignore(Gender),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    Resolved,
    MadeStatic,
    Ignored,
    /// Several keyword readings fit and none was picked; nothing changed.
    AmbiguousPronoun,
    /// Character id not in the roster; nothing changed.
    UnknownCharacter,
}

/// Apply a fix decision to a switch span. Rejections mutate nothing.
pub fn apply_fix(
    doc: &mut Document,
    span: NodeId,
    choice: &FixChoice,
    roster: &mut CharacterRoster,
    table: &KeywordTable,
) -> FixOutcome {
    match choice {
        FixChoice::Static(_) => {
            let word = current_word(doc, span);
            flatten_to_word(doc, span, &word);
            doc.set_attr(span, "class", "gender-static");
            doc.set_attr(span, ACTION_ATTR, SpanState::Static.action());
            doc.remove_attr(span, "contenteditable");
            doc.remove_attr(span, "data-character");
            doc.remove_attr(span, "data-keyword");
            doc.remove_attr(span, "data-names");
            FixOutcome::MadeStatic
        }
        FixChoice::Ignore(_) => {
            let word = current_word(doc, span);
            flatten_to_word(doc, span, &word);
            doc.set_attr(span, "class", "temporary-ignore");
            doc.set_attr(span, ACTION_ATTR, SpanState::TemporaryIgnore.action());
            doc.remove_attr(span, "contenteditable");
            doc.remove_attr(span, "data-character");
            doc.remove_attr(span, "data-keyword");
            doc.remove_attr(span, "data-names");
            FixOutcome::Ignored
        }
        FixChoice::Character { id, keyword, reversed } => {
            let Some(character) = roster.find(id).cloned() else {
                tracing::warn!(character = %id, "fix named a character missing from the roster");
                return FixOutcome::UnknownCharacter;
            };

            // An allow-list pairs each permitted character with its keyword.
            let mut keyword = keyword.clone();
            if let Some(names) = doc.attr(span, "data-names").map(str::to_owned) {
                if let Some((_, kw)) = parse_names_attr(&names)
                    .into_iter()
                    .find(|(c, _)| *c == character.id)
                {
                    keyword = Some(kw);
                }
            }

            let possibilities = alt_possibilities(doc, span);
            let keyword = match keyword {
                Some(kw) => kw,
                None => match possibilities.as_slice() {
                    [(kw, _)] => kw.clone(),
                    _ => return FixOutcome::AmbiguousPronoun,
                },
            };
            let alt_word = possibilities
                .iter()
                .find(|(kw, _)| *kw == keyword)
                .map(|(_, w)| w.clone())
                .or_else(|| {
                    // Re-fixing an already-resolved span: derive the other
                    // form from the table.
                    let display = if *reversed {
                        character.gender.opposite()
                    } else {
                        character.gender
                    };
                    table
                        .find(&keyword)
                        .map(|k| k.resolve(display.opposite()).to_string())
                });
            let Some(alt_word) = alt_word else {
                return FixOutcome::AmbiguousPronoun;
            };

            let alt = match alt_child(doc, span) {
                Some(alt) => {
                    let children: Vec<NodeId> = doc.children(alt).to_vec();
                    for c in children {
                        doc.detach(c);
                    }
                    alt
                }
                None => {
                    let alt = doc.create_element("span");
                    doc.set_attr(alt, "class", "alt-gender");
                    doc.set_attr(alt, ACTION_ATTR, SpanState::AltGender.action());
                    doc.append(span, alt);
                    alt
                }
            };
            let t = doc.create_text(alt_word);
            doc.append(alt, t);

            doc.set_attr(span, "class", "gender-switch");
            doc.set_attr(span, ACTION_ATTR, SpanState::Switch.action());
            doc.set_attr(span, "contenteditable", "false");
            doc.set_attr(span, "data-character", character.id.to_string());
            doc.set_attr(span, "data-keyword", keyword.to_string());
            if *reversed {
                doc.set_attr(span, "data-gender-reversed", "true");
            } else {
                doc.remove_attr(span, "data-gender-reversed");
            }
            doc.remove_attr(span, "data-names");
            roster.promote_front(&character.id);
            FixOutcome::Resolved
        }
    }
}

fn flatten_to_word(doc: &mut Document, span: NodeId, word: &str) {
    let children: Vec<NodeId> = doc.children(span).to_vec();
    for c in children {
        doc.detach(c);
    }
    let t = doc.create_text(word.to_string());
    doc.append(span, t);
}

/// Unwrap a switch span back to plain text (the CLEAR action).
pub fn clear_span(doc: &mut Document, span: NodeId) {
    if let Some(alt) = alt_child(doc, span) {
        doc.detach(alt);
    }
    doc.unwrap_node(span);
}

/// Convert a resolved switch to static text (the STATIC action of the
/// clear dialog). The binding attributes go away; the visible word stays.
pub fn make_static(doc: &mut Document, span: NodeId) {
    if let Some(alt) = alt_child(doc, span) {
        doc.detach(alt);
    }
    doc.remove_class(span, "gender-switch");
    doc.add_class(span, "gender-static");
    doc.set_attr(span, ACTION_ATTR, SpanState::Static.action());
    doc.remove_attr(span, "contenteditable");
    doc.remove_attr(span, "data-keyword");
    doc.remove_attr(span, "data-character");
}

/// Next broken span in document order, the "fix next" target.
pub fn next_broken(doc: &Document, root: NodeId) -> Option<NodeId> {
    doc.find_descendant(root, |d, n| span_state(d, n) == Some(SpanState::Broken))
}

/// Strip temporary-ignore spans down to their text, done before saving.
pub fn strip_ignored(doc: &mut Document, root: NodeId) -> usize {
    let ignored = doc.query_all(root, |d, n| {
        span_state(d, n) == Some(SpanState::TemporaryIgnore)
    });
    let count = ignored.len();
    for span in ignored {
        doc.unwrap_node(span);
    }
    count
}

/// Scan prose text runs for keyword hits and replace each hit with a broken
/// switch span. Runs inside existing gender spans are left alone; annotation
/// prose is scanned like any other. Returns how many spans were created.
pub fn mark_unresolved_keywords(doc: &mut Document, root: NodeId, table: &KeywordTable) -> usize {
    let candidates: Vec<NodeId> = doc
        .descendants(root)
        .into_iter()
        .filter(|n| doc.is_text(*n))
        .filter(|n| {
            doc.closest(*n, |d, a| span_state(d, a).is_some()).is_none()
        })
        .collect();

    let mut created = 0;
    for node in candidates {
        let Some(text) = doc.text(node).map(str::to_owned) else {
            continue;
        };
        let segments = segment_text(&text, table);
        if segments.len() == 1 && matches!(segments[0], Segment::Plain(_)) {
            continue;
        }
        let mut replacements = Vec::with_capacity(segments.len());
        for seg in segments {
            match seg {
                Segment::Plain(t) => {
                    if !t.is_empty() {
                        replacements.push(doc.create_text(t));
                    }
                }
                Segment::Hit { word, matches } => {
                    replacements.push(new_broken_switch(doc, &word, &matches, None));
                    created += 1;
                }
            }
        }
        doc.replace_with(node, replacements);
    }
    created
}

enum Segment {
    Plain(String),
    Hit { word: String, matches: Vec<KeywordMatch> },
}

fn segment_text(text: &str, table: &KeywordTable) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut plain = String::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_alphabetic() || c == '\'' {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphabetic() || c == '\'' {
                    word.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let matches = table.matches(&word);
            if matches.is_empty() {
                plain.push_str(&word);
            } else {
                if !plain.is_empty() {
                    out.push(Segment::Plain(std::mem::take(&mut plain)));
                }
                out.push(Segment::Hit { word, matches });
            }
        } else {
            plain.push(c);
            chars.next();
        }
    }
    if !plain.is_empty() {
        out.push(Segment::Plain(plain));
    }
    if out.is_empty() {
        out.push(Segment::Plain(String::new()));
    }
    out
}
