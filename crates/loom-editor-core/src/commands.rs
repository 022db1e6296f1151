//! Editor commands and key bindings.
//!
//! Every toolbar button and shortcut funnels into the closed [`Command`]
//! enum; the session dispatches on it. Commands are named on the wire by the
//! same strings the toolbar configuration uses, so an embedder's modifier
//! list can be checked against [`Command::from_name`].

use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Bold,
    Italic,
    Underline,
    RemoveFormat,
    StNote,
    ToDo,
    Hidden,
    Image,
    H1,
    H2,
    H3,
    Gender,
    Flip,
    Undo,
    SectionBreak,
    PageBreak,
    Dash,
    Save,
    ScrollToTop,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Bold => "bold",
            Command::Italic => "italic",
            Command::Underline => "underline",
            Command::RemoveFormat => "removeFormat",
            Command::StNote => "stNote",
            Command::ToDo => "toDo",
            Command::Hidden => "hidden",
            Command::Image => "image",
            Command::H1 => "h1",
            Command::H2 => "h2",
            Command::H3 => "h3",
            Command::Gender => "gender",
            Command::Flip => "flip",
            Command::Undo => "undo",
            Command::SectionBreak => "sectionBreak",
            Command::PageBreak => "pageBreak",
            Command::Dash => "dash",
            Command::Save => "save",
            Command::ScrollToTop => "scrollToTop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bold" => Command::Bold,
            "italic" => Command::Italic,
            "underline" => Command::Underline,
            "removeFormat" => Command::RemoveFormat,
            "stNote" => Command::StNote,
            "toDo" => Command::ToDo,
            "hidden" => Command::Hidden,
            "image" => Command::Image,
            "h1" => Command::H1,
            "h2" => Command::H2,
            "h3" => Command::H3,
            "gender" => Command::Gender,
            "flip" => Command::Flip,
            "undo" => Command::Undo,
            "sectionBreak" => Command::SectionBreak,
            "pageBreak" => Command::PageBreak,
            "dash" => Command::Dash,
            "save" => Command::Save,
            "scrollToTop" => Command::ScrollToTop,
            _ => return None,
        })
    }

    /// Commands that change the document, and so take an undo snapshot.
    pub fn is_mutating(self) -> bool {
        !matches!(
            self,
            Command::Flip | Command::Undo | Command::Save | Command::ScrollToTop
        )
    }
}

/// Toolbar buttons shown when the embedder configures none.
pub const DEFAULT_MODIFIERS: &[&str] = &[
    "bold",
    "italic",
    "underline",
    "removeFormat",
    "stNote",
    "toDo",
    "hidden",
    "image",
    "h2",
    "h3",
    "gender",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Character(SmolStr),
    F1,
    F2,
    F3,
    Enter,
    Tab,
    Escape,
    ArrowUp,
}

impl Key {
    pub fn char(c: char) -> Self {
        Key::Character(SmolStr::new(c.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const CTRL: Self = Self {
        ctrl: true,
        alt: false,
        shift: false,
        meta: false,
    };
    pub const META: Self = Self {
        ctrl: false,
        alt: false,
        shift: false,
        meta: true,
    };

    /// The platform shortcut modifier: Command on mac, Control elsewhere.
    pub fn primary(&self, is_mac: bool) -> bool {
        if is_mac { self.meta } else { self.ctrl }
    }
}

/// Resolve a keystroke to a command. In raw-HTML view only the mode flip is
/// live; everything else falls through to the platform.
pub fn lookup(key: &Key, mods: &Modifiers, is_mac: bool, raw_view: bool) -> Option<Command> {
    if !mods.primary(is_mac) {
        return None;
    }
    let command = match key {
        Key::Character(c) => match c.as_str() {
            "b" | "B" => Command::Bold,
            "i" | "I" => Command::Italic,
            "u" | "U" => Command::Underline,
            "." => Command::Flip,
            "z" | "Z" => Command::Undo,
            "g" | "G" => Command::Gender,
            "8" => Command::SectionBreak,
            "-" => Command::Dash,
            "s" | "S" => Command::Save,
            _ => return None,
        },
        Key::F1 => Command::H1,
        Key::F2 => Command::H2,
        Key::F3 => Command::H3,
        Key::ArrowUp => Command::ScrollToTop,
        Key::Enter | Key::Tab | Key::Escape => return None,
    };
    if raw_view && command != Command::Flip {
        return None;
    }
    Some(command)
}
