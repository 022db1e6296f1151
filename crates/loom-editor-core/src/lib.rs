//! Headless rich-text editor core for storyloom sheets.
//!
//! Sheets are stored as an HTML dialect carrying inline annotations
//! (writers-bubbles) and gendered-keyword markup. This crate owns the whole
//! editing model without touching a browser DOM: the document tree, the
//! wire codec, selection and wrapping, annotation and gender operations,
//! the floating toolbar state, command dispatch and the per-field
//! [`session::EditorSession`]. An embedder projects the tree into its view
//! layer and feeds events back in.

pub mod annotation;
pub mod bubble;
pub mod commands;
pub mod dom;
pub mod error;
pub mod gender;
pub mod html;
pub mod images;
pub mod selection;
pub mod session;

pub use annotation::AnnotationKind;
pub use commands::Command;
pub use dom::{Document, NodeId};
pub use error::EditorError;
pub use gender::{Character, CharacterRoster, Gender, GenderedKeyword, KeywordTable};
pub use selection::{DomRange, Position};
pub use session::{CommandOutcome, EditorOptions, EditorSession};
