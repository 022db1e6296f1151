//! Page widgets that ship alongside the sheet editor: the timeline event
//! picker, gallery filtering for the image popup, and the localStorage-backed
//! edit recovery cache. Like the editor core these are headless state
//! machines; the page glue renders them and feeds events back.

pub mod gallery;
pub mod recovery;
pub mod timeline;
