//! Gallery filtering for the image picker popup.
//!
//! The picker shows every uploaded image as a thumbnail tagged with the
//! sheets it appears on. Writers narrow the grid with per-sheet checkboxes
//! and a name substring, then click a thumbnail to select it into the form's
//! hidden field.

use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub id: SmolStr,
    pub name: String,
    /// Sheets this image is used on.
    pub sheets: Vec<SmolStr>,
}

#[derive(Debug, Clone, Default)]
pub struct GalleryFilter {
    checked_sheets: Vec<SmolStr>,
    search: String,
}

impl GalleryFilter {
    /// Start with every sheet checked, the popup's initial state.
    pub fn all_checked(sheets: &[SmolStr]) -> Self {
        Self {
            checked_sheets: sheets.to_vec(),
            search: String::new(),
        }
    }

    pub fn set_search(&mut self, text: &str) {
        self.search = text.to_lowercase();
    }

    pub fn check(&mut self, sheet: &str) {
        if !self.checked_sheets.iter().any(|s| s == sheet) {
            self.checked_sheets.push(SmolStr::new(sheet));
        }
    }

    pub fn uncheck(&mut self, sheet: &str) {
        self.checked_sheets.retain(|s| s != sheet);
    }

    pub fn select_all(&mut self, sheets: &[SmolStr]) {
        self.checked_sheets = sheets.to_vec();
    }

    pub fn select_none(&mut self) {
        self.checked_sheets.clear();
    }

    pub fn is_checked(&self, sheet: &str) -> bool {
        self.checked_sheets.iter().any(|s| s == sheet)
    }

    /// Thumbnails passing both the sheet checkboxes and the name search.
    pub fn visible<'a>(&self, thumbnails: &'a [Thumbnail]) -> Vec<&'a Thumbnail> {
        thumbnails
            .iter()
            .filter(|t| t.sheets.iter().any(|s| self.is_checked(s)))
            .filter(|t| self.search.is_empty() || t.name.to_lowercase().contains(&self.search))
            .collect()
    }
}

/// The click-to-select state feeding the form's hidden image field.
#[derive(Debug, Clone, Default)]
pub struct GallerySelection {
    selected: Option<SmolStr>,
}

impl GallerySelection {
    pub fn choose(&mut self, id: &str) {
        self.selected = Some(SmolStr::new(id));
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }
}
