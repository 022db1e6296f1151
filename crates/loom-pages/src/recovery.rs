//! Edit recovery cache.
//!
//! Sheet edits are mirrored into client-side storage as the writer types, so
//! a crashed tab can offer its unsaved work back. Three keys per sheet: the
//! live content under the sheet name, the content as of the last successful
//! save under `<sheet>:last_saved`, and the held edit lock id under
//! `<sheet>:editlock`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage unavailable")]
    Unavailable,
}

/// Key-value storage seam; the page glue backs this with localStorage.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str);
}

/// In-memory backing, for tests and non-browser embedders.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: std::collections::HashMap<String, String>,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }
}

/// What page load should do with the cached state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Cache matches the server copy (or there is none); edit fresh.
    Fresh,
    /// The cache holds newer work; offer it, along with the lock the
    /// crashed session held.
    Restore {
        content: String,
        edit_lock: Option<String>,
    },
}

pub struct RecoveryCache<S> {
    storage: S,
    sheet: String,
}

impl<S: Storage> RecoveryCache<S> {
    pub fn new(storage: S, sheet: impl Into<String>) -> Self {
        Self {
            storage,
            sheet: sheet.into(),
        }
    }

    fn last_saved_key(&self) -> String {
        format!("{}:last_saved", self.sheet)
    }

    fn edit_lock_key(&self) -> String {
        format!("{}:editlock", self.sheet)
    }

    /// Decide on page load whether cached work should be recovered.
    pub fn load(&mut self, server_content: &str) -> LoadOutcome {
        match self.storage.get(&self.sheet) {
            Some(cached) if cached != server_content => {
                tracing::info!(sheet = %self.sheet, "offering recovered edits");
                LoadOutcome::Restore {
                    content: cached,
                    edit_lock: self.storage.get(&self.edit_lock_key()),
                }
            }
            _ => LoadOutcome::Fresh,
        }
    }

    /// Mirror the editor content; called on every input event.
    pub fn cache_content(&mut self, content: &str) -> Result<(), StorageError> {
        self.storage.set(&self.sheet, content)
    }

    /// Record the lock this session holds, so recovery can reclaim it.
    pub fn set_edit_lock(&mut self, lock_id: &str) -> Result<(), StorageError> {
        self.storage.set(&self.edit_lock_key(), lock_id)
    }

    /// Called after a successful save round-trip.
    pub fn mark_saved(&mut self, content: &str) -> Result<(), StorageError> {
        let key = self.last_saved_key();
        self.storage.set(&key, content)?;
        self.storage.set(&self.sheet, content)
    }

    /// Whether leaving the page now would lose work.
    pub fn has_unsaved(&self, current_content: &str) -> bool {
        match self.storage.get(&self.last_saved_key()) {
            Some(saved) => saved != current_content,
            None => !current_content.is_empty(),
        }
    }

    /// Content of the last save if it differs from the current text; backs
    /// the control panel's "restore last save" button.
    pub fn last_save_if_different(&self, current_content: &str) -> Option<String> {
        let saved = self.storage.get(&self.last_saved_key())?;
        if saved == current_content {
            None
        } else {
            Some(saved)
        }
    }

    /// Drop all three keys, done when the sheet is saved and closed cleanly.
    pub fn clear(&mut self) {
        self.storage.remove(&self.sheet);
        let last = self.last_saved_key();
        self.storage.remove(&last);
        let lock = self.edit_lock_key();
        self.storage.remove(&lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RecoveryCache<MemoryStorage> {
        RecoveryCache::new(MemoryStorage::default(), "ballad-of-anika")
    }

    #[test]
    fn test_fresh_when_cache_matches_server() {
        let mut c = cache();
        c.cache_content("server copy").unwrap();
        assert_eq!(c.load("server copy"), LoadOutcome::Fresh);
        assert!(matches!(c.load("unrelated"), LoadOutcome::Restore { .. }));
    }

    #[test]
    fn test_restore_carries_edit_lock() {
        let mut c = cache();
        c.cache_content("typed but unsaved").unwrap();
        c.set_edit_lock("lock-42").unwrap();
        assert_eq!(
            c.load("server copy"),
            LoadOutcome::Restore {
                content: "typed but unsaved".to_string(),
                edit_lock: Some("lock-42".to_string()),
            }
        );
    }

    #[test]
    fn test_empty_cache_is_fresh() {
        let mut c = cache();
        assert_eq!(c.load("anything"), LoadOutcome::Fresh);
    }

    #[test]
    fn test_unsaved_detection() {
        let mut c = cache();
        c.mark_saved("v1").unwrap();
        assert!(!c.has_unsaved("v1"));
        assert!(c.has_unsaved("v2"));
    }

    #[test]
    fn test_last_save_restore_button() {
        let mut c = cache();
        assert_eq!(c.last_save_if_different("x"), None);
        c.mark_saved("v1").unwrap();
        assert_eq!(c.last_save_if_different("v1"), None);
        assert_eq!(c.last_save_if_different("v2"), Some("v1".to_string()));
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut c = cache();
        c.cache_content("work").unwrap();
        c.set_edit_lock("lock-1").unwrap();
        c.mark_saved("work").unwrap();
        c.clear();
        assert_eq!(c.load("server"), LoadOutcome::Fresh);
        assert!(!c.has_unsaved(""));
    }
}
