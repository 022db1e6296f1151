use thiserror::Error;

/// Errors surfaced to embedders.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Html(#[from] crate::html::HtmlError),
}
