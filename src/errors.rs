//! Typed errors for the board pipeline.
//!
//! - `FetchError`: the deal source could not deliver documents
//! - `TransformError`: the delivered documents could not be shaped into a board
//! - `TemplateError`: a board template violates its construction rules
//! - `BoardError`: the classified, user-facing error surfaced by the query layer

use serde::Serialize;
use thiserror::Error;

/// Shown when deals could not be loaded after the retry budget is spent.
pub const LOAD_FAILED_MESSAGE: &str =
    "Could not load data. Check your connection and try again.";

/// Shown when deals were loaded but could not be turned into a board.
pub const PROCESSING_FAILED_MESSAGE: &str = "Error processing deal data.";

/// Transport failures raised by a `DealSource`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Document store error: {0}")]
    Store(String),

    #[error("Deal source unavailable: {0}")]
    Unavailable(String),

    #[error("Fetch task failed: {0}")]
    Task(String),
}

/// Data-shape failures while turning a document list into a board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("Document {index} is not a JSON object")]
    NotAnObject { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Board template must contain at least one column")]
    Empty,

    #[error("Duplicate column id in board template: {id}")]
    DuplicateColumn { id: String },

    #[error("Column at position {position} has an empty id")]
    EmptyColumnId { position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardErrorKind {
    /// Network or store problem; retrying later may help.
    Transport,
    /// The data arrived but has the wrong shape.
    Transform,
}

/// Classified error surfaced to the UI.
///
/// `message` is presentation text; `detail` keeps the raw cause for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BoardError {
    pub kind: BoardErrorKind,
    pub message: String,
    pub detail: String,
}

impl BoardError {
    pub fn transport(cause: &FetchError) -> Self {
        Self {
            kind: BoardErrorKind::Transport,
            message: LOAD_FAILED_MESSAGE.to_string(),
            detail: cause.to_string(),
        }
    }

    pub fn transform(cause: &TransformError) -> Self {
        Self {
            kind: BoardErrorKind::Transform,
            message: PROCESSING_FAILED_MESSAGE.to_string(),
            detail: cause.to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind == BoardErrorKind::Transport
    }
}

impl From<FetchError> for BoardError {
    fn from(err: FetchError) -> Self {
        Self::transport(&err)
    }
}

impl From<TransformError> for BoardError {
    fn from(err: TransformError) -> Self {
        Self::transform(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let err: BoardError = FetchError::Unavailable("connection refused".to_string()).into();

        assert_eq!(err.kind, BoardErrorKind::Transport);
        assert!(err.is_transport());
        assert_eq!(err.to_string(), LOAD_FAILED_MESSAGE);
        assert!(err.detail.contains("connection refused"));
    }

    #[test]
    fn test_transform_classification() {
        let err: BoardError = TransformError::NotAnObject { index: 3 }.into();

        assert_eq!(err.kind, BoardErrorKind::Transform);
        assert!(!err.is_transport());
        assert_eq!(err.message, PROCESSING_FAILED_MESSAGE);
        assert_eq!(err.detail, "Document 3 is not a JSON object");
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&BoardErrorKind::Transform).unwrap();
        assert_eq!(json, "\"transform\"");
    }
}
