//! Source collaborator: finalized transcripts and their summaries.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use groundwork_core::SourceDocument;

#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("No source for transcription {0}")]
    NotFound(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Transcript plus summary by transcription id. Both are immutable for the
/// duration of a run.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn fetch(&self, transcription_id: &str) -> Result<SourceDocument, SourceError>;
}

#[derive(Default)]
pub struct MemorySourceRepository {
    documents: RwLock<HashMap<String, SourceDocument>>,
}

impl MemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: SourceDocument) {
        self.documents
            .write()
            .insert(document.transcription_id.clone(), document);
    }

    pub fn with_document(self, document: SourceDocument) -> Self {
        self.insert(document);
        self
    }
}

#[async_trait]
impl SourceRepository for MemorySourceRepository {
    async fn fetch(&self, transcription_id: &str) -> Result<SourceDocument, SourceError> {
        self.documents
            .read()
            .get(transcription_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(transcription_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch() {
        let repo = MemorySourceRepository::new().with_document(SourceDocument::new(
            "t-1",
            "I have a headache.",
            "User has a headache.",
        ));

        assert_eq!(repo.fetch("t-1").await.unwrap().summary, "User has a headache.");
        assert!(matches!(repo.fetch("t-2").await, Err(SourceError::NotFound(_))));
    }
}
