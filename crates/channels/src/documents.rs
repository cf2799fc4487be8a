//! Document-storage collaborator: resolves attachment ids to file content.

use async_trait::async_trait;
use dashmap::DashMap;
use roster_core::types::{Attachment, DocumentId};
use roster_core::{RosterError, RosterResult};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use utoipa::ToSchema;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Resolve every id to an attachment, in the order given.
    async fn fetch(&self, ids: &[DocumentId]) -> RosterResult<Vec<Attachment>>;
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub name: String,
    pub size: usize,
}

/// In-memory document library. Populated from a directory at startup or
/// by explicit registration.
#[derive(Default)]
pub struct DocumentLibrary {
    documents: DashMap<DocumentId, Attachment>,
    next_id: AtomicU64,
}

impl DocumentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, content: Vec<u8>) -> DocumentId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.documents.insert(
            id,
            Attachment {
                name: name.into(),
                content,
            },
        );
        id
    }

    /// Register every regular file of `dir`, sorted by file name.
    pub async fn load_dir(&self, dir: impl AsRef<Path>) -> RosterResult<usize> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        for path in &files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "Skipping document with non UTF-8 name");
                continue;
            };
            let content = tokio::fs::read(path).await?;
            let id = self.register(name, content);
            info!(document_id = id, name, "Document registered");
        }
        Ok(files.len())
    }

    pub fn list(&self) -> Vec<DocumentInfo> {
        let mut docs: Vec<DocumentInfo> = self
            .documents
            .iter()
            .map(|entry| DocumentInfo {
                id: *entry.key(),
                name: entry.value().name.clone(),
                size: entry.value().content.len(),
            })
            .collect();
        docs.sort_by_key(|d| d.id);
        docs
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for DocumentLibrary {
    async fn fetch(&self, ids: &[DocumentId]) -> RosterResult<Vec<Attachment>> {
        ids.iter()
            .map(|id| {
                self.documents
                    .get(id)
                    .map(|doc| doc.value().clone())
                    .ok_or_else(|| RosterError::Storage(format!("document {id} not found")))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_in_requested_order() {
        let library = DocumentLibrary::new();
        let a = library.register("fiche.pdf", b"A".to_vec());
        let b = library.register("cadre.pdf", b"B".to_vec());

        let docs = library.fetch(&[b, a]).await.unwrap();
        assert_eq!(docs[0].name, "cadre.pdf");
        assert_eq!(docs[1].content, b"A");
    }

    #[tokio::test]
    async fn test_unknown_id_is_storage_error() {
        let library = DocumentLibrary::new();
        let err = library.fetch(&[42]).await.unwrap_err();
        assert!(matches!(err, RosterError::Storage(_)));
    }

    #[tokio::test]
    async fn test_load_dir_registers_files() {
        let dir = std::env::temp_dir().join(format!("roster-docs-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("b.pdf"), b"bb").await.unwrap();
        tokio::fs::write(dir.join("a.pdf"), b"a").await.unwrap();

        let library = DocumentLibrary::new();
        assert_eq!(library.load_dir(&dir).await.unwrap(), 2);
        let listed = library.list();
        assert_eq!(listed[0].name, "a.pdf");
        assert_eq!(listed[1].size, 2);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
