//! Explicit session context.
//!
//! Everything a request needs to know about "the current archive" travels
//! in a [`SessionContext`]. Switching archives builds a new context; code
//! that still holds the old one keeps a consistent view until it finishes.

use std::sync::Arc;

use crate::archive::{Archive, ArchiveId, DirectoryEntry, follow_redirects};
use crate::blob::{BlobHandle, BlobStore};
use crate::config::ShelfConfig;
use crate::core::ResolveError;

pub struct SessionContext {
    pub archive: Arc<dyn Archive>,
    pub archive_id: ArchiveId,
    pub blobs: BlobStore,
    pub config: Arc<ShelfConfig>,
}

impl SessionContext {
    pub fn new(archive: Arc<dyn Archive>, config: Arc<ShelfConfig>) -> Self {
        let archive_id = archive.id().clone();
        Self {
            archive,
            archive_id,
            blobs: BlobStore::new(),
            config,
        }
    }

    pub fn landing_page(&self) -> &str {
        self.archive.landing_page()
    }

    pub fn is_landing(&self, path: &str) -> bool {
        self.archive.landing_page() == path
    }

    /// Look up `path` and follow redirects to a content entry.
    pub async fn resolve_entry(&self, path: &str) -> Result<DirectoryEntry, ResolveError> {
        let archive = self.archive.as_ref();
        let entry = archive
            .entry_by_path(path)
            .await?
            .ok_or_else(|| ResolveError::NotFound(path.to_string()))?;
        follow_redirects(archive, entry)
            .await?
            .ok_or_else(|| ResolveError::RedirectUnresolved(path.to_string()))
    }

    /// Read an entry into the blob store.
    pub async fn extract(&self, path: &str) -> Result<BlobHandle, ResolveError> {
        let entry = self.resolve_entry(path).await?;
        let bytes = self.archive.read_binary(&entry).await?;
        Ok(self.blobs.insert(&entry.mimetype, bytes))
    }
}
