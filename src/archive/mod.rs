//! Archive capability.
//!
//! The reader never parses a container itself. It talks to an [`Archive`]
//! that can look up entries, resolve redirects and read entry bodies.
//! [`DirArchive`] exposes an unpacked archive directory.
//!
//! ```text
//! path ──► entry_by_path ──► DirectoryEntry ──► follow_redirects ──► read_binary
//! ```

mod dir;
mod entry;
mod error;
#[cfg(test)]
pub mod memory;

pub use dir::DirArchive;
pub use entry::{DirectoryEntry, split_path};
pub use error::ArchiveError;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rustc_hash::FxHashSet;

/// Upper bound on redirect hops before a chain counts as unresolved.
pub const MAX_REDIRECT_HOPS: usize = 32;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identity of one opened archive.
///
/// Every open gets a fresh generation, so re-opening the same archive
/// after it changed on disk yields a different id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveId {
    name: Arc<str>,
    generation: u64,
}

impl ArchiveId {
    pub fn fresh(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.generation)
    }
}

/// Read-only access to an opened archive.
#[async_trait]
pub trait Archive: Send + Sync {
    fn id(&self) -> &ArchiveId;

    /// Path of the landing page, `A/Main_Page`.
    fn landing_page(&self) -> &str;

    /// Look up an entry. `Ok(None)` means the archive has no such path.
    async fn entry_by_path(&self, path: &str) -> Result<Option<DirectoryEntry>, ArchiveError>;

    /// Resolve one redirect hop. Content entries resolve to themselves.
    async fn resolve_redirect(
        &self,
        entry: &DirectoryEntry,
    ) -> Result<Option<DirectoryEntry>, ArchiveError> {
        match &entry.redirect_target {
            Some(target) => self.entry_by_path(target).await,
            None => Ok(Some(entry.clone())),
        }
    }

    async fn read_binary(&self, entry: &DirectoryEntry) -> Result<Vec<u8>, ArchiveError>;

    async fn read_text(&self, entry: &DirectoryEntry) -> Result<String, ArchiveError> {
        let bytes = self.read_binary(entry).await?;
        String::from_utf8(bytes).map_err(|_| ArchiveError::Decode(entry.path()))
    }
}

/// Follow a redirect chain to its content entry.
///
/// Returns `Ok(None)` when a target is missing, the chain loops, or it is
/// longer than [`MAX_REDIRECT_HOPS`].
pub async fn follow_redirects(
    archive: &dyn Archive,
    entry: DirectoryEntry,
) -> Result<Option<DirectoryEntry>, ArchiveError> {
    let mut current = entry;
    let mut visited = FxHashSet::default();

    for _ in 0..MAX_REDIRECT_HOPS {
        if !current.is_redirect() {
            return Ok(Some(current));
        }
        if !visited.insert(current.path()) {
            crate::debug!("dispatch"; "redirect cycle at {}", current.path());
            return Ok(None);
        }
        match archive.resolve_redirect(&current).await? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }

    Ok((!current.is_redirect()).then_some(current))
}
