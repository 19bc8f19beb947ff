//! Style resolution cache.
//!
//! Maps `(archive, stylesheet path)` to a blob handle so each stylesheet
//! is read from the archive at most once per archive. A stylesheet that
//! cannot be produced is remembered as [`StyleSlot::Missing`] and never
//! retried for that archive.
//!
//! The map belongs to exactly one archive. Switching archives empties it,
//! either through [`StyleCache::invalidate`] or on the first `resolve`
//! that carries a different archive id.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::archive::ArchiveId;
use crate::blob::BlobHandle;
use crate::core::ResolveError;
use crate::debug;
use crate::session::SessionContext;
use crate::utils::mime;

/// Cached result of one stylesheet lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleSlot {
    Resolved(BlobHandle),
    /// Resolved to nothing; rendered as an empty stylesheet.
    Missing,
}

impl StyleSlot {
    /// Value for an `href` attribute.
    pub fn href(&self) -> &str {
        match self {
            Self::Resolved(handle) => handle.as_str(),
            Self::Missing => "",
        }
    }

    pub fn handle(&self) -> Option<&BlobHandle> {
        match self {
            Self::Resolved(handle) => Some(handle),
            Self::Missing => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Archive reads performed on behalf of misses.
    pub decodes: u64,
}

#[derive(Default)]
struct CacheState {
    archive: Option<ArchiveId>,
    entries: FxHashMap<(ArchiveId, String), StyleSlot>,
    stats: CacheStats,
}

impl CacheState {
    fn reset_for(&mut self, id: &ArchiveId) {
        if self.archive.as_ref() != Some(id) {
            if self.archive.is_some() {
                debug!("style"; "archive changed to {}, dropping {} entries", id, self.entries.len());
            }
            self.entries = FxHashMap::default();
            self.archive = Some(id.clone());
        }
    }
}

#[derive(Default)]
pub struct StyleCache {
    state: Mutex<CacheState>,
}

impl StyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a stylesheet path for the session's archive.
    ///
    /// The lock is not held across archive reads. Two cold lookups racing
    /// for the same path may both read; the first stored slot wins and both
    /// callers receive it.
    pub async fn resolve(&self, session: &SessionContext, path: &str) -> StyleSlot {
        let key = (session.archive_id.clone(), path.to_string());

        {
            let mut state = self.state.lock();
            state.reset_for(&session.archive_id);
            if let Some(slot) = state.entries.get(&key).cloned() {
                state.stats.hits += 1;
                return slot;
            }
            state.stats.misses += 1;
        }

        let slot = match self.decode(session, path).await {
            Ok(handle) => StyleSlot::Resolved(handle),
            Err(e) => {
                debug!("style"; "{}", e);
                StyleSlot::Missing
            }
        };

        let mut state = self.state.lock();
        if state.archive.as_ref() != Some(&session.archive_id) {
            // Archive switched while reading: hand the result out, keep it out of the map.
            return slot;
        }
        state.entries.entry(key).or_insert(slot).clone()
    }

    async fn decode(
        &self,
        session: &SessionContext,
        path: &str,
    ) -> Result<BlobHandle, ResolveError> {
        let entry = session.resolve_entry(path).await?;

        self.state.lock().stats.decodes += 1;
        let bytes = session.archive.read_binary(&entry).await.map_err(|e| {
            debug!("style"; "read {} failed: {}", entry.path(), e);
            ResolveError::CacheDecodeFailure(path.to_string())
        })?;

        let mimetype = if entry.mimetype.is_empty() {
            mime::types::CSS
        } else {
            entry.mimetype.as_str()
        };
        Ok(session.blobs.insert(mimetype, bytes))
    }

    /// Drop every entry and bind the cache to `new_id`.
    pub fn invalidate(&self, new_id: &ArchiveId) {
        let mut state = self.state.lock();
        state.entries = FxHashMap::default();
        state.archive = Some(new_id.clone());
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
