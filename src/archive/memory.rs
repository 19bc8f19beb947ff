//! In-memory archive for tests. Counts binary reads per path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Archive, ArchiveError, ArchiveId, DirectoryEntry};

struct Stored {
    entry: DirectoryEntry,
    /// `None` makes every read fail.
    bytes: Option<Vec<u8>>,
}

pub struct MemoryArchive {
    id: ArchiveId,
    landing: String,
    entries: FxHashMap<String, Stored>,
    reads: AtomicUsize,
    reads_by_path: Mutex<FxHashMap<String, usize>>,
    read_delay: Option<Duration>,
}

impl MemoryArchive {
    pub fn new(name: &str) -> Self {
        Self {
            id: ArchiveId::fresh(name),
            landing: "A/Main_Page".to_string(),
            entries: FxHashMap::default(),
            reads: AtomicUsize::new(0),
            reads_by_path: Mutex::new(FxHashMap::default()),
            read_delay: None,
        }
    }

    pub fn with_html(self, path: &str, html: &str) -> Self {
        self.with_file(path, "text/html", html.as_bytes().to_vec())
    }

    pub fn with_file(mut self, path: &str, mimetype: &str, bytes: Vec<u8>) -> Self {
        let entry = DirectoryEntry::content(path, mimetype).expect("valid test path");
        self.entries.insert(
            path.to_string(),
            Stored {
                entry,
                bytes: Some(bytes),
            },
        );
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        let entry = DirectoryEntry::redirect(from, to).expect("valid test path");
        self.entries
            .insert(from.to_string(), Stored { entry, bytes: None });
        self
    }

    /// An entry whose reads always fail.
    pub fn with_broken(mut self, path: &str, mimetype: &str) -> Self {
        let entry = DirectoryEntry::content(path, mimetype).expect("valid test path");
        self.entries
            .insert(path.to_string(), Stored { entry, bytes: None });
        self
    }

    pub fn with_landing(mut self, path: &str) -> Self {
        self.landing = path.to_string();
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reads_of(&self, path: &str) -> usize {
        self.reads_by_path.lock().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    fn id(&self) -> &ArchiveId {
        &self.id
    }

    fn landing_page(&self) -> &str {
        &self.landing
    }

    async fn entry_by_path(&self, path: &str) -> Result<Option<DirectoryEntry>, ArchiveError> {
        Ok(self.entries.get(path).map(|s| s.entry.clone()))
    }

    async fn read_binary(&self, entry: &DirectoryEntry) -> Result<Vec<u8>, ArchiveError> {
        let path = entry.path();
        self.reads.fetch_add(1, Ordering::SeqCst);
        *self.reads_by_path.lock().entry(path.clone()).or_default() += 1;

        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }

        self.entries
            .get(&path)
            .and_then(|s| s.bytes.clone())
            .ok_or(ArchiveError::Decode(path))
    }
}
