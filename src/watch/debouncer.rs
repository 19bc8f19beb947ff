use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::debug;

pub(super) const DEBOUNCE_MS: u64 = 300;
pub(super) const REOPEN_COOLDOWN_MS: u64 = 800;

/// Collects changed paths until the archive has been quiet for a while.
/// Only timing and deduplication; reopening is the caller's business.
pub(super) struct Debouncer {
    pub(super) changed: FxHashSet<PathBuf>,
    pub(super) last_event: Option<Instant>,
    pub(super) last_reopen: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self {
            changed: FxHashSet::default(),
            last_event: None,
            last_reopen: None,
        }
    }

    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            // Metadata-only changes (mtime/atime/chmod) do not change content.
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => {}
            _ => return,
        }

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            debug!("watch"; "{:?}: {}", event.kind, path.display());
            self.changed.insert(path.clone());
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the changed paths once debounce and cooldown have elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<PathBuf>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        self.last_reopen = Some(Instant::now());
        Some(self.changed.drain().collect())
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }
        if let Some(last_reopen) = self.last_reopen
            && last_reopen.elapsed() < Duration::from_millis(REOPEN_COOLDOWN_MS)
        {
            return false;
        }
        !self.changed.is_empty()
    }

    /// How long to wait before the next readiness check.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining =
            Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_reopen
            .map(|t| Duration::from_millis(REOPEN_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Editor artifacts that never belong to an archive.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
