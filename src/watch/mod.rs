//! Archive watcher.
//!
//! Re-opens the archive directory after it changes on disk and switches
//! the dispatcher to the new open. The switch gives the archive a fresh
//! identity, so every cached stylesheet and blob handle of the previous
//! open is dropped.
//!
//! ```text
//! notify → Debouncer (timing) → DirArchive::open → Dispatcher::switch_archive
//! ```

mod debouncer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use notify::{RecursiveMode, Watcher};

use crate::archive::DirArchive;
use crate::dispatch::Dispatcher;
use crate::log;
use debouncer::Debouncer;

/// Upper bound on one wait so shutdown is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Watch `root` until `shutdown_rx` fires or its sender is dropped.
pub fn run(dispatcher: Arc<Dispatcher>, root: PathBuf, shutdown_rx: Receiver<()>) -> notify::Result<()> {
    let (event_tx, event_rx) = channel::unbounded();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = event_tx.send(res);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    log!("watch"; "watching {}", root.display());

    let mut debouncer = Debouncer::new();
    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }
        if crate::core::is_shutdown() {
            break;
        }

        match event_rx.recv_timeout(debouncer.sleep_duration().min(POLL_INTERVAL)) {
            Ok(Ok(event)) => debouncer.add_event(&event),
            Ok(Err(e)) => log!("watch"; "notify error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(changed) = debouncer.take_if_ready() {
            reopen(&dispatcher, &root, changed.len());
        }
    }
    Ok(())
}

/// Open the archive again and install it. A broken archive on disk keeps
/// the previous open in service.
pub fn reopen(dispatcher: &Dispatcher, root: &Path, changed: usize) {
    match DirArchive::open(root) {
        Ok(archive) => {
            log!("watch"; "{} change(s), reopening {}", changed, root.display());
            dispatcher.switch_archive(Arc::new(archive));
        }
        Err(e) => log!("watch"; "reopen failed, keeping current archive: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShelfConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_reopen_switches_archive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("A")).unwrap();
        fs::write(dir.path().join("A/Main_Page"), "<p>v1</p>").unwrap();

        let archive = DirArchive::open(dir.path()).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(archive), Arc::new(ShelfConfig::default()));
        let before = dispatcher.session().archive_id.clone();

        reopen(&dispatcher, dir.path(), 1);
        assert_ne!(dispatcher.session().archive_id, before);
    }

    #[test]
    fn test_broken_manifest_keeps_archive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("A")).unwrap();
        fs::write(dir.path().join("A/Main_Page"), "<p>v1</p>").unwrap();

        let archive = DirArchive::open(dir.path()).unwrap();
        let dispatcher = Dispatcher::new(Arc::new(archive), Arc::new(ShelfConfig::default()));
        let before = dispatcher.session().archive_id.clone();

        fs::write(dir.path().join("archive.toml"), "name = [").unwrap();
        reopen(&dispatcher, dir.path(), 1);
        assert_eq!(dispatcher.session().archive_id, before);
    }

    #[test]
    fn test_run_stops_on_shutdown_signal() {
        let dir = TempDir::new().unwrap();
        let archive = DirArchive::open(dir.path()).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(archive),
            Arc::new(ShelfConfig::default()),
        ));

        let (tx, rx) = channel::unbounded();
        tx.send(()).unwrap();
        run(dispatcher, dir.path().to_path_buf(), rx).unwrap();
    }
}
