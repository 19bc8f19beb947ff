//! Extraction scheduler.
//!
//! All bookkeeping lives behind one mutex; extraction itself runs on tokio
//! tasks outside the lock. A scroll marks queued work as abandoned and
//! re-plans after a short debounce. Extractions already running always
//! finish.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{
    ImagePlaceholder, ImageQueueEntry, ImageState, NodeId, ScrollDirection, Viewport,
};
use crate::session::SessionContext;
use crate::surface::{FADE_IN_STYLE, Surface};
use crate::{debug, log};

/// Result of one scheduling pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Nodes inside the pass viewport, now queued.
    pub visible: Vec<NodeId>,
    /// Pending nodes outside the pass viewport.
    pub remaining: Vec<NodeId>,
}

#[derive(Clone)]
pub struct ImageEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    session: Arc<SessionContext>,
    surface: Arc<dyn Surface>,
    budget: usize,
    debounce: Duration,
    state: Mutex<EngineState>,
    idle: Notify,
}

struct EngineState {
    /// Sorted by node.
    entries: Vec<ImageQueueEntry>,
    queue: VecDeque<NodeId>,
    busy: usize,
    peak_busy: usize,
    abandon: bool,
    scroll_epoch: u64,
    rescan_pending: bool,
    last_scroll_top: Option<f64>,
}

impl EngineState {
    fn entry_mut(&mut self, node: NodeId) -> Option<&mut ImageQueueEntry> {
        let index = self.entries.binary_search_by_key(&node, |e| e.node).ok()?;
        self.entries.get_mut(index)
    }

    fn pending(&self) -> Vec<NodeId> {
        self.entries
            .iter()
            .filter(|e| e.state == ImageState::Pending)
            .map(|e| e.node)
            .collect()
    }

    fn enqueue(&mut self, node: NodeId, front: bool) -> bool {
        let Some(entry) = self.entry_mut(node) else {
            return false;
        };
        if entry.queued || entry.state != ImageState::Pending {
            return false;
        }
        entry.queued = true;
        entry.state = ImageState::Queued;
        if front {
            self.queue.push_front(node);
        } else {
            self.queue.push_back(node);
        }
        true
    }

    /// Move queued nodes into extraction while the budget allows.
    fn drain(&mut self, budget: usize) -> Vec<(NodeId, String)> {
        let mut started = Vec::new();
        while !self.abandon && self.busy < budget {
            let Some(node) = self.queue.pop_front() else {
                break;
            };
            let Some(entry) = self.entry_mut(node) else {
                continue;
            };
            if entry.state != ImageState::Queued {
                continue;
            }
            entry.state = ImageState::Extracting;
            let path = entry.source_path.clone();
            self.busy += 1;
            self.peak_busy = self.peak_busy.max(self.busy);
            started.push((node, path));
        }
        started
    }

    /// Return every queued node to pending.
    fn clear_queue(&mut self) -> usize {
        let nodes: Vec<_> = self.queue.drain(..).collect();
        let mut cleared = 0;
        for node in nodes {
            if let Some(entry) = self.entry_mut(node)
                && entry.state == ImageState::Queued
            {
                entry.state = ImageState::Pending;
                entry.queued = false;
                cleared += 1;
            }
        }
        cleared
    }

    fn settled(&self) -> bool {
        self.busy == 0 && self.queue.is_empty() && !self.rescan_pending
    }
}

impl ImageEngine {
    pub fn new(
        session: Arc<SessionContext>,
        surface: Arc<dyn Surface>,
        images: &[ImagePlaceholder],
    ) -> Self {
        let mut entries: Vec<_> = images
            .iter()
            .map(|img| ImageQueueEntry {
                node: img.node,
                source_path: img.path.clone(),
                queued: false,
                state: ImageState::Pending,
            })
            .collect();
        entries.sort_by_key(|e| e.node);
        entries.dedup_by_key(|e| e.node);

        let images_config = &session.config.images;
        let budget = images_config.budget.max(1);
        let debounce = images_config.debounce();

        Self {
            inner: Arc::new(EngineInner {
                session,
                surface,
                budget,
                debounce,
                state: Mutex::new(EngineState {
                    entries,
                    queue: VecDeque::new(),
                    busy: 0,
                    peak_busy: 0,
                    abandon: false,
                    scroll_epoch: 0,
                    rescan_pending: false,
                    last_scroll_top: None,
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Initial plan after a document is shown: the viewport, then two
    /// viewport heights below it.
    pub fn start(&self) {
        let viewport = self.inner.surface.viewport();
        self.inner.state.lock().last_scroll_top = Some(viewport.top);
        self.pass(viewport, 0.0);
        self.pass(
            viewport.extend(ScrollDirection::Down, 2.0 * viewport.height),
            0.0,
        );
        self.notify_if_settled();
    }

    /// Queue those of `nodes` that lie within the current viewport grown by
    /// `margin`. Nodes already queued or finished are skipped.
    pub fn schedule(&self, nodes: &[NodeId], margin: f64) -> Partition {
        let viewport = self.inner.surface.viewport();
        let partition = self.schedule_in(viewport, nodes, margin);
        self.notify_if_settled();
        partition
    }

    /// Scheduling pass over every pending node.
    fn pass(&self, viewport: Viewport, margin: f64) -> Partition {
        let pending = self.inner.state.lock().pending();
        self.schedule_in(viewport, &pending, margin)
    }

    fn schedule_in(&self, viewport: Viewport, nodes: &[NodeId], margin: f64) -> Partition {
        let candidates: Vec<NodeId> = {
            let state = self.inner.state.lock();
            let pending = state.pending();
            nodes
                .iter()
                .copied()
                .filter(|node| pending.binary_search(node).is_ok())
                .collect()
        };

        let mut partition = Partition::default();
        for node in candidates {
            let visible = self
                .inner
                .surface
                .bounds(node)
                .is_some_and(|b| viewport.contains(b, margin));
            if visible {
                partition.visible.push(node);
            } else {
                partition.remaining.push(node);
            }
        }

        let started = {
            let mut state = self.inner.state.lock();
            partition.visible.retain(|&node| state.enqueue(node, false));
            state.drain(self.inner.budget)
        };
        debug!("images"; "pass: {} queued, {} outside", partition.visible.len(), partition.remaining.len());

        self.spawn_all(started);
        partition
    }

    /// Discard queued work. Running extractions finish, and the next
    /// scheduling pass starts from the returned pending nodes.
    pub fn abandon(&self) -> usize {
        let cleared = self.inner.state.lock().clear_queue();
        self.notify_if_settled();
        cleared
    }

    /// React to a scroll: stop dispatching now and re-plan once scrolling
    /// has been quiet for the debounce period.
    pub fn on_scroll(&self) {
        let epoch = {
            let mut state = self.inner.state.lock();
            state.abandon = true;
            state.rescan_pending = true;
            state.scroll_epoch += 1;
            state.scroll_epoch
        };

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(engine.inner.debounce).await;
            engine.rescan(epoch);
        });
    }

    fn rescan(&self, epoch: u64) {
        let viewport = self.inner.surface.viewport();
        let direction = {
            let mut state = self.inner.state.lock();
            if state.scroll_epoch != epoch {
                return;
            }
            let cleared = state.clear_queue();
            state.abandon = false;
            state.rescan_pending = false;

            let direction = match state.last_scroll_top {
                Some(previous) if viewport.top < previous => ScrollDirection::Up,
                _ => ScrollDirection::Down,
            };
            state.last_scroll_top = Some(viewport.top);
            debug!("images"; "scroll settled at {}, {} returned to pending", viewport.top, cleared);
            direction
        };

        self.pass(viewport, 0.0);
        self.pass(viewport.extend(direction, 2.0 * viewport.height), 0.0);
        self.notify_if_settled();
    }

    /// Queue every pending image in document order.
    pub fn extract_all(&self) {
        let started = {
            let mut state = self.inner.state.lock();
            state.abandon = false;
            for node in state.pending() {
                state.enqueue(node, false);
            }
            state.drain(self.inner.budget)
        };
        self.spawn_all(started);
        self.notify_if_settled();
    }

    /// Extract one image ahead of anything queued.
    pub fn request(&self, node: NodeId) -> bool {
        let (queued, started) = {
            let mut state = self.inner.state.lock();
            state.abandon = false;
            let queued = state.enqueue(node, true);
            (queued, state.drain(self.inner.budget))
        };
        self.spawn_all(started);
        queued
    }

    /// Nothing running, nothing queued, no re-plan pending.
    pub fn settled(&self) -> bool {
        self.inner.state.lock().settled()
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.settled() {
                return;
            }
            notified.await;
        }
    }

    pub fn states(&self) -> Vec<(NodeId, ImageState)> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|e| (e.node, e.state))
            .collect()
    }

    pub fn state_of(&self, node: NodeId) -> Option<ImageState> {
        self.inner
            .state
            .lock()
            .entry_mut(node)
            .map(|e| e.state)
    }

    /// Highest number of simultaneous extractions seen.
    pub fn peak_busy(&self) -> usize {
        self.inner.state.lock().peak_busy
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify_if_settled(&self) {
        if self.settled() {
            self.inner.idle.notify_waiters();
        }
    }

    fn spawn_all(&self, started: Vec<(NodeId, String)>) {
        for (node, path) in started {
            spawn_extraction(self.inner.clone(), node, path);
        }
    }
}

fn spawn_extraction(inner: Arc<EngineInner>, node: NodeId, path: String) {
    tokio::spawn(async move {
        let outcome = inner.extract(node, &path).await;
        if let Err(e) = &outcome {
            log!("images"; "{} ({}) failed: {}", node, path, e);
        }

        let (next, settled) = {
            let mut state = inner.state.lock();
            if let Some(entry) = state.entry_mut(node) {
                entry.state = match outcome {
                    Ok(()) => ImageState::Displayed,
                    Err(_) => ImageState::Failed,
                };
            }
            state.busy = state.busy.saturating_sub(1);
            let next = state.drain(inner.budget);
            (next, state.settled())
        };

        for (node, path) in next {
            spawn_extraction(inner.clone(), node, path);
        }
        if settled {
            inner.idle.notify_waiters();
        }
    });
}

impl EngineInner {
    async fn extract(&self, node: NodeId, path: &str) -> anyhow::Result<()> {
        let handle = self.session.extract(path).await?;
        self.surface.display_image(node, &handle, FADE_IN_STYLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;
    use crate::config::ShelfConfig;
    use crate::surface::{FileSurface, ROW_HEIGHT};
    use tempfile::TempDir;

    fn placeholders(count: usize) -> Vec<ImagePlaceholder> {
        (0..count)
            .map(|i| ImagePlaceholder {
                node: NodeId(i),
                path: format!("I/{i}.png"),
            })
            .collect()
    }

    fn archive_with(count: usize) -> MemoryArchive {
        (0..count).fold(MemoryArchive::new("wiki"), |a, i| {
            a.with_file(&format!("I/{i}.png"), "image/png", vec![i as u8; 4])
        })
    }

    fn document(count: usize) -> String {
        let images: String = (0..count)
            .map(|i| format!(r#"<img data-archive-url="I/{i}.png">"#))
            .collect();
        format!("<html><head></head><body>{images}</body></html>")
    }

    struct Fixture {
        engine: ImageEngine,
        archive: Arc<MemoryArchive>,
        surface: Arc<FileSurface>,
        _dir: TempDir,
    }

    fn fixture(archive: MemoryArchive, count: usize, config: ShelfConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(archive);
        let session = Arc::new(SessionContext::new(archive.clone(), Arc::new(config)));
        let surface = Arc::new(FileSurface::new(dir.path()));
        surface.write_document("Doc", &document(count)).unwrap();
        let engine = ImageEngine::new(session, surface.clone(), &placeholders(count));
        Fixture {
            engine,
            archive,
            surface,
            _dir: dir,
        }
    }

    fn all_displayed(engine: &ImageEngine) -> bool {
        engine
            .states()
            .iter()
            .all(|(_, s)| *s == ImageState::Displayed)
    }

    #[tokio::test]
    async fn test_every_visible_image_completes() {
        let f = fixture(archive_with(5), 5, ShelfConfig::default());
        f.engine.start();
        f.engine.wait_idle().await;

        assert!(all_displayed(&f.engine));
        assert_eq!(f.archive.reads(), 5);
        assert_eq!(f.engine.peak_busy(), 1);
        assert_eq!(f.surface.displayed().len(), 5);
    }

    #[tokio::test]
    async fn test_budget_bounds_concurrency() {
        let mut config = ShelfConfig::default();
        config.images.budget = 2;
        let archive = archive_with(6).with_read_delay(Duration::from_millis(5));
        let f = fixture(archive, 6, config);

        f.engine.extract_all();
        f.engine.wait_idle().await;

        assert!(all_displayed(&f.engine));
        assert!(f.engine.peak_busy() <= 2);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_logged() {
        let archive = archive_with(2).with_broken("I/2.png", "image/png");
        let f = fixture(archive, 3, ShelfConfig::default());

        f.engine.extract_all();
        f.engine.wait_idle().await;

        assert_eq!(f.engine.state_of(NodeId(2)), Some(ImageState::Failed));
        assert_eq!(f.engine.state_of(NodeId(0)), Some(ImageState::Displayed));
        assert!(f.engine.settled());
    }

    #[tokio::test]
    async fn test_partition_by_viewport() {
        let f = fixture(archive_with(10), 10, ShelfConfig::default());
        f.surface.set_viewport(Viewport {
            top: 0.0,
            height: 2.0 * ROW_HEIGHT - 1.0,
        });

        let all: Vec<_> = (0..10).map(NodeId).collect();
        let partition = f.engine.schedule(&all, 0.0);
        assert_eq!(partition.visible, vec![NodeId(0), NodeId(1)]);
        assert_eq!(partition.remaining.len(), 8);

        f.engine.wait_idle().await;
        assert_eq!(f.engine.state_of(NodeId(1)), Some(ImageState::Displayed));
        assert_eq!(f.engine.state_of(NodeId(2)), Some(ImageState::Pending));

        let again = f.engine.schedule(&all, 0.0);
        assert!(again.visible.is_empty());
    }

    #[tokio::test]
    async fn test_abandon_returns_queued_to_pending() {
        let archive = archive_with(4).with_read_delay(Duration::from_millis(30));
        let f = fixture(archive, 4, ShelfConfig::default());

        f.engine.extract_all();
        assert_eq!(f.engine.state_of(NodeId(0)), Some(ImageState::Extracting));

        let cleared = f.engine.abandon();
        assert_eq!(cleared, 3);
        f.engine.wait_idle().await;

        assert_eq!(f.engine.state_of(NodeId(0)), Some(ImageState::Displayed));
        for i in 1..4 {
            assert_eq!(f.engine.state_of(NodeId(i)), Some(ImageState::Pending));
        }
    }

    #[tokio::test]
    async fn test_schedule_after_abandon_completes() {
        let archive = archive_with(3).with_read_delay(Duration::from_millis(10));
        let f = fixture(archive, 3, ShelfConfig::default());
        let all: Vec<_> = (0..3).map(NodeId).collect();

        f.engine.schedule(&all, 0.0);
        f.engine.abandon();
        let partition = f.engine.schedule(&all, 0.0);
        assert_eq!(partition.visible, vec![NodeId(1), NodeId(2)]);

        tokio::time::timeout(Duration::from_secs(2), f.engine.wait_idle())
            .await
            .unwrap();
        assert!(all_displayed(&f.engine));
    }

    #[tokio::test]
    async fn test_abandon_before_any_work() {
        let f = fixture(archive_with(3), 3, ShelfConfig::default());
        assert_eq!(f.engine.abandon(), 0);

        let all: Vec<_> = (0..3).map(NodeId).collect();
        f.engine.schedule(&all, 0.0);
        tokio::time::timeout(Duration::from_secs(2), f.engine.wait_idle())
            .await
            .unwrap();
        assert!(all_displayed(&f.engine));
    }

    #[tokio::test]
    async fn test_scroll_burst_replans_once() {
        let mut config = ShelfConfig::default();
        config.images.debounce_ms = 30;
        let f = fixture(archive_with(20), 20, config);
        let viewport = Viewport {
            top: 0.0,
            height: ROW_HEIGHT - 1.0,
        };

        f.surface.set_viewport(Viewport {
            top: 5.0 * ROW_HEIGHT,
            ..viewport
        });
        f.engine.on_scroll();
        f.surface.set_viewport(Viewport {
            top: 15.0 * ROW_HEIGHT,
            ..viewport
        });
        f.engine.on_scroll();

        tokio::time::timeout(Duration::from_secs(2), f.engine.wait_idle())
            .await
            .unwrap();
        // Only the last position was planned.
        assert_eq!(f.engine.state_of(NodeId(15)), Some(ImageState::Displayed));
        for i in 4..=7 {
            assert_eq!(f.engine.state_of(NodeId(i)), Some(ImageState::Pending));
        }
    }

    #[tokio::test]
    async fn test_scroll_replans_after_debounce() {
        let f = fixture(archive_with(20), 20, ShelfConfig::default());
        let viewport = Viewport {
            top: 0.0,
            height: ROW_HEIGHT - 1.0,
        };
        f.surface.set_viewport(viewport);

        f.engine.start();
        f.engine.wait_idle().await;
        // Viewport row plus two heights below.
        assert_eq!(f.engine.state_of(NodeId(0)), Some(ImageState::Displayed));
        assert_eq!(f.engine.state_of(NodeId(10)), Some(ImageState::Pending));

        f.surface.set_viewport(Viewport {
            top: 10.0 * ROW_HEIGHT,
            ..viewport
        });
        f.engine.on_scroll();
        assert!(!f.engine.settled());
        f.engine.wait_idle().await;

        assert_eq!(f.engine.state_of(NodeId(10)), Some(ImageState::Displayed));
        assert_eq!(f.engine.state_of(NodeId(19)), Some(ImageState::Pending));
    }

    #[tokio::test]
    async fn test_manual_request() {
        let f = fixture(archive_with(3), 3, ShelfConfig::default());

        assert!(f.engine.request(NodeId(2)));
        f.engine.wait_idle().await;

        assert_eq!(f.engine.state_of(NodeId(2)), Some(ImageState::Displayed));
        assert_eq!(f.engine.state_of(NodeId(0)), Some(ImageState::Pending));
        assert!(!f.engine.request(NodeId(2)));
    }

    #[tokio::test]
    async fn test_empty_engine_is_settled() {
        let f = fixture(archive_with(0), 0, ShelfConfig::default());
        assert!(f.engine.is_empty());
        f.engine.start();
        f.engine.wait_idle().await;
    }
}
