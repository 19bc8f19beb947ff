//! Request dispatcher.
//!
//! Resolves a path against the current session and produces exactly one
//! terminal response for it. Two delivery paths share the lookup:
//!
//! - proxied: [`Dispatcher::resolve`] answers the content channel; documents
//!   are transformed on a separate task and collected through the
//!   [`TransformMailbox`] with a timeout
//! - direct: [`Dispatcher::display`] writes to a [`Surface`] and starts
//!   image extraction
//!
//! Every error ends only the request it belongs to.

mod mailbox;

pub use mailbox::{PendingTransform, RequestId, TransformMailbox};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use arc_swap::ArcSwap;

use crate::archive::{Archive, ArchiveId, DirectoryEntry, follow_redirects};
use crate::channel::ContentChannelMessage;
use crate::config::{ImageDisplay, ShelfConfig};
use crate::core::ResolveError;
use crate::images::ImageEngine;
use crate::session::SessionContext;
use crate::style::StyleCache;
use crate::surface::Surface;
use crate::transform::{DeliveryMode, MathMarkers, materialize_direct, transform};
use crate::utils::mime::{self, ContentClass};
use crate::utils::path::{normalize_request_path, safe_filename};
use crate::{debug, log};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Asked by this process for its own surface.
    Direct,
    /// Asked over the content channel.
    Proxy,
}

#[derive(Debug, Clone)]
pub struct ContentRequest {
    pub title: String,
    pub origin: Origin,
    pub search: Option<String>,
}

impl ContentRequest {
    pub fn new(title: impl Into<String>, origin: Origin) -> Self {
        Self {
            title: title.into(),
            origin,
            search: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Download { filename: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalResponse {
    Content {
        mimetype: String,
        body: Body,
        disposition: Disposition,
    },
    Redirect {
        to: String,
    },
    NotFound,
}

impl TerminalResponse {
    fn inline(mimetype: impl Into<String>, body: Body) -> Self {
        Self::Content {
            mimetype: mimetype.into(),
            body,
            disposition: Disposition::Inline,
        }
    }

    /// Answer for a document that could not be produced in time or at all.
    fn empty_document() -> Self {
        Self::inline(mime::types::HTML, Body::Text(String::new()))
    }
}

/// What a direct-mode display ended with.
pub enum DisplayOutcome {
    Document {
        title: String,
        engine: ImageEngine,
        math: MathMarkers,
    },
    Downloaded {
        filename: String,
    },
    NotFound,
}

pub struct Dispatcher {
    session: ArcSwap<SessionContext>,
    styles: StyleCache,
    mailbox: Arc<TransformMailbox>,
    config: Arc<ShelfConfig>,
    next_request: AtomicU64,
}

impl Dispatcher {
    pub fn new(archive: Arc<dyn Archive>, config: Arc<ShelfConfig>) -> Self {
        let session = SessionContext::new(archive, config.clone());
        let styles = StyleCache::new();
        styles.invalidate(&session.archive_id);
        Self {
            session: ArcSwap::from_pointee(session),
            styles,
            mailbox: Arc::new(TransformMailbox::new()),
            config,
            next_request: AtomicU64::new(1),
        }
    }

    /// The current session. Holders keep a consistent view across a switch.
    pub fn session(&self) -> Arc<SessionContext> {
        self.session.load_full()
    }

    pub fn styles(&self) -> &StyleCache {
        &self.styles
    }

    pub fn mailbox(&self) -> &TransformMailbox {
        &self.mailbox
    }

    /// Install a new archive. The style cache is emptied and bound to the
    /// new archive id; the old session's blobs go away with the last user.
    pub fn switch_archive(&self, archive: Arc<dyn Archive>) -> ArchiveId {
        let session = SessionContext::new(archive, self.config.clone());
        let id = session.archive_id.clone();
        self.styles.invalidate(&id);
        self.session.store(Arc::new(session));
        log!("dispatch"; "switched to archive {}", id);
        id
    }

    /// Answer one content channel message.
    pub async fn handle_message(&self, message: ContentChannelMessage) -> ContentChannelMessage {
        match message {
            ContentChannelMessage::AskForContent { title, search, .. } => {
                let request = ContentRequest {
                    title: title.clone(),
                    origin: Origin::Proxy,
                    search,
                };
                let response = self.resolve(request).await;
                ContentChannelMessage::from_response(
                    title,
                    response,
                    self.config.reader.image_display,
                )
            }
            other => {
                log!("dispatch"; "ignoring unexpected {} message", action_name(&other));
                ContentChannelMessage::not_found(other.title())
            }
        }
    }

    /// Resolve a request to its terminal response.
    pub async fn resolve(&self, request: ContentRequest) -> TerminalResponse {
        let session = self.session();

        let Some(normalized) = normalize_request_path(&request.title) else {
            log!("dispatch"; "rejected path {:?}", request.title);
            return TerminalResponse::NotFound;
        };
        let path = normalized.path;
        if let Some(search) = request.search.as_deref().or(normalized.search.as_deref()) {
            debug!("dispatch"; "{} with query {}", path, search);
        }

        let entry = match session.archive.entry_by_path(&path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("dispatch"; "{}", ResolveError::NotFound(path));
                return TerminalResponse::NotFound;
            }
            Err(e) => {
                log!("dispatch"; "{}: {}", path, e);
                return TerminalResponse::NotFound;
            }
        };

        if entry.is_redirect() {
            return match follow_redirects(session.archive.as_ref(), entry).await {
                Ok(Some(target)) => TerminalResponse::Redirect { to: target.path() },
                Ok(None) => {
                    log!("dispatch"; "{}", ResolveError::RedirectUnresolved(path));
                    TerminalResponse::NotFound
                }
                Err(e) => {
                    log!("dispatch"; "{}: {}", path, e);
                    TerminalResponse::NotFound
                }
            };
        }

        match mime::classify(&entry.mimetype) {
            ContentClass::Document => match self.document(&session, entry, request.origin).await {
                Ok(html) => TerminalResponse::inline(mime::types::HTML, Body::Text(html)),
                Err(e) => {
                    log!("dispatch"; "{}: {}", path, e);
                    TerminalResponse::empty_document()
                }
            },
            class => match self.asset(&session, &entry, class).await {
                Ok(response) => response,
                Err(e) => {
                    log!("dispatch"; "{}: {}", path, e);
                    TerminalResponse::NotFound
                }
            },
        }
    }

    async fn document(
        &self,
        session: &Arc<SessionContext>,
        entry: DirectoryEntry,
        origin: Origin,
    ) -> Result<String, ResolveError> {
        if origin == Origin::Direct {
            let raw = session.archive.read_text(&entry).await?;
            let doc = transform(&raw, &entry, session, DeliveryMode::Direct);
            return Ok(materialize_direct(&doc.html, session, &self.styles).await);
        }

        let id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let rx = self.mailbox.register(id);

        let task_session = session.clone();
        let task_mailbox = self.mailbox.clone();
        let task_entry = entry.clone();
        tokio::spawn(async move {
            let result = match task_session.archive.read_text(&task_entry).await {
                Ok(raw) => {
                    let doc = transform(&raw, &task_entry, &task_session, DeliveryMode::Proxied);
                    Ok(PendingTransform {
                        html: doc.html,
                        dir_entry: task_entry,
                    })
                }
                Err(e) => Err(ResolveError::from(e)),
            };
            if !task_mailbox.deliver(id, result) {
                debug!("dispatch"; "{} finished after its request gave up", id);
            }
        });

        let timeout = self.config.serve.transform_timeout();
        let delivered = self.mailbox.collect(id, rx, &entry, timeout).await?;
        Ok(delivered.html)
    }

    async fn asset(
        &self,
        session: &SessionContext,
        entry: &DirectoryEntry,
        class: ContentClass,
    ) -> Result<TerminalResponse, ResolveError> {
        match class {
            ContentClass::Stylesheet => {
                let slot = self.styles.resolve(session, &entry.path()).await;
                let body = slot
                    .handle()
                    .and_then(|handle| session.blobs.get(handle.as_str()))
                    .map_or_else(
                        || Body::Text(String::new()),
                        |blob| Body::Bytes(blob.bytes.to_vec()),
                    );
                Ok(TerminalResponse::inline(entry.mimetype.clone(), body))
            }
            ContentClass::Download => {
                let filename = safe_filename(&entry.path());
                let bytes = session.archive.read_binary(entry).await?;
                Ok(TerminalResponse::Content {
                    mimetype: mime::for_download(&entry.mimetype, &filename).to_string(),
                    body: Body::Bytes(bytes),
                    disposition: Disposition::Download { filename },
                })
            }
            _ => {
                let bytes = session.archive.read_binary(entry).await?;
                Ok(TerminalResponse::inline(entry.mimetype.clone(), Body::Bytes(bytes)))
            }
        }
    }

    /// Show `path` on `surface`.
    ///
    /// Documents are written and their images scheduled according to the
    /// image display mode; anything else goes through the surface's
    /// save-to-disk flow. A path that cannot be shown produces a not-found
    /// notice on the surface.
    pub async fn display(&self, path: &str, surface: Arc<dyn Surface>) -> Result<DisplayOutcome> {
        let session = self.session();
        let archive_name = session.archive_id.name().to_string();

        let entry = match normalize_request_path(path) {
            Some(normalized) => session.resolve_entry(&normalized.path).await,
            None => Err(ResolveError::NotFound(path.to_string())),
        };
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log!("dispatch"; "{}", e);
                surface.show_not_found(path, &archive_name)?;
                return Ok(DisplayOutcome::NotFound);
            }
        };

        if mime::classify(&entry.mimetype) != ContentClass::Document {
            let filename = safe_filename(&entry.path());
            let bytes = match session.archive.read_binary(&entry).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log!("dispatch"; "{}: {}", entry.path(), e);
                    surface.show_not_found(path, &archive_name)?;
                    return Ok(DisplayOutcome::NotFound);
                }
            };
            let mimetype = mime::for_download(&entry.mimetype, &filename);
            surface.save_download(&filename, mimetype, &bytes)?;
            return Ok(DisplayOutcome::Downloaded { filename });
        }

        let raw = match session.archive.read_text(&entry).await {
            Ok(raw) => raw,
            Err(e) => {
                log!("dispatch"; "{}: {}", entry.path(), e);
                surface.show_not_found(path, &archive_name)?;
                return Ok(DisplayOutcome::NotFound);
            }
        };

        let doc = transform(&raw, &entry, &session, DeliveryMode::Direct);
        let html = materialize_direct(&doc.html, &session, &self.styles).await;
        surface.write_document(&entry.title, &html)?;

        let engine = ImageEngine::new(session.clone(), surface, &doc.images);
        match session.config.reader.image_display {
            _ if doc.is_landing => engine.extract_all(),
            ImageDisplay::All => engine.extract_all(),
            ImageDisplay::Progressive => engine.start(),
            ImageDisplay::Manual => {}
        }
        debug!("dispatch"; "displayed {} with {} images", entry.path(), engine.len());

        Ok(DisplayOutcome::Document {
            title: entry.title,
            engine,
            math: doc.math,
        })
    }
}

fn action_name(message: &ContentChannelMessage) -> &'static str {
    match message {
        ContentChannelMessage::AskForContent { .. } => "askForContent",
        ContentChannelMessage::GiveContent { .. } => "giveContent",
        ContentChannelMessage::SendRedirect { .. } => "sendRedirect",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::memory::MemoryArchive;
    use crate::images::{ImageState, NodeId};
    use crate::surface::FileSurface;
    use std::time::Duration;
    use tempfile::TempDir;

    const MAIN_PAGE: &str = concat!(
        "<html><head><title>Main</title>",
        r#"<link rel="stylesheet" href="../-/s/style.css">"#,
        "</head><body><h1>Main Page</h1>",
        r#"<img src="../I/logo.png"><a href="Other">Other</a>"#,
        "</body></html>",
    );

    fn archive() -> MemoryArchive {
        MemoryArchive::new("wiki")
            .with_html("A/Main_Page", MAIN_PAGE)
            .with_html("A/Other", "<html><head></head><body>Other</body></html>")
            .with_redirect("A/Home", "A/Main_Page")
            .with_redirect("A/Loop", "A/Loop")
            .with_file("-/s/style.css", "text/css", b"h1{color:red}".to_vec())
            .with_file("I/logo.png", "image/png", vec![0x89, b'P', b'N', b'G'])
            .with_file("A/Book.epub", "application/octet-stream", b"PK".to_vec())
            .with_broken("A/Broken", "text/html")
    }

    fn dispatcher_with(archive: MemoryArchive, config: ShelfConfig) -> (Dispatcher, Arc<MemoryArchive>) {
        let archive = Arc::new(archive);
        (Dispatcher::new(archive.clone(), Arc::new(config)), archive)
    }

    fn dispatcher() -> (Dispatcher, Arc<MemoryArchive>) {
        dispatcher_with(archive(), ShelfConfig::default())
    }

    fn text(response: TerminalResponse) -> String {
        match response {
            TerminalResponse::Content {
                body: Body::Text(text),
                ..
            } => text,
            other => panic!("expected text content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_becomes_send_redirect() {
        let (dispatcher, _) = dispatcher();
        let answer = dispatcher
            .handle_message(ContentChannelMessage::ask("A/Home"))
            .await;
        assert_eq!(
            answer,
            ContentChannelMessage::SendRedirect {
                title: "A/Home".into(),
                redirect_url: "A/Main_Page".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_direct_main_page_is_html() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .resolve(ContentRequest::new("A/Main_Page", Origin::Direct))
            .await;
        let html = text(response);
        assert!(html.contains("Main Page"));
        assert!(html.contains(r#"href="/_blob/"#));
        assert!(html.contains(r#"data-archive-url="I/logo.png""#));
    }

    #[tokio::test]
    async fn test_proxied_main_page() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .resolve(ContentRequest::new("/A/Main_Page", Origin::Proxy))
            .await;
        let html = text(response);
        assert!(html.contains(r#"href="/-/s/style.css""#));
        assert!(html.contains(r#"src="/I/logo.png""#));
        assert_eq!(dispatcher.mailbox().pending(), 0);
    }

    #[tokio::test]
    async fn test_stylesheet_read_once() {
        let (dispatcher, archive) = dispatcher();
        let ask = || ContentRequest::new("-/s/style.css", Origin::Proxy);

        let first = dispatcher.resolve(ask()).await;
        let second = dispatcher.resolve(ask()).await;

        assert_eq!(first, second);
        assert_eq!(archive.reads_of("-/s/style.css"), 1);
        assert_eq!(dispatcher.styles().stats().hits, 1);

        let session = dispatcher.session();
        let a = dispatcher.styles().resolve(&session, "-/s/style.css").await;
        let b = dispatcher.styles().resolve(&session, "-/s/style.css").await;
        assert!(a.handle().unwrap().ptr_eq(b.handle().unwrap()));
    }

    #[tokio::test]
    async fn test_missing_path_wire_format() {
        let (dispatcher, _) = dispatcher();
        let answer = dispatcher
            .handle_message(ContentChannelMessage::ask("A/Does_Not_Exist"))
            .await;
        assert_eq!(
            serde_json::to_value(&answer).unwrap(),
            serde_json::json!({
                "action": "giveContent",
                "title": "A/Does_Not_Exist",
                "content": ""
            })
        );
    }

    #[tokio::test]
    async fn test_self_redirect_is_not_found() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .resolve(ContentRequest::new("A/Loop", Origin::Proxy))
            .await;
        assert_eq!(response, TerminalResponse::NotFound);
    }

    #[tokio::test]
    async fn test_escaping_path_is_not_found() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .resolve(ContentRequest::new("A/../../etc/passwd", Origin::Proxy))
            .await;
        assert_eq!(response, TerminalResponse::NotFound);
    }

    #[tokio::test]
    async fn test_broken_document_answers_empty() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .resolve(ContentRequest::new("A/Broken", Origin::Proxy))
            .await;
        assert_eq!(response, TerminalResponse::empty_document());
        assert_eq!(dispatcher.mailbox().pending(), 0);
    }

    #[tokio::test]
    async fn test_transform_timeout_answers_empty() {
        let mut config = ShelfConfig::default();
        config.serve.transform_timeout_ms = 20;
        let archive = archive().with_read_delay(Duration::from_millis(500));
        let (dispatcher, _) = dispatcher_with(archive, config);

        let response = dispatcher
            .resolve(ContentRequest::new("A/Main_Page", Origin::Proxy))
            .await;
        assert_eq!(response, TerminalResponse::empty_document());
        assert_eq!(dispatcher.mailbox().pending(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_documents_stay_apart() {
        let (dispatcher, _) = dispatcher();
        let (main, other) = tokio::join!(
            dispatcher.resolve(ContentRequest::new("A/Main_Page", Origin::Proxy)),
            dispatcher.resolve(ContentRequest::new("A/Other", Origin::Proxy)),
        );
        assert!(text(main).contains("Main Page"));
        let other = text(other);
        assert!(other.contains("Other") && !other.contains("Main Page"));
    }

    #[tokio::test]
    async fn test_download_disposition() {
        let (dispatcher, _) = dispatcher();
        let response = dispatcher
            .resolve(ContentRequest::new("A/Book.epub", Origin::Proxy))
            .await;
        assert_eq!(
            response,
            TerminalResponse::Content {
                mimetype: "application/epub+zip".into(),
                body: Body::Bytes(b"PK".to_vec()),
                disposition: Disposition::Download {
                    filename: "Book.epub".into()
                },
            }
        );
    }

    #[tokio::test]
    async fn test_switch_invalidates_styles() {
        let (dispatcher, first) = dispatcher();
        dispatcher
            .resolve(ContentRequest::new("-/s/style.css", Origin::Proxy))
            .await;
        assert_eq!(dispatcher.styles().len(), 1);

        let second = Arc::new(archive());
        let old_id = dispatcher.session().archive_id.clone();
        let new_id = dispatcher.switch_archive(second.clone());
        assert_ne!(old_id, new_id);
        assert!(dispatcher.styles().is_empty());

        dispatcher
            .resolve(ContentRequest::new("-/s/style.css", Origin::Proxy))
            .await;
        assert_eq!(first.reads_of("-/s/style.css"), 1);
        assert_eq!(second.reads_of("-/s/style.css"), 1);
    }

    #[tokio::test]
    async fn test_display_landing_extracts_all_images() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher();
        let surface = Arc::new(FileSurface::new(dir.path()));

        let outcome = dispatcher
            .display("A/Main_Page", surface.clone())
            .await
            .unwrap();
        let DisplayOutcome::Document { engine, title, .. } = outcome else {
            panic!("expected a document");
        };
        assert_eq!(title, "Main Page");
        engine.wait_idle().await;

        assert_eq!(engine.state_of(NodeId(0)), Some(ImageState::Displayed));
        assert_eq!(surface.displayed(), vec![NodeId(0)]);

        let index = surface.flush(&dispatcher.session().blobs).unwrap();
        let html = std::fs::read_to_string(index).unwrap();
        assert!(html.contains(r#"<img src="blobs/"#));
        assert!(!html.contains("/_blob/"));
    }

    #[tokio::test]
    async fn test_display_manual_mode_waits_for_request() {
        let dir = TempDir::new().unwrap();
        let mut config = ShelfConfig::default();
        config.reader.image_display = ImageDisplay::Manual;
        let archive = archive().with_landing("A/Other");
        let (dispatcher, _) = dispatcher_with(archive, config);
        let surface = Arc::new(FileSurface::new(dir.path()));

        let outcome = dispatcher.display("A/Main_Page", surface).await.unwrap();
        let DisplayOutcome::Document { engine, .. } = outcome else {
            panic!("expected a document");
        };
        engine.wait_idle().await;
        assert_eq!(engine.state_of(NodeId(0)), Some(ImageState::Pending));

        engine.request(NodeId(0));
        engine.wait_idle().await;
        assert_eq!(engine.state_of(NodeId(0)), Some(ImageState::Displayed));
    }

    #[tokio::test]
    async fn test_display_download_and_not_found() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher();
        let surface = Arc::new(FileSurface::new(dir.path()));

        let outcome = dispatcher.display("A/Book.epub", surface.clone()).await.unwrap();
        assert!(matches!(outcome, DisplayOutcome::Downloaded { ref filename } if filename == "Book.epub"));
        assert!(dir.path().join("Book.epub").exists());

        let outcome = dispatcher.display("A/Gone", surface.clone()).await.unwrap();
        assert!(matches!(outcome, DisplayOutcome::NotFound));
        assert_eq!(surface.title(), "Not found");
    }
}
