//! HTTP front end.
//!
//! Browser requests become content channel questions. Nothing here reads
//! the archive directly except blob lookups, which are already extracted
//! bytes in the current session.
//!
//! ```text
//! GET /A/Main_Page ─→ askForContent ─→ Dispatcher ─→ giveContent ─→ 200
//!                                                  └→ sendRedirect ─→ 302
//! ```

mod lifecycle;
mod response;

use crate::{
    blob::BLOB_PREFIX,
    channel::{ChannelHandle, ContentChannelMessage, spawn_dispatch_loop},
    config::ShelfConfig,
    dispatch::Dispatcher,
    embed::lazy_js,
    log,
    transform::{LAZY_SCRIPT_PATH, csp_policy},
    utils::{
        mime::{self, ContentClass},
        path::{encode_path, normalize_request_path, safe_filename},
    },
};
use anyhow::Result;
use crossbeam::channel;
use response::Extra;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tiny_http::{Request, Server};

/// Requests queued toward the dispatcher before HTTP workers block.
const CHANNEL_BUFFER: usize = 64;

/// Everything an HTTP worker needs. Cheap to clone.
#[derive(Clone)]
pub struct ServeContext {
    pub channel: ChannelHandle,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<ShelfConfig>,
}

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    addr: SocketAddr,
    shutdown_rx: channel::Receiver<()>,
}

/// Bind the HTTP server without starting the request loop
pub fn bind_server(config: &ShelfConfig) -> Result<BoundServer> {
    let (server, addr) = lifecycle::bind_with_retry(config.serve.interface, config.serve.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    lifecycle::register_server_for_shutdown(Arc::clone(&server), shutdown_tx);

    log!("serve"; "http://{}", addr);

    Ok(BoundServer {
        server,
        addr,
        shutdown_rx,
    })
}

impl BoundServer {
    /// Get the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the request loop (blocking).
    ///
    /// The dispatcher runs on `runtime`; HTTP workers are plain threads
    /// that block on its answers.
    pub fn run(
        self,
        dispatcher: Arc<Dispatcher>,
        runtime: &tokio::runtime::Runtime,
        archive_root: PathBuf,
    ) -> Result<()> {
        let config = dispatcher.session().config.clone();
        let (channel, dispatch_task) =
            runtime.block_on(async { spawn_dispatch_loop(Arc::clone(&dispatcher), CHANNEL_BUFFER) });

        let watcher = lifecycle::spawn_watcher(
            Arc::clone(&dispatcher),
            archive_root,
            config.serve.watch,
            self.shutdown_rx,
        );

        let ctx = ServeContext {
            channel,
            dispatcher,
            config,
        };
        run_request_loop(&self.server, ctx)?;

        lifecycle::wait_for_shutdown(watcher);
        dispatch_task.abort();
        Ok(())
    }
}

fn run_request_loop(server: &Server, ctx: ServeContext) -> Result<()> {
    // Documents may wait on a transform; keep stylesheets and images flowing.
    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build()?;

    for request in server.incoming_requests() {
        let ctx = ctx.clone();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &ctx) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

/// Handle a single HTTP request
fn handle_request(request: Request, ctx: &ServeContext) -> Result<()> {
    // Early exit if shutdown requested
    if crate::core::is_shutdown() {
        return response::respond_unavailable(request);
    }

    let url = request.url().to_string();
    let path_only = url.split(['?', '#']).next().unwrap_or_default();

    if path_only == "/" {
        let session = ctx.dispatcher.session();
        return response::respond_redirect(request, &encode_path(session.landing_page()));
    }

    if path_only == LAZY_SCRIPT_PATH {
        return response::respond_script(request, lazy_js());
    }

    // Bytes already extracted into this session.
    if path_only.starts_with(BLOB_PREFIX) {
        return match ctx.dispatcher.session().blobs.get(path_only) {
            Some(blob) => response::respond_bytes(
                request,
                &blob.mimetype,
                blob.bytes.to_vec(),
                Extra::default(),
            ),
            None => response::respond_not_found(request),
        };
    }

    match ctx.channel.ask_blocking(ContentChannelMessage::ask(url.clone())) {
        ContentChannelMessage::GiveContent {
            mimetype: Some(mimetype),
            content,
            ..
        } if !content.is_empty() => {
            let extra = match mime::classify(&mimetype) {
                ContentClass::Document if ctx.config.security.inject_csp => Extra {
                    csp: Some(csp_policy(&ctx.config.security)),
                    ..Extra::default()
                },
                ContentClass::Download => Extra {
                    attachment: normalize_request_path(&url).map(|p| safe_filename(&p.path)),
                    ..Extra::default()
                },
                _ => Extra::default(),
            };
            response::respond_bytes(request, &mimetype, content.into_bytes(), extra)
        }
        ContentChannelMessage::SendRedirect { redirect_url, .. } => {
            response::respond_redirect(request, &encode_path(&redirect_url))
        }
        _ => response::respond_not_found(request),
    }
}
