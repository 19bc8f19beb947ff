//! Content channel protocol.
//!
//! The HTTP front end talks to the dispatcher only through JSON-shaped
//! messages:
//!
//! ```json
//! { "action": "askForContent", "title": "A/Main_Page" }
//! { "action": "giveContent", "title": "A/Main_Page", "mimetype": "text/html", "content": "..." }
//! { "action": "sendRedirect", "title": "A/Home", "redirectUrl": "A/Main_Page" }
//! ```
//!
//! HTTP threads are blocking (rayon); the dispatcher runs on tokio. A
//! bounded mpsc channel carries each question together with a one-shot
//! reply slot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ImageDisplay;
use crate::dispatch::{Body, Dispatcher, TerminalResponse};
use crate::utils::mime::{self, ContentClass};
use crate::{debug, log};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

impl From<Body> for Content {
    fn from(body: Body) -> Self {
        match body {
            Body::Text(text) => Self::Text(text),
            Body::Bytes(bytes) => Self::Bytes(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContentChannelMessage {
    AskForContent {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor_target: Option<String>,
    },
    GiveContent {
        title: String,
        /// Absent when the title was not found.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mimetype: Option<String>,
        content: Content,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_display: Option<ImageDisplay>,
    },
    SendRedirect {
        title: String,
        redirect_url: String,
    },
}

impl ContentChannelMessage {
    pub fn ask(title: impl Into<String>) -> Self {
        Self::AskForContent {
            title: title.into(),
            search: None,
            anchor_target: None,
        }
    }

    /// Empty `giveContent`: the answer for anything that cannot be served.
    pub fn not_found(title: impl Into<String>) -> Self {
        Self::GiveContent {
            title: title.into(),
            mimetype: None,
            content: Content::Text(String::new()),
            image_display: None,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::AskForContent { title, .. }
            | Self::GiveContent { title, .. }
            | Self::SendRedirect { title, .. } => title,
        }
    }

    /// Answer to an `askForContent` for `title`.
    pub fn from_response(
        title: String,
        response: TerminalResponse,
        image_display: ImageDisplay,
    ) -> Self {
        match response {
            TerminalResponse::Content { mimetype, body, .. } => {
                let is_document = mime::classify(&mimetype) == ContentClass::Document;
                Self::GiveContent {
                    title,
                    mimetype: Some(mimetype),
                    content: body.into(),
                    image_display: is_document.then_some(image_display),
                }
            }
            TerminalResponse::Redirect { to } => Self::SendRedirect {
                title,
                redirect_url: to,
            },
            TerminalResponse::NotFound => Self::not_found(title),
        }
    }
}

/// One question from the front end with its reply slot.
pub struct ChannelRequest {
    pub message: ContentChannelMessage,
    pub reply: oneshot::Sender<ContentChannelMessage>,
}

/// Front-end side of the channel. Cheap to clone, one per HTTP worker.
#[derive(Clone)]
pub struct ChannelHandle {
    tx: mpsc::Sender<ChannelRequest>,
}

impl ChannelHandle {
    /// Ask from a thread outside the runtime. Always returns an answer:
    /// a closed channel or dropped reply becomes an empty `giveContent`.
    pub fn ask_blocking(&self, message: ContentChannelMessage) -> ContentChannelMessage {
        let title = message.title().to_string();
        let (reply, rx) = oneshot::channel();

        if self.tx.blocking_send(ChannelRequest { message, reply }).is_err() {
            log!("channel"; "dispatcher is gone, {} answered empty", title);
            return ContentChannelMessage::not_found(title);
        }
        rx.blocking_recv().unwrap_or_else(|_| {
            log!("channel"; "no reply for {}", title);
            ContentChannelMessage::not_found(title)
        })
    }

    pub async fn ask(&self, message: ContentChannelMessage) -> ContentChannelMessage {
        let title = message.title().to_string();
        let (reply, rx) = oneshot::channel();

        if self.tx.send(ChannelRequest { message, reply }).await.is_err() {
            log!("channel"; "dispatcher is gone, {} answered empty", title);
            return ContentChannelMessage::not_found(title);
        }
        rx.await.unwrap_or_else(|_| {
            log!("channel"; "no reply for {}", title);
            ContentChannelMessage::not_found(title)
        })
    }
}

/// Start the task that answers channel requests. Each request is handled
/// on its own task so a slow document never blocks a stylesheet.
///
/// Must be called from within a tokio runtime.
pub fn spawn_dispatch_loop(
    dispatcher: Arc<Dispatcher>,
    buffer: usize,
) -> (ChannelHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ChannelRequest>(buffer.max(1));

    let task = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let answer = dispatcher.handle_message(request.message).await;
                // The front end may have given up on this request.
                let _ = request.reply.send(answer);
            });
        }
        debug!("channel"; "all handles dropped, dispatch loop stopped");
    });

    (ChannelHandle { tx }, task)
}
