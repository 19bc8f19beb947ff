//! `shelf get`: print the content channel answer for one path.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::archive::DirArchive;
use crate::channel::{Content, ContentChannelMessage};
use crate::config::ShelfConfig;
use crate::dispatch::Dispatcher;

/// Ask the dispatcher about `path` as the browser would.
pub async fn ask(archive_root: &Path, path: &str, config: Arc<ShelfConfig>) -> Result<ContentChannelMessage> {
    let archive = DirArchive::open(archive_root)?;
    let dispatcher = Dispatcher::new(Arc::new(archive), config);
    Ok(dispatcher.handle_message(ContentChannelMessage::ask(path)).await)
}

/// Pretty JSON for the terminal. Binary content is summarized.
pub fn render(answer: &ContentChannelMessage) -> Result<String> {
    if let ContentChannelMessage::GiveContent {
        title,
        mimetype,
        content: Content::Bytes(bytes),
        image_display,
    } = answer
    {
        let summary = ContentChannelMessage::GiveContent {
            title: title.clone(),
            mimetype: mimetype.clone(),
            content: Content::Text(format!("<{} bytes>", bytes.len())),
            image_display: *image_display,
        };
        return Ok(serde_json::to_string_pretty(&summary)?);
    }
    Ok(serde_json::to_string_pretty(answer)?)
}
