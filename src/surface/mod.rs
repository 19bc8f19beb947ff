//! Rendering surfaces for direct mode.
//!
//! A surface is where a document ends up when it does not travel back
//! over the content channel. It reports layout to the image engine and
//! accepts extracted images.

mod file;

pub use file::{FileSurface, INDEX_FILE, ROW_HEIGHT};

use anyhow::Result;

use crate::blob::BlobHandle;
use crate::images::{Bounds, NodeId, Viewport};

/// Style applied to an image when it is shown.
pub const FADE_IN_STYLE: &str = "opacity:1;transition:opacity 0.3s ease-in";

pub trait Surface: Send + Sync {
    /// Replace the current document.
    fn write_document(&self, title: &str, html: &str) -> Result<()>;

    /// Tell the reader `path` is not in `archive` and offer another archive.
    fn show_not_found(&self, path: &str, archive: &str) -> Result<()>;

    /// Save-to-disk flow for downloadable entries.
    fn save_download(&self, filename: &str, mimetype: &str, bytes: &[u8]) -> Result<()>;

    fn viewport(&self) -> Viewport;

    /// Layout of an image placeholder, `None` if it is not laid out.
    fn bounds(&self, node: NodeId) -> Option<Bounds>;

    fn display_image(&self, node: NodeId, handle: &BlobHandle, style: &str) -> Result<()>;
}
