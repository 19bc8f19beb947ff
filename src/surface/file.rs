//! Surface that renders into a directory.
//!
//! Layout is simulated: every image placeholder occupies one row of
//! [`ROW_HEIGHT`] in document order. Nothing is written until
//! [`FileSurface::flush`], except downloads which are saved immediately.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::Surface;
use crate::blob::{BlobHandle, BlobStore};
use crate::images::{Bounds, NodeId, Viewport};
use crate::log;
use crate::transform::{collect_images, fill_images, not_found_page};
use crate::utils::mime;

/// Height of one simulated layout row.
pub const ROW_HEIGHT: f64 = 240.0;

/// Output file for the rendered document.
pub const INDEX_FILE: &str = "index.html";

const BLOB_DIR: &str = "blobs";

pub struct FileSurface {
    out_dir: PathBuf,
    state: Mutex<SurfaceState>,
}

struct SurfaceState {
    viewport: Viewport,
    title: String,
    html: Option<String>,
    image_count: usize,
    images: FxHashMap<NodeId, (BlobHandle, String)>,
    downloads: Vec<PathBuf>,
}

impl FileSurface {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            state: Mutex::new(SurfaceState {
                viewport: Viewport::UNBOUNDED,
                title: String::new(),
                html: None,
                image_count: 0,
                images: FxHashMap::default(),
                downloads: Vec::new(),
            }),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.lock().viewport = viewport;
    }

    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }

    /// Nodes that received an image, sorted.
    pub fn displayed(&self) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self.state.lock().images.keys().copied().collect();
        nodes.sort();
        nodes
    }

    pub fn downloads(&self) -> Vec<PathBuf> {
        self.state.lock().downloads.clone()
    }

    /// Write the current document and every blob it references.
    ///
    /// Blob handles in the document are rewritten to files under `blobs/`.
    pub fn flush(&self, blobs: &BlobStore) -> Result<PathBuf> {
        let mut html = {
            let state = self.state.lock();
            let Some(html) = &state.html else {
                bail!("nothing to write: no document was displayed");
            };
            fill_images(html, |node| {
                state
                    .images
                    .get(&node)
                    .map(|(handle, style)| (handle.as_str().to_string(), style.clone()))
            })
        };

        let blob_dir = self.out_dir.join(BLOB_DIR);
        let mut written = 0;
        for (handle, blob) in blobs.entries() {
            if !html.contains(handle.as_str()) {
                continue;
            }
            let name = format!("{}.{}", handle.id(), mime::extension_for(&blob.mimetype));
            if written == 0 {
                fs::create_dir_all(&blob_dir)
                    .with_context(|| format!("failed to create {}", blob_dir.display()))?;
            }
            let path = blob_dir.join(&name);
            fs::write(&path, &blob.bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            html = html.replace(handle.as_str(), &format!("{BLOB_DIR}/{name}"));
            written += 1;
        }

        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;
        let index = self.out_dir.join(INDEX_FILE);
        fs::write(&index, html).with_context(|| format!("failed to write {}", index.display()))?;

        log!("open"; "wrote {} with {} blobs", index.display(), written);
        Ok(index)
    }
}

impl Surface for FileSurface {
    fn write_document(&self, title: &str, html: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.title = title.to_string();
        state.image_count = collect_images(html).len();
        state.images.clear();
        state.html = Some(html.to_string());
        Ok(())
    }

    fn show_not_found(&self, path: &str, archive: &str) -> Result<()> {
        log!("open"; "{} is not in {}", path, archive);
        self.write_document("Not found", &not_found_page(path, archive))
    }

    fn save_download(&self, filename: &str, mimetype: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;
        let path = self.out_dir.join(filename);
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;

        log!("open"; "saved {} ({})", path.display(), mimetype);
        self.state.lock().downloads.push(path);
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    fn bounds(&self, node: NodeId) -> Option<Bounds> {
        let state = self.state.lock();
        (node.0 < state.image_count).then(|| Bounds {
            top: node.0 as f64 * ROW_HEIGHT,
            height: ROW_HEIGHT,
        })
    }

    fn display_image(&self, node: NodeId, handle: &BlobHandle, style: &str) -> Result<()> {
        let mut state = self.state.lock();
        if node.0 >= state.image_count {
            bail!("{} is not in the current document", node);
        }
        state.images.insert(node, (handle.clone(), style.to_string()));
        Ok(())
    }
}
