//! `shelf open`: render one entry into a directory.
//!
//! Runs the direct delivery path: the document is written with blob
//! handles, images are extracted according to the display mode, and the
//! result is flushed as `index.html` plus a `blobs/` directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::archive::DirArchive;
use crate::config::ShelfConfig;
use crate::dispatch::{DisplayOutcome, Dispatcher};
use crate::images::ImageState;
use crate::surface::{FileSurface, Surface};
use crate::{debug, log};

pub async fn open_entry(
    archive_root: &Path,
    path: Option<&str>,
    output: &Path,
    config: Arc<ShelfConfig>,
) -> Result<()> {
    let archive = DirArchive::open(archive_root)?;
    let dispatcher = Dispatcher::new(Arc::new(archive), config);
    let session = dispatcher.session();
    let path = path.unwrap_or_else(|| session.landing_page()).to_string();

    let surface = Arc::new(FileSurface::new(output));
    let outcome = dispatcher
        .display(&path, Arc::clone(&surface) as Arc<dyn Surface>)
        .await?;

    match outcome {
        DisplayOutcome::Document {
            title,
            engine,
            math,
        } => {
            engine.wait_idle().await;
            let states = engine.states();
            let count = |wanted: ImageState| states.iter().filter(|(_, s)| *s == wanted).count();
            let failed = count(ImageState::Failed);
            if failed > 0 {
                log!("open"; "{} image(s) could not be extracted", failed);
            }
            if math.any() {
                debug!("open"; "{} carries math", title);
            }

            let index = surface.flush(&session.blobs)?;
            log!("open"; "{} → {} ({}/{} images)", title, index.display(),
                count(ImageState::Displayed), states.len());
        }
        DisplayOutcome::Downloaded { filename } => {
            log!("open"; "saved {}", output.join(filename).display());
        }
        DisplayOutcome::NotFound => {
            surface.flush(&session.blobs)?;
            log!("open"; "{} not found in {}", path, archive_root.display());
        }
    }
    Ok(())
}
