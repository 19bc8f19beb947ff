//! Unpacked archive directory.
//!
//! # Layout
//!
//! ```text
//! wiki/
//! ├── archive.toml       # optional manifest
//! ├── A/Main_Page        # articles (extensionless files are HTML)
//! ├── -/s/style.css      # layout assets
//! └── I/logo.png         # images
//! ```
//!
//! # Manifest
//!
//! ```toml
//! name = "wikipedia_en_test"
//! landing = "A/Main_Page"
//!
//! [redirects]
//! "A/Home" = "A/Main_Page"
//!
//! [mimetypes]
//! "A/Manual" = "application/pdf"
//! ```

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use super::{Archive, ArchiveError, ArchiveId, DirectoryEntry, split_path};
use crate::utils::mime;

pub const MANIFEST_FILE: &str = "archive.toml";

const DEFAULT_LANDING: &str = "A/Main_Page";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Manifest {
    name: Option<String>,
    landing: Option<String>,
    redirects: FxHashMap<String, String>,
    mimetypes: FxHashMap<String, String>,
}

/// An archive backed by a plain directory.
pub struct DirArchive {
    root: PathBuf,
    id: ArchiveId,
    landing: String,
    redirects: FxHashMap<String, String>,
    mimetypes: FxHashMap<String, String>,
}

impl DirArchive {
    /// Open a directory. Each call yields a fresh [`ArchiveId`].
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        let meta = std::fs::metadata(root).map_err(|e| ArchiveError::Io(root.to_path_buf(), e))?;
        if !meta.is_dir() {
            return Err(ArchiveError::Io(
                root.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
            ));
        }

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            let content = std::fs::read_to_string(&manifest_path)
                .map_err(|e| ArchiveError::Io(manifest_path.clone(), e))?;
            toml::from_str::<Manifest>(&content)
                .map_err(|e| ArchiveError::Manifest(manifest_path.clone(), e))?
        } else {
            Manifest::default()
        };

        let name = manifest.name.unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "archive".to_string())
        });

        Ok(Self {
            root: root.to_path_buf(),
            id: ArchiveId::fresh(&name),
            landing: manifest
                .landing
                .unwrap_or_else(|| DEFAULT_LANDING.to_string()),
            redirects: manifest.redirects,
            mimetypes: manifest.mimetypes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an archive path to a file below the root.
    fn file_path(&self, path: &str) -> Result<PathBuf, ArchiveError> {
        let relative = Path::new(path);
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !inside {
            return Err(ArchiveError::OutsideRoot(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn mimetype_for(&self, path: &str, namespace: char, file: &Path) -> String {
        if let Some(mime) = self.mimetypes.get(path) {
            return mime.clone();
        }
        if namespace == 'A' && file.extension().is_none() {
            return mime::types::HTML.to_string();
        }
        mime::from_path(file).to_string()
    }
}

#[async_trait]
impl Archive for DirArchive {
    fn id(&self) -> &ArchiveId {
        &self.id
    }

    fn landing_page(&self) -> &str {
        &self.landing
    }

    async fn entry_by_path(&self, path: &str) -> Result<Option<DirectoryEntry>, ArchiveError> {
        let Some((namespace, _)) = split_path(path) else {
            return Ok(None);
        };

        if let Some(target) = self.redirects.get(path) {
            return Ok(DirectoryEntry::redirect(path, target.clone()));
        }

        let file = self.file_path(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => {
                let mimetype = self.mimetype_for(path, namespace, &file);
                Ok(DirectoryEntry::content(path, mimetype))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArchiveError::Io(file, e)),
        }
    }

    async fn read_binary(&self, entry: &DirectoryEntry) -> Result<Vec<u8>, ArchiveError> {
        let path = entry.path();
        if entry.is_redirect() {
            return Err(ArchiveError::Decode(path));
        }
        let file = self.file_path(&path)?;
        tokio::fs::read(&file)
            .await
            .map_err(|e| ArchiveError::Io(file, e))
    }
}
