//! Archive access errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid archive manifest `{0}`")]
    Manifest(PathBuf, #[source] toml::de::Error),

    #[error("entry `{0}` could not be decoded")]
    Decode(String),

    #[error("path `{0}` is outside the archive")]
    OutsideRoot(String),
}
