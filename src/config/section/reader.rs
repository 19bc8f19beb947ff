//! `[reader]` section configuration.
//!
//! Controls how documents are presented once they leave the archive.
//!
//! # Example
//!
//! ```toml
//! [reader]
//! theme = "dark"                # light | dark | invert | auto
//! font_scale = 120              # relative font size, percent
//! image_display = "progressive" # progressive | manual | all
//! math = true                   # convert math fallback images to TeX
//! ```

use serde::{Deserialize, Serialize};

/// Document theme injected into every rendered page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Archive styles untouched.
    #[default]
    Light,
    /// Dark palette override.
    Dark,
    /// Invert the whole page, re-inverting media.
    Invert,
    /// Invert only when the user agent prefers a dark scheme.
    Auto,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Invert => "invert",
            Self::Auto => "auto",
        }
    }
}

/// How images inside documents are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageDisplay {
    /// Extract every image as soon as the document is shown.
    All,
    /// Extract only when the reader asks for a specific image.
    Manual,
    /// Extract images as they scroll into view.
    #[default]
    Progressive,
}

impl ImageDisplay {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Manual => "manual",
            Self::Progressive => "progressive",
        }
    }
}

/// Reader presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub theme: Theme,

    /// Relative font size in percent (100 = archive default).
    pub font_scale: u16,

    pub image_display: ImageDisplay,

    /// Convert math fallback images into TeX script blocks.
    pub math: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_scale: 100,
            image_display: ImageDisplay::Progressive,
            math: true,
        }
    }
}
