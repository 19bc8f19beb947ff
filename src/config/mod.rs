//! Reader configuration management for `shelf.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── reader     # [reader]
//! │   ├── security   # [security]
//! │   ├── serve      # [serve]
//! │   └── images     # [images]
//! ├── types/         # Utility types
//! │   └── error      # ConfigError
//! └── mod.rs         # ShelfConfig (this file)
//! ```
//!
//! The file is optional: every section has defaults, and CLI flags override
//! whatever the file sets.

pub mod section;
pub mod types;

pub use section::{ImageDisplay, ImagesConfig, ReaderConfig, SecurityConfig, ServeConfig, Theme};
pub use types::ConfigError;

use crate::{
    cli::{Cli, Commands, ReaderArgs},
    debug, log,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing shelf.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShelfConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Presentation settings
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Content-security directive settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// HTTP front end settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Image extraction schedule
    #[serde(default)]
    pub images: ImagesConfig,
}

impl ShelfConfig {
    /// Load configuration from CLI arguments.
    ///
    /// A missing config file is not an error: defaults apply.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = expand_path(&cli.config);

        let mut config = if config_path.is_file() {
            Self::from_path(&config_path)?
        } else {
            debug!("config"; "{} not found, using defaults", config_path.display());
            Self::default()
        };

        config.config_path = config_path;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;

        if !ignored.is_empty() {
            let display_path = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| path.to_string_lossy());
            log!("warning"; "unknown fields in {} ignored: {}", display_path, ignored.join(", "));
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Apply command-line overrides on top of the file values.
    fn apply_cli(&mut self, cli: &Cli) {
        if let Commands::Serve {
            interface,
            port,
            watch,
            ..
        } = &cli.command
        {
            if let Some(interface) = interface {
                self.serve.interface = *interface;
            }
            if let Some(port) = port {
                self.serve.port = *port;
            }
            if let Some(watch) = watch {
                self.serve.watch = *watch;
            }
        }

        self.apply_reader_args(cli.reader_args());
    }

    fn apply_reader_args(&mut self, args: &ReaderArgs) {
        if let Some(theme) = args.theme {
            self.reader.theme = theme;
        }
        if let Some(images) = args.images {
            self.reader.image_display = images;
        }
        if let Some(scale) = args.font_scale {
            self.reader.font_scale = scale;
        }
        if args.no_math {
            self.reader.math = false;
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(50..=300).contains(&self.reader.font_scale) {
            return Err(ConfigError::validation(
                "reader.font_scale",
                format!("{} is outside 50..=300", self.reader.font_scale),
            ));
        }
        if self.images.budget == 0 {
            return Err(ConfigError::validation(
                "images.budget",
                "at least one extraction must be allowed",
            ));
        }
        if self.serve.transform_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "serve.transform_timeout_ms",
                "timeout must be positive",
            ));
        }
        if let Some(bad) = self
            .security
            .allow
            .iter()
            .find(|s| s.is_empty() || s.contains([';', ',']) || s.contains(char::is_whitespace))
        {
            return Err(ConfigError::validation(
                "security.allow",
                format!("`{bad}` is not a single source expression"),
            ));
        }
        Ok(())
    }
}

/// Expand `~` in user-supplied paths.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

#[cfg(test)]
pub fn test_parse_config(extra: &str) -> ShelfConfig {
    let (parsed, ignored) = ShelfConfig::parse_with_ignored(extra).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
