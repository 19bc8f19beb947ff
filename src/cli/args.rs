//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ImageDisplay, Theme};

/// Shelf offline archive reader CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// Config file path (default: shelf.toml)
    #[arg(short = 'C', long, default_value = "shelf.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Reader overrides of whichever subcommand was given.
    pub fn reader_args(&self) -> &ReaderArgs {
        match &self.command {
            Commands::Serve { reader, .. }
            | Commands::Open { reader, .. }
            | Commands::Get { reader, .. } => reader,
        }
    }

    /// Archive directory of the subcommand, `~` expanded.
    pub fn archive(&self) -> PathBuf {
        let archive = match &self.command {
            Commands::Serve { archive, .. }
            | Commands::Open { archive, .. }
            | Commands::Get { archive, .. } => archive,
        };
        crate::config::expand_path(archive)
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve an archive to the browser
    #[command(visible_alias = "s")]
    Serve {
        /// Archive directory
        #[arg(value_hint = clap::ValueHint::DirPath)]
        archive: PathBuf,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Re-open the archive when it changes on disk
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,

        #[command(flatten)]
        reader: ReaderArgs,
    },

    /// Render one archive entry into a directory
    #[command(visible_alias = "o")]
    Open {
        /// Archive directory
        #[arg(value_hint = clap::ValueHint::DirPath)]
        archive: PathBuf,

        /// Entry path (default: the landing page)
        path: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "shelf-out", value_hint = clap::ValueHint::DirPath)]
        output: PathBuf,

        #[command(flatten)]
        reader: ReaderArgs,
    },

    /// Print the content channel answer for one path as JSON
    #[command(visible_alias = "g")]
    Get {
        /// Archive directory
        #[arg(value_hint = clap::ValueHint::DirPath)]
        archive: PathBuf,

        /// Entry path, as the browser would ask for it
        path: String,

        #[command(flatten)]
        reader: ReaderArgs,
    },
}

/// Presentation overrides shared by every command
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ReaderArgs {
    /// Document theme
    #[arg(short, long, value_enum)]
    pub theme: Option<Theme>,

    /// Image display mode
    #[arg(long, value_enum)]
    pub images: Option<ImageDisplay>,

    /// Relative font size in percent
    #[arg(short = 'f', long)]
    pub font_scale: Option<u16>,

    /// Leave math fallback images untouched
    #[arg(long)]
    pub no_math: bool,
}
