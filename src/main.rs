//! Shelf - an offline archive reader.

#![allow(dead_code)]

mod archive;
mod blob;
mod channel;
mod cli;
mod config;
mod core;
mod dispatch;
mod embed;
mod images;
mod logger;
mod session;
mod style;
mod surface;
mod transform;
mod utils;
mod watch;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::ShelfConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = Arc::new(ShelfConfig::load(&cli)?);
    let archive_root = cli.archive();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Commands::Serve { .. } => serve(&runtime, config, archive_root),
        Commands::Open { path, output, .. } => {
            let output = config::expand_path(output);
            runtime.block_on(cli::open::open_entry(
                &archive_root,
                path.as_deref(),
                &output,
                config,
            ))
        }
        Commands::Get { path, .. } => {
            let answer = runtime.block_on(cli::get::ask(&archive_root, path, config))?;
            println!("{}", cli::get::render(&answer)?);
            Ok(())
        }
    }
}

/// Bind first so a busy port fails before the archive is touched.
fn serve(
    runtime: &tokio::runtime::Runtime,
    config: Arc<ShelfConfig>,
    archive_root: std::path::PathBuf,
) -> Result<()> {
    let bound_server = cli::serve::bind_server(&config)?;

    let archive = archive::DirArchive::open(&archive_root)?;
    let dispatcher = Arc::new(dispatch::Dispatcher::new(Arc::new(archive), config));
    log!("serve"; "archive {}, landing page {}", archive_root.display(),
        dispatcher.session().landing_page());

    bound_server.run(dispatcher, runtime, archive_root)
}
