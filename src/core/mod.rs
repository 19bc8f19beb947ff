//! Core types shared across the reader.

mod error;
mod state;

pub use error::ResolveError;
pub use state::{is_shutdown, register_server, setup_shutdown_handler};
