//! Command-line interface module.

mod args;
pub mod get;
pub mod open;
pub mod serve;

pub use args::{Cli, Commands, ReaderArgs};
