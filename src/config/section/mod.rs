//! Configuration section definitions.
//!
//! Each module corresponds to a section in `shelf.toml`:
//!
//! | Module     | TOML Section   | Purpose                                   |
//! |------------|----------------|-------------------------------------------|
//! | `reader`   | `[reader]`     | Theme, font scale, image display, math    |
//! | `security` | `[security]`   | Content-security directive injection      |
//! | `serve`    | `[serve]`      | HTTP front end (port, interface, watch)   |
//! | `images`   | `[images]`     | Progressive image extraction schedule     |

mod images;
mod reader;
mod security;
mod serve;

pub use images::ImagesConfig;
pub use reader::{ImageDisplay, ReaderConfig, Theme};
pub use security::SecurityConfig;
pub use serve::ServeConfig;
