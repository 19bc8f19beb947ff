//! Shared helpers: MIME tables, HTML escaping, request path handling.

pub mod html;
pub mod mime;
pub mod path;
