//! Embedded static resources.
//!
//! # Module Structure
//!
//! - `template` - Template types for typed variable injection
//! - `lazy.js` - Progressive image loader for proxied documents
//!
//! # Usage
//!
//! ```ignore
//! use embed::lazy_js;
//!
//! let body: &'static str = lazy_js();
//! ```

mod template;

pub use template::{Template, TemplateVars};

use std::sync::OnceLock;

use crate::surface::FADE_IN_STYLE;
use crate::transform::ARCHIVE_URL_ATTR;

/// Variables for the lazy image loader.
pub struct LazyVars {
    /// Attribute holding an image's archive path.
    pub attr: &'static str,
    /// Style applied once an image has loaded.
    pub fade_in: &'static str,
}

impl TemplateVars for LazyVars {
    fn apply(&self, content: &str) -> String {
        content
            .replace("__ATTR__", self.attr)
            .replace("__FADE_IN__", self.fade_in)
    }
}

pub const LAZY_JS: Template<LazyVars> = Template::new(include_str!("lazy.js"));

/// The loader as served, rendered once.
pub fn lazy_js() -> &'static str {
    static RENDERED: OnceLock<String> = OnceLock::new();
    RENDERED.get_or_init(|| {
        LAZY_JS.render(&LazyVars {
            attr: ARCHIVE_URL_ATTR,
            fade_in: FADE_IN_STYLE,
        })
    })
}
