//! Content transform pipeline.
//!
//! Turns raw archive HTML into a document a surface can show:
//!
//! 1. asset references become `data-archive-url` placeholders
//! 2. math markers are detected (and fallback images converted)
//! 3. a content-security meta tag is added
//! 4. theme and font scale styles are added
//! 5. the landing page is marked
//! 6. proxied documents get their placeholders materialized for the browser
//!
//! Each step is idempotent. Bytes outside rewritten tags are preserved.

mod assets;
mod csp;
mod deliver;
mod math;
mod scan;
mod theme;

pub use assets::ARCHIVE_URL_ATTR;
pub use csp::policy as csp_policy;
pub use deliver::{LAZY_SCRIPT_PATH, materialize_direct};
pub use math::MathMarkers;

use crate::archive::DirectoryEntry;
use crate::images::{ImagePlaceholder, NodeId};
use crate::session::SessionContext;
use crate::utils::html::escape;
use scan::{TagEdit, rewrite_tags, start_tags};

/// Marker attribute on the `<html>` tag of the landing page.
pub const LANDING_ATTR: &str = "data-shelf-landing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Shown on a surface owned by this process.
    Direct,
    /// Sent back over the content channel to a browser.
    Proxied,
}

#[derive(Debug, Clone)]
pub struct TransformedDocument {
    pub html: String,
    pub math: MathMarkers,
    pub is_landing: bool,
    /// Image placeholders left for the image engine, in document order.
    pub images: Vec<ImagePlaceholder>,
}

pub fn transform(
    raw: &str,
    entry: &DirectoryEntry,
    session: &SessionContext,
    mode: DeliveryMode,
) -> TransformedDocument {
    let config = &session.config;
    let path = entry.path();

    let html = assets::rewrite_asset_refs(raw, &path);
    let (mut html, math) = math::apply(&html, config.reader.math);

    if config.security.inject_csp {
        html = csp::insert_csp(&html, &csp::policy(&config.security));
    }
    html = theme::inject_theme(&html, &config.reader);

    let is_landing = session.is_landing(&path);
    if is_landing {
        html = mark_landing(&html);
    }

    if mode == DeliveryMode::Proxied {
        html = deliver::materialize_proxied(&html, config.reader.image_display, is_landing);
    }

    let images = collect_images(&html);
    TransformedDocument {
        html,
        math,
        is_landing,
        images,
    }
}

fn mark_landing(html: &str) -> String {
    rewrite_tags(html, |tag| {
        if tag.name != "html" || tag.has(LANDING_ATTR) {
            return TagEdit::Keep;
        }
        tag.set_flag(LANDING_ATTR);
        TagEdit::Rewrite
    })
}

fn is_image_placeholder(tag: &scan::Tag) -> bool {
    assets::is_image_tag(tag) && tag.has(ARCHIVE_URL_ATTR)
}

/// Image placeholders in document order. The index is the node id.
pub fn collect_images(html: &str) -> Vec<ImagePlaceholder> {
    start_tags(html)
        .filter(is_image_placeholder)
        .enumerate()
        .filter_map(|(i, tag)| {
            tag.value(ARCHIVE_URL_ATTR).map(|path| ImagePlaceholder {
                node: NodeId(i),
                path,
            })
        })
        .collect()
}

/// Fill image placeholders with concrete sources. `fill` receives node ids
/// numbered as in [`collect_images`] and returns `(src, style)`.
pub fn fill_images(
    html: &str,
    mut fill: impl FnMut(NodeId) -> Option<(String, String)>,
) -> String {
    let mut index = 0;
    rewrite_tags(html, |tag| {
        if !is_image_placeholder(tag) {
            return TagEdit::Keep;
        }
        let node = NodeId(index);
        index += 1;

        let Some((src, style)) = fill(node) else {
            return TagEdit::Keep;
        };
        tag.rename(ARCHIVE_URL_ATTR, "src", &src);
        let style = match tag.value("style") {
            Some(existing) if !existing.trim().is_empty() => {
                format!("{};{style}", existing.trim_end_matches(';'))
            }
            _ => style,
        };
        tag.set("style", &style);
        TagEdit::Rewrite
    })
}

/// Minimal page telling the reader a path is not in the archive.
pub fn not_found_page(path: &str, archive: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Not found</title></head>\
         <body><h1>Not found</h1><p>The entry <code>{}</code> is not in <b>{}</b>.</p>\
         <p>It may be in another archive. Open a different archive to continue.</p>\
         </body></html>",
        escape(path),
        escape(archive),
    )
}
