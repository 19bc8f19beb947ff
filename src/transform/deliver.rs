//! Placeholder materialization.
//!
//! Proxied documents point the browser back at the server. Direct
//! documents point at blob handles; their images are left to the image
//! engine.

use rustc_hash::FxHashMap;

use super::assets::{ARCHIVE_URL_ATTR, is_image_tag, is_stylesheet_tag, reference_attr};
use super::scan::{TagEdit, insert_before_head_close, rewrite_tags, start_tags};
use crate::config::ImageDisplay;
use crate::debug;
use crate::session::SessionContext;
use crate::style::StyleCache;
use crate::utils::path::encode_path;

/// Where the server exposes the lazy image loader.
pub const LAZY_SCRIPT_PATH: &str = "/_shelf/lazy.js";

const LAZY_SCRIPT_ATTR: &str = "data-shelf-lazy";

/// Turn placeholders back into absolute browser URLs. Images stay
/// placeholders unless every image is wanted up front, in which case the
/// lazy loader is not needed.
pub fn materialize_proxied(html: &str, display: ImageDisplay, is_landing: bool) -> String {
    let eager_images = is_landing || display == ImageDisplay::All;
    let mut lazy_images = false;

    let out = rewrite_tags(html, |tag| {
        let Some(path) = tag.value(ARCHIVE_URL_ATTR) else {
            return TagEdit::Keep;
        };
        if is_image_tag(tag) && !eager_images {
            lazy_images = true;
            return TagEdit::Keep;
        }
        let Some(attr) = reference_attr(tag) else {
            return TagEdit::Keep;
        };
        tag.rename(ARCHIVE_URL_ATTR, attr, &encode_path(&path));
        TagEdit::Rewrite
    });

    if !lazy_images || start_tags(&out).any(|t| t.has(LAZY_SCRIPT_ATTR)) {
        return out;
    }
    let script = format!(
        "<script src=\"{LAZY_SCRIPT_PATH}\" {LAZY_SCRIPT_ATTR} data-mode=\"{}\" defer></script>",
        display.as_str()
    );
    insert_before_head_close(&out, &script)
}

/// Point every non-image placeholder at a blob handle. Stylesheets go
/// through the style cache; a missing stylesheet becomes an empty `href`.
pub async fn materialize_direct(html: &str, session: &SessionContext, styles: &StyleCache) -> String {
    let wanted: Vec<(String, bool)> = start_tags(html)
        .filter(|tag| !is_image_tag(tag))
        .filter_map(|tag| {
            let path = tag.value(ARCHIVE_URL_ATTR)?;
            Some((path, is_stylesheet_tag(&tag)))
        })
        .collect();

    let mut resolved: FxHashMap<String, String> = FxHashMap::default();
    for (path, stylesheet) in wanted {
        if resolved.contains_key(&path) {
            continue;
        }
        let href = if stylesheet {
            styles.resolve(session, &path).await.href().to_string()
        } else {
            match session.extract(&path).await {
                Ok(handle) => handle.as_str().to_string(),
                Err(e) => {
                    debug!("transform"; "{}", e);
                    String::new()
                }
            }
        };
        resolved.insert(path, href);
    }

    rewrite_tags(html, |tag| {
        if is_image_tag(tag) {
            return TagEdit::Keep;
        }
        let Some(path) = tag.value(ARCHIVE_URL_ATTR) else {
            return TagEdit::Keep;
        };
        let (Some(attr), Some(href)) = (reference_attr(tag), resolved.get(&path)) else {
            return TagEdit::Keep;
        };
        tag.rename(ARCHIVE_URL_ATTR, attr, href);
        TagEdit::Rewrite
    })
}
