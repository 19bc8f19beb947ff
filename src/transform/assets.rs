//! Asset reference rewriting.
//!
//! Archive-internal `src`/`href` values are resolved against the document
//! path and parked in a `data-archive-url` placeholder. Delivery later
//! decides what each placeholder becomes (browser URL, blob handle, or a
//! lazily extracted image).

use percent_encoding::percent_decode_str;
use url::Url;

use super::scan::{Tag, TagEdit, rewrite_tags};
use crate::utils::path::encode_path;

/// Placeholder attribute holding the resolved archive path.
pub const ARCHIVE_URL_ATTR: &str = "data-archive-url";

const ARCHIVE_ORIGIN: &str = "archive://archive";

/// Schemes that always point outside the archive.
const EXTERNAL_SCHEMES: [&str; 10] = [
    "http",
    "https",
    "ftp",
    "data",
    "blob",
    "mailto",
    "javascript",
    "tel",
    "file",
    "about",
];

/// Which attribute of a tag carries an archive reference, if any.
pub fn reference_attr(tag: &Tag) -> Option<&'static str> {
    match tag.name.as_str() {
        "img" | "script" | "source" | "audio" | "video" | "track" | "embed" => Some("src"),
        "input" if tag.value("type").is_some_and(|t| t.eq_ignore_ascii_case("image")) => {
            Some("src")
        }
        "link" => {
            let rel = tag.tokens("rel");
            rel.iter()
                .any(|r| r == "stylesheet" || r == "icon")
                .then_some("href")
        }
        _ => None,
    }
}

/// Whether the placeholder on this tag is an image the engine extracts.
pub fn is_image_tag(tag: &Tag) -> bool {
    tag.name == "img" || tag.name == "input"
}

pub fn is_stylesheet_tag(tag: &Tag) -> bool {
    tag.name == "link" && tag.tokens("rel").iter().any(|r| r == "stylesheet")
}

/// Replace archive references with placeholders. Already rewritten tags
/// are left alone.
pub fn rewrite_asset_refs(html: &str, doc_path: &str) -> String {
    let base = document_base(doc_path);

    rewrite_tags(html, |tag| {
        let mut changed = false;
        if tag.name == "img" {
            // Image loading belongs to the extraction engine. `srcset`
            // candidates would bypass it.
            changed |= tag.remove("loading");
            changed |= tag.remove("srcset");
        }

        let Some(attr) = reference_attr(tag) else {
            return edit(changed);
        };
        if tag.has(ARCHIVE_URL_ATTR) {
            return edit(changed);
        }
        let Some(reference) = tag.value(attr) else {
            return edit(changed);
        };
        let Some(resolved) = base.as_ref().and_then(|b| resolve_reference(b, &reference)) else {
            return edit(changed);
        };

        tag.rename(attr, ARCHIVE_URL_ATTR, &resolved);
        TagEdit::Rewrite
    })
}

fn edit(changed: bool) -> TagEdit {
    if changed {
        TagEdit::Rewrite
    } else {
        TagEdit::Keep
    }
}

fn document_base(doc_path: &str) -> Option<Url> {
    Url::parse(&format!("{ARCHIVE_ORIGIN}{}", encode_path(doc_path))).ok()
}

/// Resolve a reference against the document URL. `None` for references
/// that do not point into the archive.
fn resolve_reference(base: &Url, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') || reference.starts_with("//") {
        return None;
    }

    let prefixed;
    let reference = match scheme_of(reference) {
        Some(scheme) if EXTERNAL_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {
            return None;
        }
        // `File:Foo.jpg` style names are relative paths, not schemes.
        Some(_) => {
            prefixed = format!("./{reference}");
            prefixed.as_str()
        }
        None => reference,
    };

    let joined = base.join(reference).ok()?;
    if joined.scheme() != "archive" || joined.host_str() != Some("archive") {
        return None;
    }

    let path = percent_decode_str(joined.path())
        .decode_utf8()
        .ok()?
        .trim_start_matches('/')
        .to_string();
    (!path.is_empty()).then_some(path)
}

/// The scheme of `reference` if it starts with `scheme:` before any `/`.
fn scheme_of(reference: &str) -> Option<&str> {
    let colon = reference.find(':')?;
    let scheme = &reference[..colon];
    let slash = reference.find('/').unwrap_or(usize::MAX);
    let valid = colon < slash
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}
