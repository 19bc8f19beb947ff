//! Request path handling.
//!
//! - Internal representation: decoded archive path without leading slash
//!   (`A/Main_Page`, `-/s/style.css`)
//! - Browser boundary: decode on input, encode on output

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Query markers that only matter to the content channel bookkeeping.
const DISPLAY_MARKERS: [&str; 2] = ["kiwix-display", "shelf-display"];

/// Characters that cannot appear raw inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\\')
    .add(b'^')
    .add(b'|');

/// Characters replaced in filenames offered for download.
const UNSAFE_FILENAME: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// A request split into its archive path and remaining query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    /// Decoded archive path, no leading slash.
    pub path: String,
    /// Query left after display markers are removed.
    pub search: Option<String>,
}

/// Normalize a browser or channel path into an archive path.
///
/// Strips the fragment, the display markers and the leading `/`, then
/// percent-decodes. Returns `None` for an empty path or one that climbs
/// out of the archive with `..`.
pub fn normalize_request_path(raw: &str) -> Option<RequestPath> {
    let raw = raw.trim();
    let without_fragment = raw.split('#').next().unwrap_or_default();
    let (encoded_path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    let decoded = percent_decode_str(encoded_path)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| encoded_path.to_string());

    let mut segments = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }

    let search = query.and_then(|q| {
        let kept: Vec<_> = q
            .split('&')
            .filter(|param| {
                let name = param.split('=').next().unwrap_or_default();
                !param.is_empty() && !DISPLAY_MARKERS.contains(&name)
            })
            .collect();
        (!kept.is_empty()).then(|| kept.join("&"))
    });

    Some(RequestPath {
        path: segments.join("/"),
        search,
    })
}

/// Encode an archive path as an absolute browser URL (`/A/Caf%C3%A9`).
pub fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len() + 1);
    for segment in path.trim_start_matches('/').split('/') {
        encoded.push('/');
        encoded.extend(utf8_percent_encode(segment, SEGMENT));
    }
    encoded
}

/// Filename for the save-to-disk flow: last path segment with characters
/// that are illegal on common filesystems replaced by `_`.
pub fn safe_filename(path: &str) -> String {
    let name = path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download");
    name.chars()
        .map(|c| if UNSAFE_FILENAME.contains(&c) { '_' } else { c })
        .collect()
}
