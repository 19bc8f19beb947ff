//! MIME type detection and classification.
//!
//! Archive entries carry bare MIME types (`text/html`, `image/png`). This
//! module guesses them for unpacked files, classifies them for the
//! dispatcher and adds a charset for HTTP responses.

use std::path::Path;

/// Common MIME type constants (bare, no parameters).
pub mod types {
    // Text
    pub const HTML: &str = "text/html";
    pub const PLAIN: &str = "text/plain";
    pub const CSS: &str = "text/css";
    pub const JAVASCRIPT: &str = "text/javascript";
    pub const JSON: &str = "application/json";
    pub const XML: &str = "application/xml";
    pub const XHTML: &str = "application/xhtml+xml";

    // Downloads
    pub const PDF: &str = "application/pdf";
    pub const EPUB: &str = "application/epub+zip";
    pub const ZIP: &str = "application/zip";
    pub const OCTET_STREAM: &str = "application/octet-stream";

    // Images
    pub const PNG: &str = "image/png";
    pub const JPEG: &str = "image/jpeg";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
    pub const SVG: &str = "image/svg+xml";
    pub const ICO: &str = "image/x-icon";

    // Audio / Video
    pub const MP3: &str = "audio/mpeg";
    pub const OGG_AUDIO: &str = "audio/ogg";
    pub const MP4: &str = "video/mp4";
    pub const WEBM: &str = "video/webm";
    pub const VTT: &str = "text/vtt";

    // Fonts
    pub const WOFF: &str = "font/woff";
    pub const WOFF2: &str = "font/woff2";
    pub const TTF: &str = "font/ttf";
}

/// How the dispatcher treats an entry of a given MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    /// HTML, goes through the transform pipeline.
    Document,
    /// CSS, goes through the style cache.
    Stylesheet,
    Script,
    Image,
    /// Audio, video, text tracks and fonts.
    Media,
    /// Offered to the user as a file to save.
    Download,
    Other,
}

/// Guess MIME type from a file path.
pub fn from_path(path: &Path) -> &'static str {
    from_extension(path.extension().and_then(|e| e.to_str()))
}

/// Guess MIME type from a file extension.
pub fn from_extension(ext: Option<&str>) -> &'static str {
    let ext = ext.map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => types::HTML,
        Some("xhtml") => types::XHTML,
        Some("css") => types::CSS,
        Some("js" | "mjs") => types::JAVASCRIPT,
        Some("json") => types::JSON,
        Some("xml") => types::XML,
        Some("txt") => types::PLAIN,
        Some("vtt") => types::VTT,

        Some("svg") => types::SVG,
        Some("png") => types::PNG,
        Some("jpg" | "jpeg") => types::JPEG,
        Some("gif") => types::GIF,
        Some("webp") => types::WEBP,
        Some("ico") => types::ICO,

        Some("mp3") => types::MP3,
        Some("ogg" | "oga") => types::OGG_AUDIO,
        Some("mp4" | "m4v") => types::MP4,
        Some("webm") => types::WEBM,

        Some("woff") => types::WOFF,
        Some("woff2") => types::WOFF2,
        Some("ttf") => types::TTF,

        Some("pdf") => types::PDF,
        Some("epub") => types::EPUB,
        Some("zip") => types::ZIP,

        _ => types::OCTET_STREAM,
    }
}

/// Strip parameters and lowercase: `Text/HTML; charset=utf-8` -> `text/html`.
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Classify a MIME type for dispatch.
pub fn classify(mime: &str) -> ContentClass {
    let essence = essence(mime);
    match essence.as_str() {
        types::HTML | types::XHTML => ContentClass::Document,
        types::CSS => ContentClass::Stylesheet,
        types::JAVASCRIPT | "application/javascript" => ContentClass::Script,
        types::PDF | types::EPUB | types::ZIP | types::OCTET_STREAM => ContentClass::Download,
        types::VTT => ContentClass::Media,
        m if m.starts_with("image/") => ContentClass::Image,
        m if m.starts_with("audio/") || m.starts_with("video/") || m.starts_with("font/") => {
            ContentClass::Media
        }
        _ => ContentClass::Other,
    }
}

/// Preferred file extension for a MIME type, used for exported blobs.
pub fn extension_for(mime: &str) -> &'static str {
    match essence(mime).as_str() {
        types::HTML => "html",
        types::CSS => "css",
        types::JAVASCRIPT | "application/javascript" => "js",
        types::PNG => "png",
        types::JPEG => "jpg",
        types::GIF => "gif",
        types::WEBP => "webp",
        types::SVG => "svg",
        types::ICO => "ico",
        types::MP3 => "mp3",
        types::MP4 => "mp4",
        types::WEBM => "webm",
        types::WOFF => "woff",
        types::WOFF2 => "woff2",
        types::PDF => "pdf",
        types::EPUB => "epub",
        types::ZIP => "zip",
        _ => "bin",
    }
}

/// MIME type for a download, inferred from the filename when the archive
/// only says `application/octet-stream`.
pub fn for_download<'a>(mime: &'a str, filename: &str) -> &'a str {
    if essence(mime) != types::OCTET_STREAM {
        return mime;
    }
    match from_path(Path::new(filename)) {
        types::EPUB => types::EPUB,
        types::PDF => types::PDF,
        types::ZIP => types::ZIP,
        _ => mime,
    }
}

/// Content-Type header value: text types get an explicit UTF-8 charset.
pub fn with_charset(mime: &str) -> String {
    if mime.contains(';') {
        return mime.to_string();
    }
    if is_text(mime) {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

/// Check if the MIME type represents text content.
pub fn is_text(mime: &str) -> bool {
    let essence = essence(mime);
    essence.starts_with("text/")
        || essence == types::JSON
        || essence == types::XML
        || essence == types::XHTML
        || essence == types::SVG
}
