//! Math notation detection.
//!
//! Two kinds of markers are recognized: TeX source (inline delimiters or
//! `math/tex` scripts) and pre-rendered fallback images. Fallback images
//! carry their TeX source in `alt` and can be turned back into TeX when a
//! math renderer is enabled.

use super::scan::{Markup, TagEdit, insert_after_head_open, rewrite_tags, start_tags};

pub const MATH_META_NAME: &str = "shelf:math";

const FALLBACK_CLASS: &str = "math-fallback-image";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MathMarkers {
    pub tex: bool,
    pub fallback_image: bool,
}

impl MathMarkers {
    pub fn any(&self) -> bool {
        self.tex || self.fallback_image
    }

    /// Value of the `shelf:math` meta tag.
    pub fn content(&self) -> Option<&'static str> {
        match (self.tex, self.fallback_image) {
            (true, true) => Some("tex image"),
            (true, false) => Some("tex"),
            (false, true) => Some("image"),
            (false, false) => None,
        }
    }
}

pub fn detect(html: &str) -> MathMarkers {
    let markup = Markup::parse(html);
    let mut markers = MathMarkers {
        tex: markup.text_runs().into_iter().any(has_tex_delimiters),
        fallback_image: false,
    };

    for located in &markup.tags {
        let tag = &located.tag;
        match tag.name.as_str() {
            "script" if is_tex_script(tag.value("type")) => markers.tex = true,
            "img" if is_fallback(&tag.tokens("class")) => markers.fallback_image = true,
            _ => {}
        }
    }
    markers
}

fn has_tex_delimiters(text: &str) -> bool {
    let paired = |open: &str, close: &str| {
        text.find(open)
            .is_some_and(|at| text[at + open.len()..].contains(close))
    };
    paired("$$", "$$") || paired("\\(", "\\)") || paired("\\[", "\\]")
}

fn is_tex_script(script_type: Option<String>) -> bool {
    script_type.is_some_and(|t| t.trim().to_ascii_lowercase().starts_with("math/tex"))
}

fn is_fallback(classes: &[String]) -> bool {
    classes.iter().any(|c| c.contains(FALLBACK_CLASS))
}

/// Replace fallback images by `math/tex` scripts built from their alt text.
/// Returns the new document and how many images were converted.
pub fn convert_fallback_images(html: &str) -> (String, usize) {
    let mut converted = 0;
    let out = rewrite_tags(html, |tag| {
        if tag.name != "img" || !is_fallback(&tag.tokens("class")) {
            return TagEdit::Keep;
        }
        let Some(alt) = tag.value("alt").filter(|a| !a.trim().is_empty()) else {
            return TagEdit::Keep;
        };
        converted += 1;
        // Archives often double-escape ampersands in alt text.
        let tex = alt.replace("&amp;", "&").replace("</", "<\\/");
        TagEdit::Replace(format!("<script type=\"math/tex\">{tex}</script>"))
    });
    (out, converted)
}

/// Detect markers, optionally convert fallback images, and add the marker
/// meta tag once.
pub fn apply(html: &str, convert: bool) -> (String, MathMarkers) {
    let mut markers = detect(html);
    let mut html = html.to_string();

    if convert && markers.fallback_image {
        let (converted, count) = convert_fallback_images(&html);
        if count > 0 {
            html = converted;
            markers.tex = true;
        }
    }

    if let Some(content) = markers.content() {
        let present = start_tags(&html)
            .any(|t| t.name == "meta" && t.value("name").as_deref() == Some(MATH_META_NAME));
        if !present {
            let meta = format!("<meta name=\"{MATH_META_NAME}\" content=\"{content}\">");
            html = insert_after_head_open(&html, &meta);
        }
    }

    (html, markers)
}
