//! Theme and font scale injection.

use super::scan::{insert_before_head_close, start_tags};
use crate::config::{ReaderConfig, Theme};

pub const THEME_ATTR: &str = "data-shelf-theme";

const DARK_CSS: &str = "html,body{background:#1e1e1e;color:#dcdcdc}\
a{color:#8ab4f8}a:visited{color:#c58af9}\
table,th,td,.infobox,.navbox{background:#262626;color:#dcdcdc;border-color:#444}";

const INVERT_CSS: &str = "html{filter:invert(1) hue-rotate(180deg);background:#fff}\
img,video,picture,canvas,svg image{filter:invert(1) hue-rotate(180deg)}";

/// Stylesheet for the reader settings, `None` when nothing changes the
/// archive's own look.
pub fn theme_css(reader: &ReaderConfig) -> Option<String> {
    let mut css = match reader.theme {
        Theme::Light => String::new(),
        Theme::Dark => DARK_CSS.to_string(),
        Theme::Invert => INVERT_CSS.to_string(),
        Theme::Auto => format!("@media (prefers-color-scheme: dark){{{INVERT_CSS}}}"),
    };
    if reader.font_scale != 100 {
        css.push_str(&format!("html{{font-size:{}%}}", reader.font_scale));
    }
    (!css.is_empty()).then_some(css)
}

/// Add the theme stylesheet before `</head>` unless one is already there.
pub fn inject_theme(html: &str, reader: &ReaderConfig) -> String {
    let Some(css) = theme_css(reader) else {
        return html.to_string();
    };
    if start_tags(html).any(|t| t.name == "style" && t.has(THEME_ATTR)) {
        return html.to_string();
    }
    let style = format!(
        "<style {THEME_ATTR}=\"{}\">{css}</style>",
        reader.theme.as_str()
    );
    insert_before_head_close(html, &style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    fn reader(toml: &str) -> ReaderConfig {
        test_parse_config(toml).reader
    }

    #[test]
    fn test_light_default_is_untouched() {
        let html = "<head></head><body></body>";
        assert_eq!(inject_theme(html, &ReaderConfig::default()), html);
    }

    #[test]
    fn test_dark_theme() {
        let out = inject_theme("<head><title>t</title></head>", &reader("[reader]\ntheme = \"dark\""));
        assert!(out.contains("<style data-shelf-theme=\"dark\">html,body{background:#1e1e1e"));
        assert!(out.ends_with("</style></head>"));
    }

    #[test]
    fn test_auto_wraps_media_query() {
        let css = theme_css(&reader("[reader]\ntheme = \"auto\"")).unwrap();
        assert!(css.starts_with("@media (prefers-color-scheme: dark){html{filter:invert(1)"));
    }

    #[test]
    fn test_font_scale_only() {
        let css = theme_css(&reader("[reader]\nfont_scale = 120")).unwrap();
        assert_eq!(css, "html{font-size:120%}");
    }

    #[test]
    fn test_not_added_twice() {
        let config = reader("[reader]\ntheme = \"invert\"\nfont_scale = 90");
        let once = inject_theme("<head></head>", &config);
        let twice = inject_theme(&once, &config);
        assert_eq!(once, twice);
        assert_eq!(once.matches(THEME_ATTR).count(), 1);
    }
}
