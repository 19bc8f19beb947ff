//! Start tag locator.
//!
//! `tl` finds the elements and their attributes; this module maps each one
//! back to the byte span of its start tag so rewrites can re-render only
//! the tags they change. Every other byte is copied as is. Content of
//! raw-text elements (`script`, `style`, ...) is never treated as markup.

use std::ops::Range;

use crate::utils::html::{escape_attr, is_raw_text_element, unescape};

/// One attribute of a start tag. The value is kept in its source form
/// (entities not decoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: Option<String>,
}

/// A start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercase element name.
    pub name: String,
    pub attrs: Vec<Attr>,
    pub self_closing: bool,
}

impl Tag {
    /// Raw attribute value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    /// Attribute value with entities decoded.
    pub fn value(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| unescape(v).into_owned())
    }

    pub fn has(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Set an attribute from an unescaped value, keeping its position if present.
    pub fn set(&mut self, name: &str, value: &str) {
        let escaped = escape_attr(value).into_owned();
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = Some(escaped),
            None => self.attrs.push(Attr {
                name: name.to_string(),
                value: Some(escaped),
            }),
        }
    }

    /// Add a valueless attribute.
    pub fn set_flag(&mut self, name: &str) {
        if !self.has(name) {
            self.attrs.push(Attr {
                name: name.to_string(),
                value: None,
            });
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|a| a.name != name);
        self.attrs.len() < before
    }

    /// Rename an attribute in place, replacing its value.
    pub fn rename(&mut self, from: &str, to: &str, value: &str) {
        self.remove(to);
        let escaped = escape_attr(value).into_owned();
        match self.attrs.iter_mut().find(|a| a.name == from) {
            Some(attr) => {
                attr.name = to.to_string();
                attr.value = Some(escaped);
            }
            None => self.set(to, value),
        }
    }

    /// Whitespace separated tokens of an attribute, lowercased.
    pub fn tokens(&self, name: &str) -> Vec<String> {
        self.value(name)
            .map(|v| v.split_whitespace().map(str::to_ascii_lowercase).collect())
            .unwrap_or_default()
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(16 + self.attrs.len() * 16);
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attrs {
            out.push(' ');
            out.push_str(&attr.name);
            if let Some(value) = &attr.value {
                out.push_str("=\"");
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
        }
        if self.self_closing {
            out.push_str(" /");
        }
        out.push('>');
        out
    }
}

/// What a rewrite does with one start tag.
pub enum TagEdit {
    Keep,
    /// Re-render the (mutated) tag.
    Rewrite,
    /// Replace the tag with arbitrary markup.
    Replace(String),
}


/// A start tag and the bytes it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub tag: Tag,
    pub span: Range<usize>,
}

/// Start tags of a document in source order.
#[derive(Debug)]
pub struct Markup<'h> {
    html: &'h str,
    pub tags: Vec<Located>,
    /// Content of raw-text elements.
    raw_text: Vec<Range<usize>>,
}

impl<'h> Markup<'h> {
    pub fn parse(html: &'h str) -> Self {
        let mut markup = Self {
            html,
            tags: Vec::new(),
            raw_text: Vec::new(),
        };
        // Only fails on inputs tl cannot index; such a document passes through.
        let Ok(dom) = tl::parse(html, tl::ParserOptions::default()) else {
            return markup;
        };
        let parser = dom.parser();

        let mut found = Vec::new();
        let mut stack: Vec<tl::NodeHandle> = dom.children().to_vec();
        while let Some(handle) = stack.pop() {
            let Some(tl::Node::Tag(tag)) = handle.get(parser) else {
                continue;
            };
            if let Some(located) = locate(html, tag, parser) {
                found.push(located);
            }
            stack.extend(tag.children().top().iter().copied());
        }
        found.sort_by_key(|l| l.span.start);
        found.dedup_by_key(|l| l.span.start);

        // Whatever tl made of raw-text content is dropped here.
        let mut skip_until = 0;
        for located in found {
            if located.span.start < skip_until {
                continue;
            }
            skip_until = located.span.end;
            if is_raw_text_element(&located.tag.name) && !located.tag.self_closing {
                let close =
                    find_close(html, located.span.end, &located.tag.name).unwrap_or(html.len());
                markup.raw_text.push(located.span.end..close);
                skip_until = close;
            }
            markup.tags.push(located);
        }
        markup
    }

    /// Offset of the first `</name>` outside tags and raw-text content.
    pub fn end_tag(&self, name: &str) -> Option<usize> {
        let mut from = 0;
        while let Some(at) = find_close(self.html, from, name) {
            let hidden = self.raw_text.iter().any(|r| r.contains(&at))
                || self.tags.iter().any(|t| t.span.contains(&at));
            if !hidden {
                return Some(at);
            }
            from = at + 2;
        }
        None
    }

    /// Character data between tags, without comments or raw-text content.
    pub fn text_runs(&self) -> Vec<&'h str> {
        let mut skipped: Vec<Range<usize>> = self
            .tags
            .iter()
            .map(|t| t.span.clone())
            .chain(self.raw_text.iter().cloned())
            .collect();
        skipped.sort_by_key(|r| r.start);

        let mut runs = Vec::new();
        let mut pos = 0;
        for range in skipped {
            if range.start > pos {
                runs.extend(without_comments(&self.html[pos..range.start]));
            }
            pos = pos.max(range.end);
        }
        if pos < self.html.len() {
            runs.extend(without_comments(&self.html[pos..]));
        }
        runs.retain(|run| !run.is_empty());
        runs
    }
}

/// Map a tl element back to its start tag in `html`.
fn locate(html: &str, tag: &tl::HTMLTag, parser: &tl::Parser) -> Option<Located> {
    let name = tag.name().as_utf8_str().to_ascii_lowercase();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }

    let (offset, _) = tag.boundaries(parser);
    let start = html.get(..=offset)?.rfind('<')?;
    let after_name = start + 1 + name.len();
    if !html.get(start + 1..after_name)?.eq_ignore_ascii_case(&name) {
        return None;
    }
    let end = start_tag_end(html, after_name)?;
    let source = html[start..end].to_ascii_lowercase();

    // tl keeps attributes in a map; restore source order for re-rendering.
    let mut attrs: Vec<(usize, Attr)> = tag
        .attributes()
        .iter()
        .filter_map(|(key, value)| {
            let name = key.trim_end_matches('/').to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            let at = attr_offset(&source, &name, after_name - start);
            Some((
                at,
                Attr {
                    name,
                    value: value.map(|v| v.into_owned()),
                },
            ))
        })
        .collect();
    attrs.sort_by_key(|(at, _)| *at);

    Some(Located {
        tag: Tag {
            name,
            attrs: attrs.into_iter().map(|(_, attr)| attr).collect(),
            self_closing: source.ends_with("/>"),
        },
        span: start..end,
    })
}

/// End of a start tag whose attributes begin at `from`. Quoted values may
/// contain `>`.
fn start_tag_end(html: &str, from: usize) -> Option<usize> {
    let bytes = html.as_bytes();
    let mut quote = None;
    let mut after_eq = false;
    for (i, &b) in bytes.get(from..)?.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'>' => return Some(from + i + 1),
            None if after_eq && matches!(b, b'"' | b'\'') => quote = Some(b),
            None => {}
        }
        if quote.is_none() && !b.is_ascii_whitespace() {
            after_eq = b == b'=';
        }
    }
    None
}

/// Offset of attribute `name` within a lowercased start tag.
fn attr_offset(source: &str, name: &str, from: usize) -> usize {
    let bytes = source.as_bytes();
    let Some(rest) = source.get(from..) else {
        return usize::MAX;
    };
    rest.match_indices(name)
        .map(|(i, _)| from + i)
        .find(|&at| {
            let before = bytes[at - 1];
            let after = bytes.get(at + name.len()).copied();
            (before.is_ascii_whitespace() || matches!(before, b'"' | b'\'' | b'/'))
                && after.is_none_or(|b| b.is_ascii_whitespace() || matches!(b, b'=' | b'/' | b'>'))
        })
        .unwrap_or(usize::MAX)
}

fn without_comments(mut text: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    while let Some(open) = text.find("<!--") {
        runs.push(&text[..open]);
        match text[open + 4..].find("-->") {
            Some(close) => text = &text[open + 4 + close + 3..],
            None => return runs,
        }
    }
    runs.push(text);
    runs
}

/// Find `</name` (case-insensitive) at or after `from`.
fn find_close(html: &str, from: usize, name: &str) -> Option<usize> {
    let bytes = html.as_bytes();
    html.get(from..)?
        .match_indices("</")
        .map(|(i, _)| from + i)
        .find(|&at| {
            let name_end = at + 2 + name.len();
            bytes
                .get(at + 2..name_end)
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()))
                && bytes
                    .get(name_end)
                    .copied()
                    .is_none_or(|b| b.is_ascii_whitespace() || matches!(b, b'>' | b'/'))
        })
}

/// Apply `edit` to every start tag, copying everything else verbatim.
pub fn rewrite_tags(html: &str, mut edit: impl FnMut(&mut Tag) -> TagEdit) -> String {
    let mut out = String::with_capacity(html.len() + 256);
    let mut pos = 0;
    for Located { mut tag, span } in Markup::parse(html).tags {
        out.push_str(&html[pos..span.start]);
        match edit(&mut tag) {
            TagEdit::Keep => out.push_str(&html[span.clone()]),
            TagEdit::Rewrite => out.push_str(&tag.render()),
            TagEdit::Replace(markup) => out.push_str(&markup),
        }
        pos = span.end;
    }
    out.push_str(&html[pos..]);
    out
}

/// Iterate start tags in document order.
pub fn start_tags(html: &str) -> impl Iterator<Item = Tag> {
    Markup::parse(html).tags.into_iter().map(|l| l.tag)
}

/// Byte offset just after the first start tag named `name`.
fn after_start_tag(html: &str, name: &str) -> Option<usize> {
    Markup::parse(html)
        .tags
        .into_iter()
        .find(|l| l.tag.name == name)
        .map(|l| l.span.end)
}

/// Insert markup right after `<head>`, creating a head when there is none.
pub fn insert_after_head_open(html: &str, markup: &str) -> String {
    if let Some(at) = after_start_tag(html, "head") {
        return splice(html, at, markup);
    }
    if let Some(at) = after_start_tag(html, "html") {
        return splice(html, at, &format!("<head>{markup}</head>"));
    }
    format!("{markup}{html}")
}

/// Insert markup right before `</head>`, falling back to after `<head>`.
pub fn insert_before_head_close(html: &str, markup: &str) -> String {
    match Markup::parse(html).end_tag("head") {
        Some(at) => splice(html, at, markup),
        None => insert_after_head_open(html, markup),
    }
}

fn splice(html: &str, at: usize, markup: &str) -> String {
    let mut out = String::with_capacity(html.len() + markup.len());
    out.push_str(&html[..at]);
    out.push_str(markup);
    out.push_str(&html[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(html: &str) -> Vec<String> {
        start_tags(html).map(|t| t.name).collect()
    }

    #[test]
    fn test_locate_basic() {
        let html = r#"<p class="a">hi</p>"#;
        let markup = Markup::parse(html);
        assert_eq!(markup.tags.len(), 1);
        let located = &markup.tags[0];
        assert_eq!(located.tag.name, "p");
        assert_eq!(located.tag.get("class"), Some("a"));
        assert_eq!(&html[located.span.clone()], r#"<p class="a">"#);
    }

    #[test]
    fn test_nested_tags_in_source_order() {
        let html = r#"<div><p><a href="x">l</a></p><img src="i.png"></div>"#;
        assert_eq!(names(html), vec!["div", "p", "a", "img"]);
    }

    #[test]
    fn test_attribute_forms() {
        let tag = start_tags(r#"<IMG SRC="a b.png" ALT="x" hidden />"#)
            .next()
            .unwrap();
        assert_eq!(tag.name, "img");
        assert_eq!(tag.get("src"), Some("a b.png"));
        assert_eq!(tag.get("alt"), Some("x"));
        assert!(tag.has("hidden"));
        assert!(tag.self_closing);
    }

    #[test]
    fn test_quoted_angle_bracket() {
        let html = r#"<a title="1 > 0" href="x">t</a>"#;
        let markup = Markup::parse(html);
        assert_eq!(&html[markup.tags[0].span.clone()], r#"<a title="1 > 0" href="x">"#);
    }

    #[test]
    fn test_raw_text_is_opaque() {
        let html = "<script>if (a<b) { x = '<img src=y>' }</script><img src=z>";
        assert_eq!(names(html), vec!["script", "img"]);
    }

    #[test]
    fn test_comments_and_doctype() {
        assert_eq!(names("<!DOCTYPE html><!-- <img src=a> --><b>x</b>"), vec!["b"]);
    }

    #[test]
    fn test_stray_angle_is_text() {
        let html = "a < b and c<3";
        assert!(names(html).is_empty());
        assert_eq!(rewrite_tags(html, |_| TagEdit::Rewrite), html);
    }

    #[test]
    fn test_text_runs_skip_scripts_and_comments() {
        let html = "<p>one</p><script>two</script><!-- three -->four";
        let text = Markup::parse(html).text_runs().concat();
        assert!(text.contains("one"));
        assert!(text.contains("four"));
        assert!(!text.contains("two"));
        assert!(!text.contains("three"));
    }

    #[test]
    fn test_rewrite_preserves_untouched_bytes() {
        let html = "<!doctype html>\n<P  Class=x>text</P>\n<img src=\"a.png\">";
        let out = rewrite_tags(html, |tag| {
            if tag.name == "img" {
                tag.set("src", "b.png");
                TagEdit::Rewrite
            } else {
                TagEdit::Keep
            }
        });
        assert_eq!(out, "<!doctype html>\n<P  Class=x>text</P>\n<img src=\"b.png\">");
    }

    #[test]
    fn test_set_escapes_and_value_unescapes() {
        let mut tag = start_tags("<a title=\"x &amp; y\">t</a>").next().unwrap();
        assert_eq!(tag.value("title").as_deref(), Some("x & y"));
        tag.set("title", "\"q\"");
        assert_eq!(tag.render(), "<a title=\"&quot;q&quot;\">");
    }

    #[test]
    fn test_rename_keeps_position() {
        let mut tag = start_tags(r#"<img alt="a" src="x.png" class="c">"#)
            .next()
            .unwrap();
        tag.rename("src", "data-archive-url", "I/x.png");
        assert_eq!(
            tag.render(),
            r#"<img alt="a" data-archive-url="I/x.png" class="c">"#
        );
    }

    #[test]
    fn test_insert_head_helpers() {
        let html = "<html><head><title>t</title></head><body></body></html>";
        assert_eq!(
            insert_after_head_open(html, "<meta x>"),
            "<html><head><meta x><title>t</title></head><body></body></html>"
        );
        assert_eq!(
            insert_before_head_close(html, "<style></style>"),
            "<html><head><title>t</title><style></style></head><body></body></html>"
        );
    }

    #[test]
    fn test_insert_without_head() {
        assert_eq!(
            insert_after_head_open("<html><body>b</body></html>", "<meta x>"),
            "<html><head><meta x></head><body>b</body></html>"
        );
        assert_eq!(insert_before_head_close("<p>b</p>", "<meta x>"), "<meta x><p>b</p>");
    }

    #[test]
    fn test_head_close_inside_script_ignored() {
        let html = "<head><script>document.write('</head>')</script></head>";
        let out = insert_before_head_close(html, "<x>");
        assert!(out.ends_with("</script><x></head>"));
    }

    #[test]
    fn test_end_tag_needs_exact_name() {
        let html = "<head></header></head>";
        assert_eq!(Markup::parse(html).end_tag("head"), Some(15));
    }
}
