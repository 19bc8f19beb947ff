//! Directory entries: the archive's view of one path.

/// One entry of an archive, either content or a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Single-character namespace (`A` articles, `-` layout assets, `I` images).
    pub namespace: char,
    /// Path inside the namespace.
    pub url: String,
    pub title: String,
    /// Bare MIME type. Empty for redirects.
    pub mimetype: String,
    /// Target path for redirect entries.
    pub redirect_target: Option<String>,
}

impl DirectoryEntry {
    pub fn content(path: &str, mimetype: impl Into<String>) -> Option<Self> {
        let (namespace, url) = split_path(path)?;
        Some(Self {
            namespace,
            url: url.to_string(),
            title: title_from_url(url),
            mimetype: mimetype.into(),
            redirect_target: None,
        })
    }

    pub fn redirect(path: &str, target: impl Into<String>) -> Option<Self> {
        let (namespace, url) = split_path(path)?;
        Some(Self {
            namespace,
            url: url.to_string(),
            title: title_from_url(url),
            mimetype: String::new(),
            redirect_target: Some(target.into()),
        })
    }

    /// Full archive path, `A/Main_Page`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.namespace, self.url)
    }

    #[inline]
    pub fn is_redirect(&self) -> bool {
        self.redirect_target.is_some()
    }
}

/// Split `A/Main_Page` into namespace and url.
pub fn split_path(path: &str) -> Option<(char, &str)> {
    let (ns, url) = path.split_once('/')?;
    let mut chars = ns.chars();
    let namespace = chars.next()?;
    if chars.next().is_some() || url.is_empty() {
        return None;
    }
    Some((namespace, url))
}

fn title_from_url(url: &str) -> String {
    let last = url.rsplit('/').next().unwrap_or(url);
    let stem = last.rsplit_once('.').map_or(last, |(stem, _)| stem);
    stem.replace('_', " ")
}
