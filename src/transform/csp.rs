//! Content-security directive insertion.
//!
//! Documents get a `<meta http-equiv="Content-Security-Policy">` that keeps
//! fetches inside the reader. Directives the archive already carries are
//! never touched: browsers enforce every CSP meta, so adding ours can only
//! narrow what the document may load.

use super::scan::{insert_after_head_open, start_tags};
use crate::config::SecurityConfig;
use crate::utils::html::escape_attr;

const HTTP_EQUIV: &str = "content-security-policy";

/// Policy string for documents, also sent as an HTTP header in proxied mode.
pub fn policy(security: &SecurityConfig) -> String {
    format!(
        "default-src 'self' 'unsafe-inline' 'unsafe-eval' data: blob:{}",
        security.allow_list()
    )
}

/// Insert `policy` unless an identical directive is already present.
pub fn insert_csp(html: &str, policy: &str) -> String {
    let present = start_tags(html).any(|tag| {
        tag.name == "meta"
            && tag
                .value("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case(HTTP_EQUIV))
            && tag.value("content").as_deref() == Some(policy)
    });
    if present {
        return html.to_string();
    }

    let meta = format!(
        "<meta http-equiv=\"Content-Security-Policy\" content=\"{}\">",
        escape_attr(policy)
    );
    insert_after_head_open(html, &meta)
}
