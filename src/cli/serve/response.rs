//! HTTP response handlers.

use anyhow::{Result, anyhow};
use std::io::Cursor;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::utils::mime::{self, types::PLAIN};

/// Extra headers that depend on what is being served.
#[derive(Debug, Default)]
pub struct Extra {
    /// `Content-Security-Policy` for documents.
    pub csp: Option<String>,
    /// Save-to-disk filename (`Content-Disposition: attachment`).
    pub attachment: Option<String>,
}

/// Respond with archive bytes. Honors HEAD and byte ranges.
pub fn respond_bytes(request: Request, mimetype: &str, body: Vec<u8>, extra: Extra) -> Result<()> {
    let mut headers = vec![
        header("Content-Type", &mime::with_charset(mimetype))?,
        make_header("Accept-Ranges", "bytes"),
    ];
    if let Some(csp) = &extra.csp {
        headers.push(header("Content-Security-Policy", csp)?);
    }
    if let Some(filename) = &extra.attachment {
        let value = format!("attachment; filename=\"{}\"", ascii_filename(filename));
        headers.push(header("Content-Disposition", &value)?);
    }

    if is_head_request(&request) {
        let mut response = Response::empty(StatusCode(200));
        for h in headers {
            response.add_header(h);
        }
        request.respond(response)?;
        return Ok(());
    }

    // Range requests come from media seeking.
    if let Some(range) = get_range_header(&request) {
        return respond_range(request, headers, body, &range);
    }

    let mut response = Response::from_data(body).with_status_code(StatusCode(200));
    for h in headers {
        response.add_header(h);
    }
    request.respond(response)?;
    Ok(())
}

/// Header-safe rendition of a filename.
fn ascii_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect()
}

fn respond_range(request: Request, headers: Vec<Header>, body: Vec<u8>, range: &str) -> Result<()> {
    let size = body.len() as u64;
    let range = range.strip_prefix("bytes=").unwrap_or(range);

    let Some((start, end)) = parse_range(range, size) else {
        let response = Response::empty(StatusCode(416))
            .with_header(header("Content-Range", &format!("bytes */{size}"))?);
        request.respond(response)?;
        return Ok(());
    };

    let slice = body[start as usize..=end as usize].to_vec();
    let length = slice.len();
    let mut headers = headers;
    headers.push(header(
        "Content-Range",
        &format!("bytes {start}-{end}/{size}"),
    )?);

    let response = Response::new(StatusCode(206), headers, Cursor::new(slice), Some(length), None);
    request.respond(response)?;
    Ok(())
}

/// Parse a Range value "start-end" into inclusive byte offsets.
/// `None` when the range cannot be satisfied.
fn parse_range(range: &str, size: u64) -> Option<(u64, u64)> {
    if size == 0 {
        return None;
    }
    let last = size - 1;
    let (s, e) = range.trim().split_once('-')?;
    let (s, e) = (s.trim(), e.trim());

    let (start, end) = match (s.is_empty(), e.is_empty()) {
        // "0-499"
        (false, false) => (s.parse().ok()?, e.parse::<u64>().ok()?.min(last)),
        // "500-"
        (false, true) => (s.parse().ok()?, last),
        // "-500": last 500 bytes
        (true, false) => {
            let suffix: u64 = e.parse().ok()?;
            if suffix == 0 {
                return None;
            }
            (size.saturating_sub(suffix), last)
        }
        (true, true) => return None,
    };

    (start <= end).then_some((start, end))
}

fn get_range_header(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case("range"))
        .map(|h| h.value.to_string())
}

/// Respond with 302 to an archive path or site-absolute URL.
pub fn respond_redirect(request: Request, location: &str) -> Result<()> {
    let response = Response::empty(StatusCode(302)).with_header(header("Location", location)?);
    request.respond(response)?;
    Ok(())
}

pub fn respond_not_found(request: Request) -> Result<()> {
    if is_head_request(&request) {
        return send_head(request, 404, PLAIN);
    }
    send_body(request, 404, PLAIN, b"404 Not Found".to_vec())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, PLAIN, b"503 Service Unavailable".to_vec())
}

/// Respond with an embedded script.
pub fn respond_script(request: Request, body: &'static str) -> Result<()> {
    use crate::utils::mime::types::JAVASCRIPT;

    if is_head_request(&request) {
        return send_head(request, 200, JAVASCRIPT);
    }
    send_body(request, 200, JAVASCRIPT, body.as_bytes().to_vec())
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response =
        Response::empty(StatusCode(status)).with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

/// Header with a runtime value. Archive paths and policies may carry bytes
/// tiny_http refuses.
fn header(key: &'static str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow!("invalid {key} header value: {value:?}"))
}

fn make_header(key: &'static str, value: &'static str) -> Header {
    Header::from_bytes(key, value).unwrap()
}
