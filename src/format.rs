use crate::msg::Method;
use crate::status::StatusCode;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// Identity reported when the application supplies no name.
pub const SERVER_NAME_DEFAULT: &[u8] = b"htx server";
pub const CLIENT_NAME_DEFAULT: &[u8] = b"htx client";

/// RFC 1123 date, always rendered in GMT.
static DATE_FMT: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

const DATE_FALLBACK: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

pub fn http_date(unix_secs: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix_secs)
        .ok()
        .and_then(|t| t.format(&DATE_FMT).ok())
        .unwrap_or_else(|| DATE_FALLBACK.to_string())
}

/// Reformats the Date header only when the second changes.
#[derive(Debug)]
pub struct DateCache {
    last_secs: i64,
    cached: String,
}

impl DateCache {
    pub fn new() -> Self {
        Self {
            last_secs: i64::MIN,
            cached: String::new(),
        }
    }

    pub fn get(&mut self, unix_secs: i64) -> &str {
        if unix_secs != self.last_secs {
            self.cached = http_date(unix_secs);
            self.last_secs = unix_secs;
        }
        &self.cached
    }
}

impl Default for DateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Server reply head: status line, protocol headers, app headers
/// verbatim, blank line.
pub fn response_head(
    code: StatusCode,
    date: &str,
    server: &[u8],
    body_len: u64,
    app_headers: &[u8],
) -> Vec<u8> {
    let mut head = Vec::with_capacity(128 + app_headers.len());
    head.extend_from_slice(format!("HTTP/1.1 {}\r\n", code).as_bytes());
    head.extend_from_slice(format!("Date: {}\r\n", date).as_bytes());
    head.extend_from_slice(b"Server: ");
    head.extend_from_slice(server);
    head.extend_from_slice(b"\r\n");
    head.extend_from_slice(format!("Content-Length: {}\r\n", body_len).as_bytes());
    head.extend_from_slice(app_headers);
    head.extend_from_slice(b"\r\n");
    head
}

/// Client request head. `content_length` is present for POST only.
pub fn request_head(
    method: Method,
    target_path: &[u8],
    target_query: &[u8],
    host: &[u8],
    user_agent: &[u8],
    content_length: Option<u64>,
    app_headers: &[u8],
) -> Vec<u8> {
    let mut head = Vec::with_capacity(128 + target_path.len() + app_headers.len());
    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(target_path);
    if !target_query.is_empty() {
        head.push(b'?');
        head.extend_from_slice(target_query);
    }
    head.extend_from_slice(b" HTTP/1.1\r\n");
    head.extend_from_slice(b"Host: ");
    head.extend_from_slice(host);
    head.extend_from_slice(b"\r\n");
    head.extend_from_slice(b"User-Agent: ");
    head.extend_from_slice(user_agent);
    head.extend_from_slice(b"\r\n");
    if let Some(len) = content_length {
        head.extend_from_slice(format!("Content-Length: {}\r\n", len).as_bytes());
    }
    head.extend_from_slice(app_headers);
    head.extend_from_slice(b"\r\n");
    head
}

/// Canned error reply emitted before closing on a client protocol error.
pub fn error_response(code: StatusCode, date: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {}\r\nDate: {}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        code, date
    )
    .into_bytes()
}
