//! HTTP date parsing and formatting.
//!
//! Accepts the three date grammars HTTP/1.1 permits in `If-Modified-Since`:
//!
//! ```text
//! Sun, 06 Nov 1994 08:49:37 GMT    ; RFC 1123
//! Sunday, 06-Nov-94 08:49:37 GMT   ; RFC 850
//! Sun Nov  6 08:49:37 1994         ; ANSI C asctime()
//! ```
//!
//! Some clients append a `; length=N` extension, which is ignored.

use chrono::{DateTime, NaiveDateTime, Utc};

const RFC1123: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME: &str = "%a %b %d %H:%M:%S %Y";

/// Parse an HTTP date. Returns `None` for anything unparseable.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.split(';').next()?;
    // asctime pads single-digit days with an extra space
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }

    [RFC1123, RFC850, ASCTIME]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Format a timestamp for `Last-Modified` (RFC 1123).
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(RFC1123).to_string()
}
