use chrono::{DateTime, Local, TimeZone, Utc};

use crate::common::{DATETIME_STRSAFE, OBJECT_NAME_TIMESTAMP};

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render epoch milliseconds in the local timezone with [`DATETIME_STRSAFE`].
pub fn format_millis(millis: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|time| time.format(DATETIME_STRSAFE).to_string())
}

/// `<stem>_<timestamp>`, the naming scheme for stored objects.
pub fn timestamped_name(stem: impl AsRef<str>, now: DateTime<Local>) -> String {
    format!("{}_{}", stem.as_ref(), now.format(OBJECT_NAME_TIMESTAMP))
}

/// Everything after the last `/` of a URL, without query string.
pub fn last_url_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Replace the characters that are unsafe inside HTML text and attributes.
pub fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
