//! Text cleanup shared by the mail backends.

/// Maximum characters of body text kept per message.
pub const MAX_BODY_CHARS: usize = 2000;

/// Placeholder used when a message has no readable text.
pub const EMPTY_BODY: &str = "No readable content found";

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    collapse_whitespace(&result)
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalise a body for the digest: one line, at most [`MAX_BODY_CHARS`].
///
/// Bodies never contain newlines afterwards, so the double-newline join in a
/// summary record always splits back into the original bodies.
pub fn normalize_body(body: &str) -> String {
    let collapsed = collapse_whitespace(body);
    if collapsed.is_empty() {
        return EMPTY_BODY.to_string();
    }
    truncate_chars(&collapsed, MAX_BODY_CHARS)
}

/// Normalise a header value (sender, subject) to a single line.
pub fn single_line(value: &str, fallback: &str) -> String {
    let collapsed = collapse_whitespace(value);
    if collapsed.is_empty() {
        fallback.to_string()
    } else {
        collapsed
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => s[..end].to_string(),
        None => s.to_string(),
    }
}
