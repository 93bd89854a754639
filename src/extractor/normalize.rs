//! Canonical text normalization applied to extracted document text.
//!
//! The output contains no control characters, no leading or trailing
//! whitespace, and words separated by exactly one ASCII space. Applying
//! [`normalize_text`] to its own output returns the same string.

const LINE_FEED: char = '\n';

/// Normalize extracted text into a single line of space-separated words.
#[inline]
pub fn normalize_text(text: &str) -> String {
    let unified = unify_line_breaks(text);
    let cleaned = replace_control_chars(&unified);
    collapse_whitespace(&cleaned)
}

/// Map CR, CRLF, VT, FF, NEL, LS and PS onto a single `\n`.
fn unify_line_breaks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&LINE_FEED) {
                    chars.next();
                }
                out.push(LINE_FEED);
            }
            '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}' => out.push(LINE_FEED),
            _ => out.push(c),
        }
    }

    out
}

/// Replace C0 controls (other than `\n`) and DEL with a space.
fn replace_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c != LINE_FEED && (c <= '\u{001F}' || c == '\u{007F}') {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Collapse every whitespace run into one space and trim both ends.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
