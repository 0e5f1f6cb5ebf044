//! Markdown fixups for partially streamed text
//!
//! A streamed teacher message is rendered after every fragment, so half-open
//! constructs (a code fence whose closing line has not arrived, a dangling
//! `**`) would otherwise swallow the rest of the view until the turn ends.

use std::borrow::Cow;

/// Fragment to append after `existing`, with a line break inserted when a
/// fence marker would otherwise land mid-line
pub fn join_fragment<'a>(existing: &str, fragment: &'a str) -> Cow<'a, str> {
    let opens_fence = {
        let trimmed = fragment.trim_start_matches([' ', '\t']);
        trimmed.starts_with("```") || trimmed.starts_with("~~~")
    };
    if opens_fence && !existing.is_empty() && !existing.ends_with('\n') {
        Cow::Owned(format!("\n{fragment}"))
    } else {
        Cow::Borrowed(fragment)
    }
}

/// Close any fence, inline code span, or strong emphasis left open at the
/// end of `text`
pub fn close_open_spans(text: &str) -> Cow<'_, str> {
    let mut fence: Option<&str> = None;
    let mut in_code_span = false;
    let mut in_strong = false;

    for line in text.split('\n') {
        let trimmed = line.trim_start_matches([' ', '\t']);
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (fence, marker) {
            (Some(open), Some(m)) if open == m => {
                fence = None;
                continue;
            }
            (Some(_), _) => continue,
            (None, Some(m)) => {
                fence = Some(m);
                in_code_span = false;
                continue;
            }
            (None, None) => {}
        }

        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '`' => in_code_span = !in_code_span,
                '*' if !in_code_span && chars.peek() == Some(&'*') => {
                    chars.next();
                    in_strong = !in_strong;
                }
                _ => {}
            }
        }
    }

    if let Some(marker) = fence {
        let separator = if text.ends_with('\n') { "" } else { "\n" };
        return Cow::Owned(format!("{text}{separator}{marker}"));
    }

    if !in_code_span && !in_strong {
        return Cow::Borrowed(text);
    }

    let mut closed = text.to_string();
    if in_code_span {
        closed.push('`');
    }
    if in_strong {
        closed.push_str("**");
    }
    Cow::Owned(closed)
}
