//! Outbound message splitting
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Split reminder listings and notifications instead of truncating
//! - 1.0.0: Initial release

/// Discord message content limit
pub const MESSAGE_LIMIT: usize = 2000;

/// Split text into pieces of at most `max_size` bytes.
///
/// Prefers line boundaries; a single line longer than the limit is cut on
/// UTF-8 character boundaries.
pub fn split_text(text: &str, max_size: usize) -> Vec<String> {
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let needed = if current.is_empty() { line.len() } else { line.len() + 1 };
        if current.len() + needed <= max_size {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            continue;
        }

        if !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        if line.len() <= max_size {
            current.push_str(line);
        } else {
            let mut pieces = split_line(line, max_size);
            // Keep the tail open so following lines can join it
            current = pieces.pop().unwrap_or_default();
            parts.extend(pieces);
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn split_line(line: &str, max_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, ch) in line.char_indices() {
        if idx + ch.len_utf8() - start > max_size {
            pieces.push(line[start..idx].to_string());
            start = idx;
        }
    }
    pieces.push(line[start..].to_string());
    pieces
}

/// Split text to fit in Discord messages
pub fn split_message(text: &str) -> Vec<String> {
    split_text(text, MESSAGE_LIMIT)
}
