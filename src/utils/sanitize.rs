//! Utilities for sanitizing error messages before they land in a report.
//!
//! Error text often embeds server-controlled content (status lines, parser
//! messages quoting the document), so control characters are stripped and the
//! length is bounded.

/// Removes control characters (0x00-0x1F except tab/newline/carriage return,
/// and DEL) from a message.
pub fn sanitize_error_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| {
            let code = *c as u32;
            (code >= 0x20 && code != 0x7F) || code == 0x09 || code == 0x0A || code == 0x0D
        })
        .collect()
}

/// Sanitizes and truncates an error message to `MAX_ERROR_MESSAGE_LENGTH` characters.
///
/// Truncation happens on a character boundary and appends a note with the
/// original length.
pub fn sanitize_and_truncate_error_message(message: &str) -> String {
    let sanitized = sanitize_error_message(message);
    let char_count = sanitized.chars().count();

    if char_count > crate::config::MAX_ERROR_MESSAGE_LENGTH {
        let keep = crate::config::MAX_ERROR_MESSAGE_LENGTH.saturating_sub(50);
        let head: String = sanitized.chars().take(keep).collect();
        format!("{head}... (truncated, original length: {char_count} chars)")
    } else {
        sanitized
    }
}
