//! Telegram MarkdownV2 helpers.
//!
//! MarkdownV2 rejects any message containing an unescaped reserved character, so every
//! piece of user or configuration text goes through [`escape_markdown`] before it is
//! embedded in a formatted message.

const RESERVED: [char; 18] = [
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escapes MarkdownV2 special characters so they render literally.
///
/// # Example
/// ```
/// use wedding_rsvp_bot::utils::markdown::escape_markdown;
///
/// let escaped = escape_markdown("Dinner (7 p.m.)!");
/// assert_eq!(escaped, "Dinner \\(7 p\\.m\\.\\)\\!");
/// ```
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Wraps already escaped text in bold markers.
pub fn bold(escaped: &str) -> String {
    format!("*{escaped}*")
}
