//! Text truncation for results, prompt context and summaries.

/// Marker appended to truncated text.
pub const ELLIPSIS: char = '…';

/// Truncate `text` to at most `max_chars` characters (not bytes).
///
/// When truncation happens the last kept character is replaced by `…`, so the
/// output never exceeds the limit.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut truncated: String = text.chars().take(max_chars - 1).collect();
    truncated.push(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn long_text_is_cut_with_marker() {
        let out = truncate_chars("hello world", 6);
        assert_eq!(out, "hello…");
        assert_eq!(out.chars().count(), 6);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(truncate_chars("日本語テキスト", 4), "日本語…");
    }

    #[test]
    fn zero_limit_yields_empty() {
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
