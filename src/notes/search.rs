//! Keyword matching and snippet extraction

/// Characters of context returned around a match (half before, half after)
pub const CONTEXT_LENGTH: usize = 100;

const ELLIPSIS: &str = "...";

fn fold(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

/// Case-insensitive position (in chars) of the first occurrence of `needle`
fn find_folded(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Case-insensitive substring test
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || find_folded(&fold(haystack), &fold(needle)).is_some()
}

/// Snippet of `content` centred on the first occurrence of `keyword`.
///
/// Falls back to the leading `CONTEXT_LENGTH` characters when the keyword
/// does not occur in the content (a file matched by name only). Ellipses mark
/// each side that was clipped.
pub fn extract_context(content: &str, keyword: &str) -> String {
    let chars: Vec<char> = content.chars().collect();

    let Some(pos) = find_folded(&fold(content), &fold(keyword)) else {
        if chars.len() > CONTEXT_LENGTH {
            let head: String = chars[..CONTEXT_LENGTH].iter().collect();
            return head + ELLIPSIS;
        }
        return content.to_string();
    };

    let keyword_len = keyword.chars().count();
    let start = pos.saturating_sub(CONTEXT_LENGTH / 2);
    let end = (pos + keyword_len + CONTEXT_LENGTH / 2).min(chars.len());

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_returned_whole() {
        assert_eq!(extract_context("a keyword here", "keyword"), "a keyword here");
    }

    #[test]
    fn window_is_centred_on_first_match() {
        let content = format!("{}keyword{}", "x".repeat(80), "y".repeat(80));
        let snippet = extract_context(&content, "KEYWORD");

        let expected = format!("...{}keyword{}...", "x".repeat(50), "y".repeat(50));
        assert_eq!(snippet, expected);
        assert!(snippet.chars().count() <= CONTEXT_LENGTH + "keyword".len() + 2 * ELLIPSIS.len());
    }

    #[test]
    fn clipping_only_marks_clipped_side() {
        let content = format!("0123456789keyword{}", "z".repeat(120));
        let snippet = extract_context(&content, "keyword");
        assert!(snippet.starts_with("0123456789keyword"));
        assert!(snippet.ends_with(ELLIPSIS));

        let content = format!("{}keyword tail", "a".repeat(70));
        let snippet = extract_context(&content, "keyword");
        assert!(snippet.starts_with(ELLIPSIS));
        assert!(snippet.ends_with("keyword tail"));
    }

    #[test]
    fn missing_keyword_falls_back_to_head() {
        let content = "b".repeat(150);
        assert_eq!(extract_context(&content, "nothing"), format!("{}...", "b".repeat(100)));
        assert_eq!(extract_context("short", "nothing"), "short");
    }

    #[test]
    fn multibyte_content_is_sliced_on_char_boundaries() {
        let content = format!("{}笔记{}", "中".repeat(60), "文".repeat(60));
        let snippet = extract_context(&content, "笔记");
        assert_eq!(snippet, format!("...{}笔记{}...", "中".repeat(50), "文".repeat(50)));
    }

    #[test]
    fn case_insensitive_contains() {
        assert!(contains_ignore_case("Rust Notes.md", "notes"));
        assert!(!contains_ignore_case("Rust.md", "python"));
    }
}
