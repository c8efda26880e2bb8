use regex::Regex;
use std::sync::OnceLock;

static NON_WORD: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();
static TOKEN: OnceLock<Regex> = OnceLock::new();

/// Lowercase, replace non-word characters with spaces, collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"\W").expect("valid regex"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let lowered = text.to_lowercase();
    let spaced = non_word.replace_all(&lowered, " ");
    whitespace.replace_all(&spaced, " ").trim().to_string()
}

/// Split cleaned text into terms of two or more word characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    let token = TOKEN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));
    token.find_iter(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_normalizes() {
        assert_eq!(clean_text("  Need ACCESS to   VPN!!  "), "need access to vpn");
        assert_eq!(clean_text("printer\tbroken\n(again)"), "printer broken again");
        assert_eq!(clean_text("snake_case stays"), "snake_case stays");
    }

    #[test]
    fn test_clean_text_empty_and_symbols() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("!!! ???"), "");
    }

    #[test]
    fn test_tokenize_skips_single_characters() {
        let tokens: Vec<&str> = tokenize("a vpn is down x2").collect();
        assert_eq!(tokens, vec!["vpn", "is", "down", "x2"]);
    }
}
