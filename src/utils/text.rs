//! Text normalization helpers shared across the search pipeline.

use std::sync::OnceLock;

use regex::Regex;

/// Collapse all interior whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Legal suffixes dropped from the tail of a company name during
/// normalization.
const COMPANY_LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "corp",
    "corporation",
    "co",
    "llc",
    "ltd",
    "lp",
    "plc",
    "pc",
    "holdings",
    "holding",
    "group",
    "technologies",
    "technology",
];

fn non_alnum_company_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9\s]").expect("company name pattern"))
}

/// Normalize a company name into the join key used by the sponsor dataset:
/// lowercased, punctuation stripped, trailing legal suffixes removed.
///
/// Placeholder spreadsheet values ("nan", "n/a", ...) normalize to empty.
pub fn normalize_company_name(name: &str) -> String {
    let text = name.trim();
    if text.is_empty() {
        return String::new();
    }
    let lower = text.to_lowercase();
    if matches!(lower.as_str(), "nan" | "none" | "null" | "na" | "n/a") {
        return String::new();
    }
    let cleaned = non_alnum_company_regex().replace_all(&lower, " ");
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while let Some(last) = tokens.last() {
        if !COMPANY_LEGAL_SUFFIXES.contains(last) {
            break;
        }
        tokens.pop();
    }
    tokens.join(" ")
}

/// Tokenize free text for title matching. Letters, digits, `+` and `#` are
/// token characters; everything else separates.
pub fn tokenize_search_text(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Truncate to at most `max_chars` characters without splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n b\t c  "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_normalize_company_name_strips_suffixes() {
        assert_eq!(normalize_company_name("Acme Inc"), "acme");
        assert_eq!(normalize_company_name("Acme Holdings, LLC"), "acme");
        assert_eq!(normalize_company_name("Initech Technologies Group"), "initech");
    }

    #[test]
    fn test_normalize_company_name_placeholders() {
        assert_eq!(normalize_company_name("N/A"), "");
        assert_eq!(normalize_company_name("nan"), "");
        assert_eq!(normalize_company_name("  "), "");
    }

    #[test]
    fn test_normalize_company_name_punctuation() {
        assert_eq!(normalize_company_name("O'Reilly & Sons Co."), "o reilly sons");
    }

    #[test]
    fn test_tokenize_search_text() {
        assert_eq!(tokenize_search_text("C++ Engineer"), vec!["c++", "engineer"]);
        assert_eq!(tokenize_search_text("Sr. C# Dev"), vec!["sr", "c#", "dev"]);
        assert!(tokenize_search_text(" , . ").is_empty());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
