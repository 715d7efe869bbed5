//! Text cleanup applied to raw OCR transcriptions before tokenizing
//!
//! Two flavors share every step except the spaced period, the period spacing
//! and whether hyphens survive: alignment keeps tokens comparable across
//! copies, training keeps the text readable.

use serde::{Deserialize, Serialize};

/// Which consumer the sanitized text is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanitizeMode {
    Alignment,
    Training,
}

/// Clean `text` for the given mode.
pub fn sanitize(text: &str, mode: SanitizeMode) -> String {
    let mut text = text
        .replace('\u{2014}', "--")
        .replace(&['\u{201c}', '\u{201d}', '\u{2018}'][..], "\"")
        .replace('\u{2019}', "'");

    text = match mode {
        SanitizeMode::Alignment => text.replace(" . ", " ."),
        SanitizeMode::Training => text.replace(" . ", ". "),
    };

    text = text
        .replace(" , ", ", ")
        .replace(" ' ", "'")
        .replace('|', "")
        .replace('"', "'");

    let mut text = collapse_whitespace(&text).replace("- ", "");

    if mode == SanitizeMode::Alignment {
        text = space_after_periods(&text);
    }

    let keep_hyphens = mode == SanitizeMode::Alignment;
    let filtered: String = text
        .chars()
        .filter(|&ch| {
            ch.is_ascii_alphanumeric()
                || matches!(ch, '.' | ',' | '+')
                || ch.is_whitespace()
                || (keep_hyphens && ch == '-')
        })
        .collect();

    filtered.trim().to_string()
}

/// Split sanitized text into tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

/// `sanitize` then `tokenize`
pub fn sanitize_tokens(text: &str, mode: SanitizeMode) -> Vec<String> {
    tokenize(&sanitize(text, mode))
}

fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

// A period and the character after it are consumed together, so in "..." only
// the first pair gets split.
fn space_after_periods(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        result.push(ch);
        if ch != '.' {
            continue;
        }
        if let Some(&next) = chars.peek() {
            if next != ' ' {
                result.push(' ');
                result.push(next);
                chars.next();
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_collapses_and_trims() {
        let text = "  WASHINGTON,\n\n  Jan.  5\t(AP)  ";
        assert_eq!(sanitize(text, SanitizeMode::Alignment), "WASHINGTON, Jan. 5 AP");
    }

    #[test]
    fn test_line_break_hyphen_dropped() {
        assert_eq!(sanitize("the govern- ment said", SanitizeMode::Alignment), "the government said");
        assert_eq!(sanitize("govern-\nment", SanitizeMode::Training), "government");
    }

    #[test]
    fn test_hyphens_kept_only_for_alignment() {
        assert_eq!(sanitize("well-known", SanitizeMode::Alignment), "well-known");
        assert_eq!(sanitize("well-known", SanitizeMode::Training), "wellknown");
    }

    #[test]
    fn test_em_dash() {
        assert_eq!(sanitize("war\u{2014}and peace", SanitizeMode::Alignment), "war--and peace");
    }

    #[test]
    fn test_quotes_and_bars_removed() {
        let text = "\u{201c}Yes,\u{201d} he | said \u{2019}twas";
        assert_eq!(sanitize(text, SanitizeMode::Alignment), "Yes, he said twas");
    }

    #[test]
    fn test_spaced_period_per_mode() {
        assert_eq!(sanitize("end . Next", SanitizeMode::Alignment), "end . Next");
        assert_eq!(sanitize("end . Next", SanitizeMode::Training), "end. Next");
    }

    #[test]
    fn test_period_spacing_alignment_only() {
        assert_eq!(sanitize("ends.Starts", SanitizeMode::Alignment), "ends. Starts");
        assert_eq!(sanitize("ends.Starts", SanitizeMode::Training), "ends.Starts");
        assert_eq!(space_after_periods("a...b"), "a. .. b");
    }

    #[test]
    fn test_spaced_comma() {
        assert_eq!(sanitize("one , two", SanitizeMode::Training), "one, two");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize(" a  b\nc "), vec!["a", "b", "c"]);
        assert!(tokenize("   ").is_empty());
        assert_eq!(sanitize_tokens("x | y", SanitizeMode::Alignment), vec!["x", "y"]);
    }
}
