//! Input document cleanup applied before YAML/JSON decoding.
//!
//! Real-world OpenAPI documents occasionally carry control characters that
//! make strict YAML decoders fail. They are stripped up front, matching the
//! characters that have bitten in practice: NUL, backspace, TAB (space is
//! kept) and textual `\u00XX` escapes outside the `<>&` markup range.

use regex::Regex;
use std::sync::OnceLock;

fn escape_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\\u00(0[0-9a-fA-F]|1[0-9a-fA-F]|7f)").expect("hardcoded pattern is valid")
    })
}

/// Removes control characters and textual control escapes from a raw
/// document.
#[must_use]
pub fn strip_control_characters(input: &str) -> String {
    let without_raw: String = input
        .chars()
        .map(|ch| if ch == '\t' { ' ' } else { ch })
        .filter(|ch| !matches!(ch, '\u{0}' | '\u{8}'))
        .collect();
    escape_pattern().replace_all(&without_raw, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_control_characters_are_removed() {
        let input = "title: Pet\u{0} Store\u{8}";
        assert_eq!(strip_control_characters(input), "title: Pet Store");
    }

    #[test]
    fn tabs_are_removed_spaces_kept() {
        let input = "a:\tb c";
        assert_eq!(strip_control_characters(input), "a: b c");
    }

    #[test]
    fn textual_escapes_are_removed() {
        let input = r"description: weird\u0008 text";
        assert_eq!(strip_control_characters(input), "description: weird text");
    }

    #[test]
    fn normal_text_is_untouched() {
        let input = "openapi: 3.0.0\ninfo:\n  title: Pets <&> more";
        assert_eq!(strip_control_characters(input), input);
    }
}
