//! A small `*`/`?` wildcard matcher.
//!
//! `-m` (spec.md §6) wants substring-style glob matching, not a full regex
//! engine; `-M`/`-R` (legacy match/reject) compile through the `regex`
//! crate instead, behind the `cli` feature, where the pattern genuinely
//! needs regex semantics. Kept dependency-free so the core never needs
//! `regex` to run.

/// Classic recursive glob match: `*` matches any run of characters
/// (including none), `?` matches exactly one character, everything else
/// matches literally.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            match_from(&pattern[1..], text)
                || (!text.is_empty() && match_from(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && match_from(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && match_from(&pattern[1..], &text[1..]),
    }
}

/// Wraps a bare pattern with `*…*` for substring matching, as `-m` does
/// when the user hasn't supplied their own wildcards (spec.md §6: "PAT,
/// auto-wrapped with `*…*` for substring match").
#[must_use]
pub fn wrap_substring(pattern: &str) -> String {
    if pattern.contains('*') || pattern.contains('?') {
        pattern.to_string()
    } else {
        format!("*{pattern}*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn exact_match() {
        assert!(glob_match("BHZ", "BHZ"));
        assert!(!glob_match("BHZ", "BHE"));
    }

    #[test]
    fn star_wildcard() {
        assert!(glob_match("*BHZ*", "NET.STA..BHZ"));
        assert!(glob_match("NET.*", "NET.STA..BHZ"));
        assert!(!glob_match("XYZ.*", "NET.STA..BHZ"));
    }

    #[test]
    fn question_wildcard() {
        assert!(glob_match("BH?", "BHZ"));
        assert!(!glob_match("BH?", "BHZZ"));
    }

    #[test]
    fn auto_wrap_leaves_existing_wildcards_alone() {
        assert_eq!(wrap_substring("BHZ"), "*BHZ*");
        assert_eq!(wrap_substring("*BHZ"), "*BHZ");
        assert_eq!(wrap_substring("BH?"), "BH?");
    }
}
