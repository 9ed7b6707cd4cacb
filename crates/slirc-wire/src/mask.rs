//! Glob matching for server masks and ban masks.

use crate::casemap::irc_lower_char;

/// Match `text` against `pattern` where `*` matches any run and `?` any
/// single character. Comparison is RFC 1459 case-insensitive.
///
/// ```
/// use slirc_wire::wildcard_match;
/// assert!(wildcard_match("*.example.net", "leaf.Example.NET"));
/// assert!(!wildcard_match("hub?.net", "hub.net"));
/// ```
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star {
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_wildcards() {
        assert!(wildcard_match("hub.example.net", "HUB.example.net"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*.net", "leaf.example.net"));
        assert!(wildcard_match("l??f.*", "leaf.example"));
        assert!(!wildcard_match("leaf.*", "hub.example"));
    }

    #[test]
    fn backtracks_over_stars() {
        assert!(wildcard_match("*a*b", "xaybzab"));
        assert!(!wildcard_match("*a*b", "xaybza"));
        assert!(wildcard_match("*!*@*.example", "nick!ident@host.EXAMPLE"));
    }
}
