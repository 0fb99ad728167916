//! Pattern matching utilities for prompt detection.

use std::ops::Range;

use regex::bytes::Regex;

use super::buffer::PatternBuffer;
use crate::platform::PrivilegeLevel;

/// What a read waits for.
#[derive(Debug, Clone)]
pub enum Expectation {
    /// A regex tested against the buffer tail.
    Regex(Regex),

    /// A literal substring anywhere in the unread buffer.
    Exact(String),

    /// Any configured prompt (the joined prompt pattern).
    Prompt,
}

impl Expectation {
    /// Compile a regex expectation.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// A literal expectation.
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Offset just past the match in `buffer`, if the expectation is met.
    pub(crate) fn find_end(&self, buffer: &PatternBuffer, prompt: &Regex) -> Option<usize> {
        match self {
            Self::Regex(pattern) => buffer.search_tail(pattern).map(|r| r.end),
            Self::Exact(text) => buffer.find_literal(text.as_bytes()),
            Self::Prompt => buffer.search_tail(prompt).map(|r| r.end),
        }
    }
}

/// Build a single regex that matches any privilege level's prompt.
///
/// Each level's pattern is wrapped in a non-capturing group so inline flags
/// such as `(?mi)` stay scoped to that level.
pub fn joined_prompt_pattern<'a, I>(levels: I) -> Result<Regex, regex::Error>
where
    I: IntoIterator<Item = &'a PrivilegeLevel>,
{
    let joined = levels
        .into_iter()
        .map(|level| format!("(?:{})", level.pattern.as_str()))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&joined)
}

/// Last match of `pattern` in `haystack` starting at or after `start`.
///
/// Anchors see the bytes before `start`.
pub(crate) fn last_match_from(pattern: &Regex, haystack: &[u8], start: usize) -> Option<Range<usize>> {
    let mut last = None;
    let mut at = start;
    while at <= haystack.len() {
        let Some(m) = pattern.find_at(haystack, at) else {
            break;
        };
        at = if m.end() == m.start() { m.end() + 1 } else { m.end() };
        last = Some(m.range());
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> Vec<PrivilegeLevel> {
        vec![
            PrivilegeLevel::new("exec", r"(?m)^\w+>\s*$").unwrap(),
            PrivilegeLevel::new("privilege_exec", r"(?m)^\w+#\s*$").unwrap(),
        ]
    }

    #[test]
    fn test_joined_prompt_pattern() {
        let joined = joined_prompt_pattern(&levels()).unwrap();
        assert!(joined.is_match(b"banner\nrouter>"));
        assert!(joined.is_match(b"banner\nrouter# "));
        assert!(!joined.is_match(b"Password: "));
    }

    #[test]
    fn test_inline_flags_stay_scoped() {
        let levels = vec![
            PrivilegeLevel::new("upper", r"(?i)^ROUTER>$").unwrap(),
            PrivilegeLevel::new("lower", r"^switch#$").unwrap(),
        ];
        let joined = joined_prompt_pattern(&levels).unwrap();
        assert!(joined.is_match(b"router>"));
        assert!(!joined.is_match(b"SWITCH#"));
    }

    #[test]
    fn test_expectation_exact_vs_regex() {
        let prompt = joined_prompt_pattern(&levels()).unwrap();
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"Proceed? [confirm]");

        let exact = Expectation::exact("[confirm]");
        assert_eq!(exact.find_end(&buffer, &prompt), Some(18));

        // brackets are a character class when treated as regex
        let regex = Expectation::regex(r"\[confirm\]$").unwrap();
        assert_eq!(regex.find_end(&buffer, &prompt), Some(18));

        assert_eq!(Expectation::Prompt.find_end(&buffer, &prompt), None);
    }
}
