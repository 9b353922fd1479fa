use regex::Regex;

use crate::errors::{VigrepError, VigrepResult};

/// Strategy for pattern matching
#[derive(Debug, Clone)]
pub enum MatchStrategy {
    /// Case-sensitive substring
    Literal(String),
    Regex(Regex),
}

/// Decides whether extracted text contains the pattern
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    strategy: MatchStrategy,
}

impl PatternMatcher {
    /// Creates a matcher for `pattern`, compiled as a regex if `use_regex`
    /// is set. An empty pattern matches any text, including none.
    pub fn new(pattern: &str, use_regex: bool) -> VigrepResult<Self> {
        let strategy = if use_regex {
            MatchStrategy::Regex(
                Regex::new(pattern)
                    .map_err(|e| VigrepError::invalid_pattern(format!("{}: {}", pattern, e)))?,
            )
        } else {
            MatchStrategy::Literal(pattern.to_string())
        };
        Ok(Self { strategy })
    }

    pub fn strategy(&self) -> &MatchStrategy {
        &self.strategy
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.strategy {
            MatchStrategy::Literal(pattern) => text.contains(pattern.as_str()),
            MatchStrategy::Regex(regex) => regex.is_match(text),
        }
    }
}
