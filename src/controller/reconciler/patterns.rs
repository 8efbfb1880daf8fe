//! # Name Patterns
//!
//! Anchored regular expressions for `matchNames` and `ignoreNames`.

use regex::Regex;

/// A compiled list of namespace name patterns
///
/// Every pattern is anchored at both ends, so `default` matches the namespace
/// `default` but not `substring-with-default`. An empty set matches nothing.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

/// A pattern that is not a valid regular expression
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

impl PatternSet {
    /// Compile every pattern, failing on the first invalid one
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                // Grouping keeps alternations like `a|b` inside the anchors
                Regex::new(&format!("^(?:{pattern})$")).map_err(|source| PatternError {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// True when at least one pattern matches the whole name
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(name))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_are_anchored() {
        let set = PatternSet::compile(&["default"]).unwrap();
        assert!(set.matches("default"));
        assert!(!set.matches("substring-with-default"));
        assert!(!set.matches("default-suffix"));
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let set = PatternSet::compile(&["dev|prod"]).unwrap();
        assert!(set.matches("dev"));
        assert!(set.matches("prod"));
        assert!(!set.matches("prod-eu"));
        assert!(!set.matches("my-dev"));
    }

    #[test]
    fn test_any_pattern_matches() {
        let set = PatternSet::compile(&["team-.*", "ops"]).unwrap();
        assert!(set.matches("team-blue"));
        assert!(set.matches("ops"));
        assert!(!set.matches("operations"));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = PatternSet::compile::<&str>(&[]).unwrap();
        assert!(set.is_empty());
        assert!(!set.matches(""));
        assert!(!set.matches("default"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let err = PatternSet::compile(&["ok", "(unclosed"]).unwrap_err();
        assert_eq!(err.pattern, "(unclosed");
    }
}
