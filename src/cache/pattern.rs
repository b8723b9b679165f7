//! Simple glob matching for cache key patterns (`*` = any run of characters).

use regex::Regex;

use super::CacheError;

/// A compiled key pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self, CacheError> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| CacheError::InvalidPattern(e.to_string()))?;
        Ok(Self { source: pattern.to_string(), regex })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern matches every key.
    pub fn is_match_all(&self) -> bool {
        self.source.chars().all(|c| c == '*') && !self.source.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        let p = KeyPattern::new("refine:opensubs:*").unwrap();
        assert!(p.matches("refine:opensubs:movie:tt01:en"));
        assert!(p.matches("refine:opensubs:"));
        assert!(!p.matches("refine:podnapisi:movie:tt01:en"));
    }

    #[test]
    fn literal_pattern_is_exact() {
        let p = KeyPattern::new("a.b").unwrap();
        assert!(p.matches("a.b"));
        assert!(!p.matches("axb"));
    }

    #[test]
    fn inner_wildcards() {
        let p = KeyPattern::new("refine:*:series:*:fr").unwrap();
        assert!(p.matches("refine:x:series:tt9:fr"));
        assert!(!p.matches("refine:x:movie:tt9:fr"));
    }

    #[test]
    fn match_all_detection() {
        assert!(KeyPattern::new("*").unwrap().is_match_all());
        assert!(!KeyPattern::new("a*").unwrap().is_match_all());
    }
}
