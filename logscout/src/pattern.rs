use regex::Regex;

use crate::errors::{ScanError, ScanResult};

// Patterns shorter than this with no regex metacharacters use substring
// search instead of the regex engine.
const LITERAL_PATTERN_THRESHOLD: usize = 32;

/// Matching strategy selected at compile time
#[derive(Debug, Clone)]
enum MatchStrategy {
    Literal(String),
    Regex(Regex),
}

/// A compiled per-line predicate.
///
/// The scanner treats this as an opaque boolean test over one line of
/// text. Simple literal patterns skip the regex engine entirely, the same
/// optimization .NET applies when `Regex.IsMatch` degenerates to
/// `string.Contains`.
#[derive(Debug, Clone)]
pub struct LinePattern {
    text: String,
    strategy: MatchStrategy,
}

impl LinePattern {
    /// Compiles a pattern, selecting literal or regex matching.
    ///
    /// Fails before the pipeline starts; a pattern that does not compile
    /// never reaches a worker.
    pub fn compile(pattern: &str) -> ScanResult<Self> {
        let strategy = if Self::is_literal(pattern) {
            MatchStrategy::Literal(pattern.to_string())
        } else {
            MatchStrategy::Regex(
                Regex::new(pattern).map_err(|e| ScanError::invalid_pattern(e.to_string()))?,
            )
        };

        Ok(Self {
            text: pattern.to_string(),
            strategy,
        })
    }

    /// Determines if a pattern can use simple substring matching
    fn is_literal(pattern: &str) -> bool {
        pattern.len() < LITERAL_PATTERN_THRESHOLD
            && !pattern.contains(['*', '+', '?', '[', ']', '(', ')', '|', '^', '$', '.', '\\'])
    }

    /// Tests one line of text against the pattern
    pub fn is_match(&self, line: &str) -> bool {
        match &self.strategy {
            MatchStrategy::Literal(literal) => line.contains(literal.as_str()),
            MatchStrategy::Regex(regex) => regex.is_match(line),
        }
    }

    /// The original pattern text, for display
    pub fn as_str(&self) -> &str {
        &self.text
    }
}
