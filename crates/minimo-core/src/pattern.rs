//! Path matching for ignore rules and user overrides.
//!
//! Two pattern languages are used:
//!
//! - [`IgnoreRules`]: regular expressions anchored to the whole relative
//!   path, used by the snapshot engine.
//! - [`PathGlobs`]: glob patterns (`*` stays within a component, `**`
//!   crosses components), used for include/exclude overrides.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::{Regex, RegexSet};
use thiserror::Error;

use crate::record::normalize_path;

/// A pattern that failed to compile.
#[derive(Debug, Error)]
pub enum PatternError {
    /// Invalid regular expression.
    #[error("Invalid regular expression `{pattern}`: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Invalid glob.
    #[error("Invalid glob `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Ordered regular expressions matched against whole relative paths.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
    set: Option<RegexSet>,
}

impl IgnoreRules {
    /// Compile a list of patterns. Each one is anchored as `^(?:pattern)$`.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(|p| p.as_ref().to_string()).collect();
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let anchored: Vec<String> = patterns.iter().map(|p| format!("^(?:{p})$")).collect();
        for (pattern, source) in patterns.iter().zip(&anchored) {
            Regex::new(source).map_err(|source| PatternError::Regex {
                pattern: pattern.clone(),
                source,
            })?;
        }
        let set = RegexSet::new(&anchored).map_err(|source| PatternError::Regex {
            pattern: patterns.join(" | "),
            source,
        })?;

        Ok(Self {
            patterns,
            set: Some(set),
        })
    }

    /// Check if a relative path matches any rule.
    pub fn is_match(&self, rel_path: &str) -> bool {
        self.set.as_ref().is_some_and(|set| set.is_match(rel_path))
    }

    /// The first pattern (in configuration order) matching the path.
    pub fn first_match(&self, rel_path: &str) -> Option<&str> {
        let set = self.set.as_ref()?;
        set.matches(rel_path)
            .iter()
            .next()
            .map(|idx| self.patterns[idx].as_str())
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Source patterns in configuration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Glob patterns matched against normalized relative paths.
#[derive(Debug, Clone)]
pub struct PathGlobs {
    patterns: Vec<String>,
    set: GlobSet,
}

impl PathGlobs {
    /// Compile a list of globs. A leading `/` is ignored.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut sources = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref();
            let pattern = raw.trim_start_matches('/');
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| PatternError::Glob {
                    pattern: raw.to_string(),
                    source,
                })?;
            builder.add(glob);
            sources.push(raw.to_string());
        }
        let set = builder.build().map_err(|source| PatternError::Glob {
            pattern: sources.join(", "),
            source,
        })?;
        Ok(Self {
            patterns: sources,
            set,
        })
    }

    /// Check if a path matches any glob. The path is normalized first.
    pub fn is_match(&self, path: &str) -> bool {
        !self.patterns.is_empty() && self.set.is_match(normalize_path(path).as_str())
    }

    /// Check if there are no globs.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Source patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for PathGlobs {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_rules_are_anchored() {
        let rules = IgnoreRules::new(["dev", "proc/.*"]).unwrap();
        assert!(rules.is_match("dev"));
        assert!(!rules.is_match("dev/null"));
        assert!(!rules.is_match("usr/dev"));
        assert!(rules.is_match("proc/1/status"));
        assert!(!rules.is_match("proc"));
        assert_eq!(rules.first_match("proc/self"), Some("proc/.*"));
    }

    #[test]
    fn test_invalid_regex_names_pattern() {
        let err = IgnoreRules::new(["ok", "(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_empty_rules_match_nothing() {
        let rules = IgnoreRules::default();
        assert!(rules.is_empty());
        assert!(!rules.is_match(""));
        assert!(!rules.is_match("anything"));
    }

    #[test]
    fn test_path_globs() {
        let globs = PathGlobs::new(["/etc/nginx/*.conf", "var/log/**"]).unwrap();
        assert!(globs.is_match("etc/nginx/nginx.conf"));
        assert!(globs.is_match("/etc/nginx/nginx.conf"));
        assert!(!globs.is_match("etc/nginx/sites/default.conf"));
        assert!(globs.is_match("var/log/apt/history.log"));
        assert!(!globs.is_match("var/lib/dpkg/status"));
    }

    #[test]
    fn test_empty_globs() {
        let globs = PathGlobs::default();
        assert!(globs.is_empty());
        assert!(!globs.is_match("etc/passwd"));
    }
}
