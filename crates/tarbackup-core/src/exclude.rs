//! Glob-style exclusion patterns
//!
//! A pattern without `/` is matched against every path component on its own
//! (`*.tmp`, `.git`, `node_modules`). A pattern containing `/` is matched
//! against the whole archive path, which always starts with the source's
//! root label (`docs/build/**`). A leading `/` is ignored.
//!
//! `*` and `?` never cross a `/`; `**` does.

use regex::Regex;
use thiserror::Error;

/// Errors compiling exclusion patterns
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Empty exclusion pattern")]
    Empty,

    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled set of exclusion patterns
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    names: Vec<Regex>,
    paths: Vec<Regex>,
}

impl ExcludeMatcher {
    /// Compile a list of patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let mut matcher = Self::default();
        for pattern in patterns {
            matcher.add(pattern.as_ref())?;
        }
        Ok(matcher)
    }

    fn add(&mut self, pattern: &str) -> Result<(), PatternError> {
        let trimmed = pattern.trim().trim_start_matches('/');
        let trimmed = trimmed.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }

        let regex = Regex::new(&glob_to_regex(trimmed)).map_err(|source| {
            PatternError::Invalid {
                pattern: pattern.to_string(),
                source,
            }
        })?;

        if trimmed.contains('/') {
            self.paths.push(regex);
        } else {
            self.names.push(regex);
        }
        Ok(())
    }

    /// Whether an entry is excluded. `archive_path` is the full
    /// `label/relative` path, `name` its final component.
    #[must_use]
    pub fn is_excluded(&self, archive_path: &str, name: &str) -> bool {
        self.names.iter().any(|re| re.is_match(name))
            || self.paths.iter().any(|re| re.is_match(archive_path))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.paths.is_empty()
    }
}

/// Validate patterns without keeping the compiled form
pub fn validate_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<(), PatternError> {
    ExcludeMatcher::new(patterns).map(|_| ())
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    // `**/` also matches zero directories
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }

    out.push('$');
    out
}
