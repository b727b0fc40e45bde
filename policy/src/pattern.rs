use regex::Regex;

use crate::error::{PatternError, PatternResult};

/// A compiled registry path pattern. Matching ignores case, as registry
/// names do.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    /// Exact path, stored case-folded.
    Exact { original: String, folded: String },
    /// Glob pattern compiled to regex.
    Glob { original: String, regex: Regex },
    /// Explicit regex pattern (prefixed with "regex:").
    Regex { original: String, regex: Regex },
}

impl CompiledPattern {
    /// Check if the pattern matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            CompiledPattern::Exact { folded, .. } => *folded == path.to_lowercase(),
            CompiledPattern::Glob { regex, .. } => regex.is_match(path),
            CompiledPattern::Regex { regex, .. } => regex.is_match(path),
        }
    }

    /// Get the original pattern string.
    pub fn original(&self) -> &str {
        match self {
            CompiledPattern::Exact { original, .. } => original,
            CompiledPattern::Glob { original, .. } => original,
            CompiledPattern::Regex { original, .. } => original,
        }
    }
}

/// Compile a registry path pattern.
///
/// Pattern syntax:
/// - `regex:...` - Explicit regex pattern
/// - Contains `*` or `?` - Glob pattern; `*` stays within one key name,
///   `**` crosses `\`, `?` matches one character other than `\`
/// - Otherwise - Exact match
pub fn compile_pattern(pattern: &str) -> PatternResult<CompiledPattern> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }

    if let Some(regex_str) = pattern.strip_prefix("regex:") {
        let regex = Regex::new(&format!("(?i){}", regex_str)).map_err(|e| {
            PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        return Ok(CompiledPattern::Regex {
            original: pattern.to_string(),
            regex,
        });
    }

    if pattern.contains('*') || pattern.contains('?') {
        return Ok(CompiledPattern::Glob {
            original: pattern.to_string(),
            regex: glob_to_regex(pattern)?,
        });
    }

    Ok(CompiledPattern::Exact {
        original: pattern.to_string(),
        folded: pattern.to_lowercase(),
    })
}

/// Convert a registry glob to an anchored, case-insensitive regex.
fn glob_to_regex(glob: &str) -> PatternResult<Regex> {
    let mut regex = String::from("(?i)^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*");
            }
            '*' => regex.push_str(r"[^\\]*"),
            '?' => regex.push_str(r"[^\\]"),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }

    regex.push('$');

    Regex::new(&regex).map_err(|e| PatternError::InvalidRegex {
        pattern: glob.to_string(),
        reason: e.to_string(),
    })
}
