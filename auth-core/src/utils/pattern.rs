//! Resource pattern matching: exact names, `prefix:*` wildcards and globs.

use dashmap::DashMap;
use regex::Regex;

/// Matches resource names against permission patterns. Glob patterns are
/// compiled once and cached.
#[derive(Debug, Default)]
pub struct ResourceMatcher {
    compiled: DashMap<String, Option<Regex>>,
}

impl ResourceMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, pattern: &str, resource: &str) -> bool {
        if pattern == resource {
            return true;
        }

        if let Some(prefix) = pattern.strip_suffix(":*") {
            if !has_glob_chars(prefix) {
                return resource
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with(':'));
            }
        }

        if !has_glob_chars(pattern) {
            return false;
        }

        if let Some(compiled) = self.compiled.get(pattern) {
            return compiled.as_ref().is_some_and(|re| re.is_match(resource));
        }

        let compiled = compile_glob(pattern);
        let matched = compiled.as_ref().is_some_and(|re| re.is_match(resource));
        self.compiled.insert(pattern.to_string(), compiled);
        matched
    }

    pub fn clear(&self) {
        self.compiled.clear();
    }
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Translate a glob into an anchored regex. `*` matches any run of
/// characters, `?` a single character; everything else is literal.
fn compile_glob(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() * 2 + 2);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');

    match Regex::new(&expr) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Invalid resource pattern, it will never match");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let matcher = ResourceMatcher::new();
        assert!(matcher.matches("profile", "profile"));
        assert!(!matcher.matches("profile", "profiles"));
    }

    #[test]
    fn test_prefix_wildcard() {
        let matcher = ResourceMatcher::new();
        assert!(matcher.matches("users:*", "users:42"));
        assert!(matcher.matches("users:*", "users:42:settings"));
        assert!(!matcher.matches("users:*", "users"));
        assert!(!matcher.matches("users:*", "usersx:1"));
    }

    #[test]
    fn test_glob() {
        let matcher = ResourceMatcher::new();
        assert!(matcher.matches("*", "anything:at:all"));
        assert!(matcher.matches("reports/*/summary", "reports/2024/summary"));
        assert!(!matcher.matches("reports/*/summary", "reports/2024/detail"));
        assert!(matcher.matches("doc-?", "doc-a"));
        assert!(!matcher.matches("doc-?", "doc-ab"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let matcher = ResourceMatcher::new();
        assert!(matcher.matches("a.b*", "a.bc"));
        assert!(!matcher.matches("a.b*", "axbc"));
        assert!(matcher.matches("(x)+*", "(x)+y"));
    }

    #[test]
    fn test_compiled_patterns_are_cached() {
        let matcher = ResourceMatcher::new();
        assert!(matcher.matches("files/*", "files/a"));
        assert!(matcher.matches("files/*", "files/b"));
        assert_eq!(matcher.compiled.len(), 1);
        matcher.clear();
        assert!(matcher.compiled.is_empty());
    }
}
