//! Name pattern matching.
//!
//! Used when removing headers or properties by pattern and when filtering
//! watched files. A pattern matches a name when any of these holds:
//!
//! 1. the pattern equals the name,
//! 2. the pattern ends with `*` and the name starts with the text before it,
//! 3. the pattern is a regular expression matching the whole name.

use regex::Regex;

/// Match a name against a pattern using the exact / wildcard / regex rules
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    if name == pattern {
        return true;
    }
    if matches_wildcard(name, pattern) {
        return true;
    }
    matches_regex(name, pattern)
}

/// Match a name against any of the given patterns
pub fn matches_any<S: AsRef<str>>(name: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|p| matches_pattern(name, p.as_ref()))
}

fn matches_wildcard(name: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => false,
    }
}

fn matches_regex(name: &str, pattern: &str) -> bool {
    // invalid expressions simply do not match
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => re.is_match(name),
        Err(_) => false,
    }
}

/// Match a file name against a glob where `*` matches any run of characters
/// and `?` matches exactly one.
pub fn matches_glob(file_name: &str, glob: &str) -> bool {
    let name: Vec<char> = file_name.chars().collect();
    let pattern: Vec<char> = glob.chars().collect();

    let (mut n, mut p) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            n += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = n;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            n = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Split a comma separated glob list, dropping blanks
pub fn split_globs(patterns: &str) -> Vec<String> {
    patterns
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_pattern("foo", "foo"));
        assert!(!matches_pattern("foo", "Foo"));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(matches_pattern("ConduitFileName", "Conduit*"));
        assert!(matches_pattern("anything", "*"));
        assert!(!matches_pattern("fileName", "Conduit*"));
    }

    #[test]
    fn test_regex_match() {
        assert!(matches_pattern("order-42", "order-\\d+"));
        assert!(!matches_pattern("order-42x", "order-\\d+"));
        // invalid regex never matches
        assert!(!matches_pattern("abc", "(abc"));
    }

    #[test]
    fn test_glob_match() {
        assert!(matches_glob("routes.yaml", "*.yaml"));
        assert!(matches_glob("a.xml", "?.xml"));
        assert!(!matches_glob("routes.yaml.bak", "*.yaml"));
        assert!(matches_glob("log4j2.properties", "*"));
        assert!(matches_glob("my-route.camel.yaml", "*.camel.*"));
    }

    #[test]
    fn test_split_globs() {
        assert_eq!(split_globs("*.yaml, *.xml,,"), vec!["*.yaml", "*.xml"]);
    }

    proptest! {
        #[test]
        fn prop_trailing_star_matches_any_suffix(prefix in "[a-zA-Z]{0,8}", suffix in "[a-zA-Z0-9]{0,8}") {
            let name = format!("{prefix}{suffix}");
            let pattern = format!("{prefix}*");
            prop_assert!(matches_pattern(&name, &pattern));
            prop_assert!(matches_glob(&name, &pattern));
        }
    }
}
