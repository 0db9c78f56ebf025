//! URL auto-approve / auto-deny rules.
//!
//! Patterns are shell-style globs: `*` matches any run of characters, `?`
//! matches one, everything else is literal. Matching is anchored and
//! case-insensitive. Deny patterns are evaluated before approve patterns,
//! so a URL matched by both resolves as deny.

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Outcome of the auto rules for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDecision {
    Approve,
    Deny,
}

/// Compiled auto-rule patterns.
pub struct AutoRules {
    deny: Vec<Regex>,
    approve: Vec<Regex>,
}

impl AutoRules {
    /// Compile the configured globs. Invalid patterns are skipped with a
    /// log line rather than failing startup.
    pub fn new(approve_patterns: &[String], deny_patterns: &[String]) -> Self {
        Self {
            deny: compile_all(deny_patterns),
            approve: compile_all(approve_patterns),
        }
    }

    /// Evaluate a URL. Deny wins over approve; `None` means no rule
    /// matched and the operator must decide.
    pub fn evaluate(&self, url: &str) -> Option<AutoDecision> {
        if self.deny.iter().any(|re| re.is_match(url)) {
            return Some(AutoDecision::Deny);
        }
        if self.approve.iter().any(|re| re.is_match(url)) {
            return Some(AutoDecision::Approve);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty() && self.approve.is_empty()
    }
}

fn compile_all(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match glob_to_regex(p) {
            Ok(re) => Some(re),
            Err(e) => {
                debug!(pattern = %p, "skipping invalid auto-rule glob: {e}");
                None
            }
        })
        .collect()
}

/// Translate one glob into an anchored, case-insensitive regex. All regex
/// metacharacters except the glob wildcards are escaped.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(approve: &[&str], deny: &[&str]) -> AutoRules {
        AutoRules::new(
            &approve.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &deny.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
    }

    #[test]
    fn star_matches_any_run() {
        let rules = rules(&["https://docs.rs/*"], &[]);
        assert_eq!(
            rules.evaluate("https://docs.rs/serde/latest"),
            Some(AutoDecision::Approve)
        );
        assert_eq!(rules.evaluate("https://docs.rs/"), Some(AutoDecision::Approve));
        assert_eq!(rules.evaluate("https://crates.io/"), None);
    }

    #[test]
    fn matching_is_anchored() {
        let rules = rules(&["https://ok.test/*"], &[]);
        // A prefix elsewhere in the URL must not count.
        assert_eq!(
            rules.evaluate("https://evil.test/?next=https://ok.test/x"),
            None
        );
    }

    #[test]
    fn question_mark_matches_one_char() {
        let rules = rules(&["https://host-?.test/"], &[]);
        assert_eq!(
            rules.evaluate("https://host-1.test/"),
            Some(AutoDecision::Approve)
        );
        assert_eq!(rules.evaluate("https://host-12.test/"), None);
    }

    #[test]
    fn deny_wins_over_approve() {
        let rules = rules(&["https://example.com/*"], &["https://example.com/*"]);
        assert_eq!(
            rules.evaluate("https://example.com/anything"),
            Some(AutoDecision::Deny)
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let rules = rules(&[], &["https://EVIL.example/*"]);
        assert_eq!(
            rules.evaluate("https://evil.example/steal"),
            Some(AutoDecision::Deny)
        );
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let rules1 = rules(&["https://a.test/path+x(1)"], &[]);
        assert_eq!(
            rules1.evaluate("https://a.test/path+x(1)"),
            Some(AutoDecision::Approve)
        );
        // '.' must not act as a wildcard.
        let rules2 = rules(&["https://a.test/"], &[]);
        assert_eq!(rules2.evaluate("https://aXtest/"), None);
    }

    #[test]
    fn invalid_globs_are_skipped() {
        // Globs cannot actually fail to compile after escaping; an empty
        // rule set simply matches nothing.
        let rules = rules(&[], &[]);
        assert!(rules.is_empty());
        assert_eq!(rules.evaluate("https://anything.test/"), None);
    }
}
