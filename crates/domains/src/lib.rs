//! Domain rule sets: literal/registrable/glob classification for the proxy
//! and block lists, plus the file loader that feeds them.

mod loader;

use std::collections::HashSet;

pub use loader::load_domains;

/// One side (proxy or block) of the classification. See `§4.2` of the
/// design for the exact insertion and lookup semantics.
#[derive(Debug, Default)]
pub struct RuleSet {
    exact: HashSet<String>,
    registrable: HashSet<String>,
    patterns: Vec<String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `domain` as a proxy target: patterns win over everything,
    /// globs are stored verbatim, plain domains are folded to their
    /// registrable label.
    pub fn add_proxied(&mut self, domain: &str) {
        let domain = normalize(domain);
        if domain.is_empty() {
            return;
        }
        if self.patterns.iter().any(|p| glob_match(p, &domain)) {
            return;
        }
        if domain.contains('*') {
            self.patterns.push(domain);
            return;
        }
        self.registrable.insert(trim_registrable(&domain));
    }

    /// Registers `domain` as a block target. Blocked literals are kept
    /// exact (not trimmed) so blocking stays precise.
    pub fn add_blocked(&mut self, domain: &str) {
        let domain = normalize(domain);
        if domain.is_empty() {
            return;
        }
        if self.patterns.iter().any(|p| glob_match(p, &domain)) {
            return;
        }
        if domain.contains('*') {
            self.patterns.push(domain);
            return;
        }
        self.exact.insert(domain);
    }

    /// `true` if `name` matches an exact entry or any pattern. Intended for
    /// the block side.
    pub fn matches_exact_or_pattern(&self, name: &str) -> bool {
        let name = normalize(name);
        self.exact.contains(&name) || self.patterns.iter().any(|p| glob_match(p, &name))
    }

    /// `(registrable_match, pattern_match)` — the caller proxies on the OR
    /// of the two. Intended for the proxy side.
    pub fn matches_registrable_or_pattern(&self, name: &str) -> (bool, bool) {
        let name = normalize(name);
        let registrable = self.registrable.contains(&trim_registrable(&name));
        let pattern = self.patterns.iter().any(|p| glob_match(p, &name));
        (registrable, pattern)
    }

    pub fn exact_len(&self) -> usize {
        self.exact.len()
    }

    pub fn registrable_len(&self) -> usize {
        self.registrable.len()
    }

    pub fn pattern_len(&self) -> usize {
        self.patterns.len()
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Approximates an eTLD+1 without a Public Suffix List: the last two labels,
/// or the last three when the penultimate label is two characters or
/// shorter (catches `co.uk`-style second-level ccTLDs).
pub fn trim_registrable(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 3 {
        return domain.to_string();
    }
    let penultimate = labels[labels.len() - 2];
    let take = if penultimate.len() <= 2 { 3 } else { 2 };
    labels[labels.len() - take..].join(".")
}

/// Matches `input` against a glob `pattern` whose `*` wildcards each match a
/// run of zero or more characters. Left- and right-anchored; between stars
/// the next literal run is found greedily from the left.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == input;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0usize;

    if let Some(first) = parts.first()
        && !first.is_empty()
    {
        if !input[pos..].starts_with(first) {
            return false;
        }
        pos += first.len();
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match input[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    if let Some(last) = parts.last()
        && !last.is_empty()
    {
        return input[pos..].ends_with(last) && input.len() - pos >= last.len();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_registrable_handles_short_penultimate_labels() {
        assert_eq!(trim_registrable("a.b.c.test.co.uk"), "test.co.uk");
        assert_eq!(trim_registrable("a.b.site.com"), "site.com");
        assert_eq!(trim_registrable("aboba.ru"), "aboba.ru");
        assert_eq!(trim_registrable("localhost"), "localhost");
        assert_eq!(trim_registrable("a.co.uk"), "a.co.uk");
    }

    #[test]
    fn trim_registrable_is_idempotent() {
        let d = "a.b.c.test.co.uk";
        assert_eq!(trim_registrable(&trim_registrable(d)), trim_registrable(d));
    }

    #[test]
    fn glob_matches_star_suffix() {
        assert!(glob_match("*.example.com", "a.example.com"));
        assert!(!glob_match("*.example.com", "example.com"));
    }

    #[test]
    fn glob_bare_star_matches_any_nonempty() {
        assert!(glob_match("*", "x"));
        assert!(glob_match("*", "anything.tld"));
    }

    #[test]
    fn glob_multi_star_is_greedy_from_left() {
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(glob_match("a*b*c", "abc"));
        assert!(!glob_match("a*b*c", "cba"));
    }

    #[test]
    fn proxied_pattern_wins_over_new_registrable_insert() {
        let mut rules = RuleSet::new();
        rules.add_proxied("*.video.net");
        rules.add_proxied("cdn1.video.net");
        assert_eq!(rules.registrable_len(), 0);
        let (registrable, pattern) = rules.matches_registrable_or_pattern("cdn1.video.net");
        assert!(!registrable);
        assert!(pattern);
    }

    #[test]
    fn blocked_literal_is_exact_not_registrable() {
        let mut rules = RuleSet::new();
        rules.add_blocked("ads.evil.example");
        assert!(rules.matches_exact_or_pattern("ads.evil.example"));
        assert!(!rules.matches_exact_or_pattern("other.evil.example"));
    }

    #[test]
    fn proxied_plain_domain_is_trimmed_to_registrable() {
        let mut rules = RuleSet::new();
        rules.add_proxied("a.b.example.com");
        let (registrable, _) = rules.matches_registrable_or_pattern("sub.example.com");
        assert!(registrable);
    }
}
