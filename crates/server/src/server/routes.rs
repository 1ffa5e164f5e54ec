//! Route selection by Ant-style path patterns.
//!
//! `?` matches one character, `*` any run of characters within a segment,
//! `**` any number of whole segments, and a `{name}` segment any single
//! segment. Empty segments are ignored, so `/a//b/` and `/a/b` are the same
//! path.

use secure_api_core::{RouteFlags, UrlPatterns};

/// Include/exclude pattern set for one direction.
#[derive(Debug, Clone, Default)]
pub struct PathPatterns {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl PathPatterns {
    pub fn new(patterns: &UrlPatterns) -> Self {
        Self {
            include: patterns.include_urls.clone(),
            exclude: patterns.exclude_urls.clone(),
        }
    }

    /// Exclusion wins over inclusion; with no include patterns nothing
    /// matches.
    pub fn matches(&self, path: &str) -> bool {
        self.include.iter().any(|p| ant_match(p, path))
            && !self.exclude.iter().any(|p| ant_match(p, path))
    }
}

/// Decides which routes are decrypted on the way in and encrypted on the way
/// out.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    encrypt: PathPatterns,
    decrypt: PathPatterns,
}

impl RoutePolicy {
    pub fn new(encrypt: &UrlPatterns, decrypt: &UrlPatterns) -> Self {
        Self {
            encrypt: PathPatterns::new(encrypt),
            decrypt: PathPatterns::new(decrypt),
        }
    }

    pub fn flags(&self, path: &str) -> RouteFlags {
        RouteFlags {
            encrypt: self.encrypt.matches(path),
            decrypt: self.decrypt.matches(path),
        }
    }
}

pub fn ant_match(pattern: &str, path: &str) -> bool {
    let pattern: Vec<&str> = segments(pattern).collect();
    let path: Vec<&str> = segments(path).collect();
    match_segments(&pattern, &path)
}

fn segments(s: &str) -> impl Iterator<Item = &str> {
    s.split('/').filter(|seg| !seg.is_empty())
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((head, rest)) => match path.split_first() {
            Some((segment, remaining)) => {
                match_segment(head, segment) && match_segments(rest, remaining)
            }
            None => false,
        },
    }
}

fn match_segment(pattern: &str, segment: &str) -> bool {
    if pattern.len() > 1 && pattern.starts_with('{') && pattern.ends_with('}') {
        return true;
    }

    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = segment.chars().collect();
    let (mut pi, mut si) = (0, 0);
    // Position of the last `*` and the segment index it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == s[si]) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, si));
            pi += 1;
        } else if let Some((star_pi, star_si)) = star {
            pi = star_pi + 1;
            si = star_si + 1;
            star = Some((star_pi, star_si + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(include: &[&str], exclude: &[&str]) -> UrlPatterns {
        UrlPatterns {
            include_urls: include.iter().map(|s| s.to_string()).collect(),
            exclude_urls: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn double_star_spans_segments() {
        assert!(ant_match("/api/**", "/api"));
        assert!(ant_match("/api/**", "/api/users/7"));
        assert!(ant_match("/**/detail", "/a/b/detail"));
        assert!(!ant_match("/api/**", "/apis/users"));
    }

    #[test]
    fn single_star_stays_in_segment() {
        assert!(ant_match("/api/*", "/api/users"));
        assert!(!ant_match("/api/*", "/api/users/7"));
        assert!(ant_match("/api/user*", "/api/users"));
        assert!(ant_match("/api/*.json", "/api/list.json"));
        assert!(!ant_match("/api/*.json", "/api/list.xml"));
    }

    #[test]
    fn question_mark_and_variables() {
        assert!(ant_match("/v?/ping", "/v2/ping"));
        assert!(!ant_match("/v?/ping", "/v10/ping"));
        assert!(ant_match("/users/{id}/roles", "/users/42/roles"));
    }

    #[test]
    fn empty_segments_are_ignored() {
        assert!(ant_match("/a/b", "/a//b/"));
    }

    #[test]
    fn exclusion_wins() {
        let set = PathPatterns::new(&patterns(&["/api/**"], &["/api/public/**"]));
        assert!(set.matches("/api/orders"));
        assert!(!set.matches("/api/public/info"));
    }

    #[test]
    fn no_includes_flags_nothing() {
        let set = PathPatterns::new(&patterns(&[], &[]));
        assert!(!set.matches("/anything"));
    }

    #[test]
    fn policy_flags_each_direction() {
        let policy = RoutePolicy::new(&patterns(&["/out/**"], &[]), &patterns(&["/in/**", "/out/both"], &[]));
        assert_eq!(
            policy.flags("/out/both"),
            RouteFlags {
                encrypt: true,
                decrypt: true
            }
        );
        assert_eq!(
            policy.flags("/in/x"),
            RouteFlags {
                encrypt: false,
                decrypt: true
            }
        );
        assert_eq!(policy.flags("/other"), RouteFlags::default());
    }
}
