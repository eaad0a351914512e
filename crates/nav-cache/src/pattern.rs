//! URL pattern matching contract and a path-template matcher.

use url::Url;

/// Tests URLs against configured patterns.
pub trait UrlMatcher: Send + Sync {
    /// Whether `url` matches `pattern`.
    fn test(&self, pattern: &str, url: &Url) -> bool;

    /// Whether `pattern` contains wildcards (as opposed to naming one URL).
    fn is_pattern(&self, pattern: &str) -> bool;
}

/// Matches path templates resolved against an origin.
///
/// `:name` matches exactly one non-empty segment and a `*` segment matches
/// the remainder of the path. Every other segment must match literally.
/// Query strings and fragments are ignored.
#[derive(Debug, Clone)]
pub struct PathTemplateMatcher {
    origin: Url,
}

impl PathTemplateMatcher {
    pub fn new(origin: Url) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a pattern to an absolute URL against the origin.
    pub fn resolve(&self, pattern: &str) -> Option<Url> {
        self.origin.join(pattern.trim()).ok()
    }
}

fn segments(url: &Url) -> Vec<&str> {
    url.path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_wildcard_segment(segment: &str) -> bool {
    segment == "*" || (segment.starts_with(':') && segment.len() > 1)
}

impl UrlMatcher for PathTemplateMatcher {
    fn test(&self, pattern: &str, url: &Url) -> bool {
        let Some(template) = self.resolve(pattern) else {
            return false;
        };
        if template.origin() != url.origin() {
            return false;
        }

        let expected = segments(&template);
        let actual = segments(url);
        let mut actual_iter = actual.iter();

        for segment in &expected {
            if *segment == "*" {
                return true;
            }
            match actual_iter.next() {
                Some(value) if segment.starts_with(':') && segment.len() > 1 => {
                    if value.is_empty() {
                        return false;
                    }
                }
                Some(value) if value == segment => {}
                _ => return false,
            }
        }
        actual_iter.next().is_none()
    }

    fn is_pattern(&self, pattern: &str) -> bool {
        match self.resolve(pattern) {
            Some(url) => segments(&url).into_iter().any(is_wildcard_segment),
            None => false,
        }
    }
}
