//! Navigation interception.
//!
//! Any in-page navigation back to the real remote origin is cancelled and
//! replaced with the same query against the local mirror, which keeps the
//! game surface on the mirror for the whole session.

use crate::mirror::MIRROR_ROOT_PATH;

/// What to do with a navigation the surface is about to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Let the navigation proceed.
    Allow,
    /// Cancel it and load `redirect_to` instead.
    Intercept { redirect_to: String },
}

/// Mirror root URL carrying the query of `url`.
///
/// Everything from the first `?` onwards is appended to
/// `<mirror_origin>/0/`; fragments ride along as part of that suffix.
pub fn local_url_with_params(url: &str, mirror_origin: &str) -> String {
    let root = format!("{}{}", mirror_origin.trim_end_matches('/'), MIRROR_ROOT_PATH);
    match url.find('?') {
        Some(index) => format!("{}{}", root, &url[index..]),
        None => root,
    }
}

/// Decides which navigations get redirected into the mirror.
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    remote_prefix: String,
}

impl NavigationGuard {
    /// Intercepts every URL that starts with `remote_prefix`.
    pub fn new(remote_prefix: impl Into<String>) -> Self {
        Self {
            remote_prefix: remote_prefix.into(),
        }
    }

    pub fn remote_prefix(&self) -> &str {
        &self.remote_prefix
    }

    /// Plain, case-sensitive prefix test. No URL normalization.
    pub fn is_remote(&self, url: &str) -> bool {
        url.starts_with(&self.remote_prefix)
    }

    pub fn decide(&self, url: &str, mirror_origin: &str) -> NavigationDecision {
        if self.is_remote(url) {
            NavigationDecision::Intercept {
                redirect_to: local_url_with_params(url, mirror_origin),
            }
        } else {
            NavigationDecision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTE: &str = "https://game.example.com/";
    const ORIGIN: &str = "https://localhost:8887";

    #[test]
    fn test_query_is_carried_over() {
        let guard = NavigationGuard::new(REMOTE);
        assert_eq!(
            guard.decide("https://game.example.com/1/?a=1&b=2", ORIGIN),
            NavigationDecision::Intercept {
                redirect_to: "https://localhost:8887/0/?a=1&b=2".to_string()
            }
        );
    }

    #[test]
    fn test_no_query_goes_to_root() {
        let guard = NavigationGuard::new(REMOTE);
        assert_eq!(
            guard.decide("https://game.example.com/some/path", ORIGIN),
            NavigationDecision::Intercept {
                redirect_to: "https://localhost:8887/0/".to_string()
            }
        );
    }

    #[test]
    fn test_other_origins_are_allowed() {
        let guard = NavigationGuard::new(REMOTE);
        assert_eq!(
            guard.decide("https://other.example.com/?a=1", ORIGIN),
            NavigationDecision::Allow
        );
        assert_eq!(
            guard.decide("https://localhost:8887/0/?a=1", ORIGIN),
            NavigationDecision::Allow
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let guard = NavigationGuard::new(REMOTE);
        assert_eq!(
            guard.decide("https://GAME.example.com/?a=1", ORIGIN),
            NavigationDecision::Allow
        );
        assert_eq!(
            guard.decide("http://game.example.com/?a=1", ORIGIN),
            NavigationDecision::Allow
        );
    }

    #[test]
    fn test_suffix_starts_at_first_question_mark() {
        assert_eq!(
            local_url_with_params("https://game.example.com/?a=1?b=2#top", "https://localhost:9000/"),
            "https://localhost:9000/0/?a=1?b=2#top"
        );
    }
}
